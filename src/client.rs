use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;

use crate::compiler::PresetEntry;
use crate::error::{PortfolioError, Result};
use crate::models::{ChatMessage, ChatRequest};
use crate::protocol::{ChatEvent, LineBuffer};
use crate::router::{ChatBackend, EventStream};

/// Talks to a running server's `POST /api/chat` and decodes the data stream.
#[derive(Clone)]
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
}

impl HttpChatBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortfolioError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The quick-question buttons, in order.
    pub async fn presets(&self) -> Result<Vec<PresetEntry>> {
        let response = self.client.get(self.url("/api/presets")).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(PortfolioError::Provider {
        status: status.as_u16(),
        message,
    })
}

impl ChatBackend for HttpChatBackend {
    fn open(&self, messages: Vec<ChatMessage>) -> EventStream {
        let request = self
            .client
            .post(self.url("/api/chat"))
            .json(&ChatRequest { messages });

        futures::stream::once(async move {
            let response = check_status(request.send().await?).await?;
            tracing::debug!("chat stream opened");
            Ok::<_, PortfolioError>(decode_events(response))
        })
        .try_flatten()
        .boxed()
    }
}

fn decode_events(response: reqwest::Response) -> EventStream {
    let state = (response.bytes_stream().boxed(), LineBuffer::default(), VecDeque::new(), false);
    futures::stream::unfold(state, |(mut bytes, mut lines, mut ready, mut done)| async move {
        loop {
            if let Some(item) = ready.pop_front() {
                return Some((item, (bytes, lines, ready, done)));
            }
            if done {
                return None;
            }
            let raw_lines = match bytes.next().await {
                Some(Ok(chunk)) => lines.push(&chunk),
                Some(Err(e)) => Err(PortfolioError::from(e)),
                None => {
                    done = true;
                    Ok(lines.finish().into_iter().collect())
                }
            };
            match raw_lines {
                Ok(raw_lines) => {
                    for line in raw_lines {
                        match ChatEvent::decode(&line) {
                            Ok(Some(event)) => ready.push_back(Ok(event)),
                            Ok(None) => {}
                            Err(e) => ready.push_back(Err(e)),
                        }
                    }
                }
                Err(e) => {
                    ready.push_back(Err(e));
                    done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::protocol::FinishReason;
    use crate::tools::ToolName;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HttpChatBackend {
        HttpChatBackend::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn decodes_the_data_stream() {
        let server = MockServer::start().await;
        let body = [
            ChatEvent::ToolCall { id: "c1".into(), tool: ToolName::Skills }.encode(),
            ChatEvent::ToolResult { id: "c1".into(), tool: ToolName::Skills, result: json!({"technicalSkills": []}) }
                .encode(),
            "8:[{\"ignored\":true}]\n".to_string(),
            ChatEvent::TextDelta("Mostly Rust.".into()).encode(),
            ChatEvent::Finish(FinishReason::Stop).encode(),
        ]
        .concat();
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/plain; charset=utf-8"))
            .expect(1)
            .mount(&server)
            .await;

        let events: Vec<ChatEvent> = backend(&server)
            .open(vec![ChatMessage::user("skills?")])
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[2], ChatEvent::TextDelta("Mostly Rust.".into()));
        assert_eq!(events[3], ChatEvent::Finish(FinishReason::Stop));
    }

    #[tokio::test]
    async fn opening_is_lazy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let _stream = backend(&server).open(vec![ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("API quota exceeded. Please try again later."))
            .mount(&server)
            .await;

        let mut stream = backend(&server).open(vec![ChatMessage::user("hi")]);
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::QuotaExceeded);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn fetches_presets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/presets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"question": "Who are you?", "reply": "Hi", "tool": "getPresentation"}
            ])))
            .mount(&server)
            .await;

        let presets = backend(&server).presets().await.unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].tool, ToolName::Presentation);
    }
}
