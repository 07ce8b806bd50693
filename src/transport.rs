use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use std::collections::VecDeque;
use tokio::time::sleep;

use crate::error::{PortfolioError, Result};
use crate::models::{CompletionChunk, CompletionRequest};
use crate::protocol::LineBuffer;
use crate::retry::RetryPolicy;

pub type ChunkStream = BoxStream<'static, Result<CompletionChunk>>;

/// The remote model. Opening a stream either fails up front (status, network)
/// or yields completion chunks until the provider is done.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn stream_chat(&self, req: &CompletionRequest) -> Result<ChunkStream>;
}

/// OpenAI-compatible `/chat/completions` over HTTP with server-sent events.
pub struct CompletionsTransport {
    client: Client,
    url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl CompletionsTransport {
    pub fn new(url: String, api_key: String, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| PortfolioError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            api_key,
            retry,
        })
    }
}

#[async_trait]
impl Transport for CompletionsTransport {
    async fn stream_chat(&self, req: &CompletionRequest) -> Result<ChunkStream> {
        let max_attempts = self.retry.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let failure = match self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Accept", "text/event-stream")
                .json(req)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(attempts, "model stream opened");
                    return Ok(sse_chunks(response));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    tracing::warn!(status, attempts, "model provider returned an error");
                    (Some(status), PortfolioError::Provider { status, message })
                }
                Err(e) => {
                    tracing::warn!(attempts, error = %e, "model request failed");
                    (None, PortfolioError::from(e))
                }
            };

            let (status, err) = failure;
            if attempts >= max_attempts || !RetryPolicy::is_retryable(status) {
                return Err(err);
            }
            sleep(self.retry.delay(attempts)).await;
        }
    }
}

fn sse_chunks(response: reqwest::Response) -> ChunkStream {
    let state = (response.bytes_stream().boxed(), SseDecoder::default());
    futures::stream::unfold(state, |(mut bytes, mut decoder)| async move {
        loop {
            if let Some(item) = decoder.next_ready() {
                return Some((item, (bytes, decoder)));
            }
            if decoder.is_done() {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => decoder.fail(PortfolioError::from(e)),
                None => decoder.finish(),
            }
        }
    })
    .boxed()
}

/// Turns `data:` lines into completion chunks. Stops at `[DONE]` or the first error.
#[derive(Default)]
pub struct SseDecoder {
    lines: LineBuffer,
    ready: VecDeque<Result<CompletionChunk>>,
    done: bool,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) {
        if self.done {
            return;
        }
        match self.lines.push(bytes) {
            Ok(lines) => {
                for line in lines {
                    self.handle_line(&line);
                }
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn finish(&mut self) {
        if let Some(rest) = self.lines.finish() {
            self.handle_line(&rest);
        }
        self.done = true;
    }

    pub fn fail(&mut self, err: PortfolioError) {
        if !self.done {
            self.ready.push_back(Err(err));
            self.done = true;
        }
    }

    pub fn next_ready(&mut self) -> Option<Result<CompletionChunk>> {
        self.ready.pop_front()
    }

    pub fn is_done(&self) -> bool {
        self.done && self.ready.is_empty()
    }

    fn handle_line(&mut self, line: &str) {
        if self.done {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            // comments, `event:` and blank separators
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return self.fail(e.into()),
        };
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            let status = error
                .get("code")
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(500);
            return self.fail(PortfolioError::Provider { status, message });
        }
        match serde_json::from_value(value) {
            Ok(chunk) => self.ready.push_back(Ok(chunk)),
            Err(e) => self.fail(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::models::{ChunkChoice, ChunkDelta, FunctionCallDelta, ToolCallDelta};
    use std::sync::Mutex;

    pub type Script = Result<Vec<Result<CompletionChunk>>>;

    /// Replays one script per `stream_chat` call and records every request.
    pub struct MockTransport {
        scripts: Mutex<VecDeque<Script>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockTransport {
        pub fn new(scripts: Vec<Script>) -> Self {
            MockTransport {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().expect("requests mutex poisoned").len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn stream_chat(&self, req: &CompletionRequest) -> Result<ChunkStream> {
            self.requests
                .lock()
                .expect("requests mutex poisoned")
                .push(req.clone());
            let script = self
                .scripts
                .lock()
                .expect("scripts mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(PortfolioError::Internal("No more mock responses".to_string())));
            script.map(|chunks| futures::stream::iter(chunks).boxed())
        }
    }

    pub fn text(content: &str) -> Result<CompletionChunk> {
        Ok(CompletionChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(content.to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
        })
    }

    pub fn tool_call(index: usize, id: &str, name: &str) -> Result<CompletionChunk> {
        Ok(CompletionChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: Some(id.to_string()),
                        function: Some(FunctionCallDelta {
                            name: Some(name.to_string()),
                            arguments: Some("{}".to_string()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
        })
    }

    pub fn finish(reason: &str) -> Result<CompletionChunk> {
        Ok(CompletionChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta::default(),
                finish_reason: Some(reason.to_string()),
            }],
        })
    }
}
