use futures::StreamExt;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ModelConfig;
use crate::error::{PortfolioError, Result};
use crate::models::{
    ChatMessage, CompletionRequest, FunctionCall, InvocationState, ProviderMessage, Role, ToolCall,
    ToolCallDelta,
};
use crate::protocol::{ChatEvent, FinishReason};
use crate::tools::{ToolName, ToolRegistry};
use crate::transport::{ChunkStream, Transport};

const EVENT_BUFFER: usize = 32;

/// A running model exchange. Dropping `events` stops the work.
pub struct Exchange {
    pub events: mpsc::Receiver<ChatEvent>,
    pub task: JoinHandle<()>,
}

/// Server half of the response router: talks to the model, runs the tools it
/// asks for locally and feeds their results back, bounded by a step cap and
/// an overall deadline.
pub struct ChatDispatcher {
    transport: Arc<dyn Transport>,
    tools: Arc<ToolRegistry>,
    system_prompt: Arc<str>,
    model: String,
    temperature: f32,
    max_tokens: i32,
    max_steps: usize,
    timeout: Duration,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn absorb(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = &delta.id {
            self.id = id.clone();
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                self.name.push_str(name);
            }
            if let Some(args) = &function.arguments {
                self.arguments.push_str(args);
            }
        }
    }
}

#[derive(Debug)]
struct StepOutcome {
    text: String,
    calls: Vec<ToolCallAccumulator>,
    finish: FinishReason,
}

impl ChatDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<Arc<str>>,
        model: &ModelConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            tools,
            system_prompt: system_prompt.into(),
            model: model.model.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            max_steps: model.max_steps.max(1),
            timeout,
        }
    }

    fn request(&self, messages: Vec<ProviderMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages,
            tools: self.tools.definitions(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }

    /// Flatten the session into provider messages, system prompt first.
    ///
    /// Completed tool invocations are replayed as an assistant tool-call
    /// message followed by one tool message per result. Pending ones are
    /// dropped since they have nothing to report.
    pub fn provider_messages(&self, history: &[ChatMessage]) -> Vec<ProviderMessage> {
        let mut out = vec![ProviderMessage::system(self.system_prompt.as_ref())];
        for message in history {
            match message.role {
                Role::User => out.push(ProviderMessage::text("user", message.content.clone())),
                Role::Assistant => {
                    let done: Vec<_> = message
                        .tool_invocations()
                        .filter(|inv| inv.state == InvocationState::Result)
                        .collect();
                    if !done.is_empty() {
                        let calls = done
                            .iter()
                            .map(|inv| ToolCall {
                                id: inv.tool_call_id.clone(),
                                kind: "function".to_string(),
                                function: FunctionCall {
                                    name: inv.tool_name.to_string(),
                                    arguments: "{}".to_string(),
                                },
                            })
                            .collect();
                        out.push(ProviderMessage::tool_calls(None, calls));
                        for inv in &done {
                            let result = inv.result.clone().unwrap_or_else(|| json!({}));
                            out.push(ProviderMessage::tool_result(inv.tool_call_id.clone(), &result));
                        }
                    }
                    if !message.content.is_empty() {
                        out.push(ProviderMessage::text("assistant", message.content.clone()));
                    }
                }
            }
        }
        out
    }

    /// Open the first model step and hand back the event stream.
    ///
    /// Failures before the model starts answering are returned directly so the
    /// HTTP layer can map them to a status code. Anything later arrives as an
    /// `Error` event followed by `Finish(Error)`.
    pub async fn dispatch(self: &Arc<Self>, history: &[ChatMessage]) -> Result<Exchange> {
        let started = Instant::now();
        let messages = self.provider_messages(history);
        tracing::info!(messages = history.len(), "dispatching chat to model");

        let first = match timeout(self.timeout, self.transport.stream_chat(&self.request(messages.clone()))).await {
            Ok(opened) => opened?,
            Err(_) => return Err(PortfolioError::Timeout(self.timeout)),
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let remaining = this.timeout.saturating_sub(started.elapsed());
            let outcome = tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!("client went away - abandoning model exchange");
                    return;
                }
                res = timeout(remaining, this.run(first, messages, &tx)) => match res {
                    Ok(outcome) => outcome,
                    Err(_) => Err(PortfolioError::Timeout(this.timeout)),
                },
            };

            let finish = match outcome {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!(error = %e, "model exchange failed mid-stream");
                    let _ = tx.send(ChatEvent::Error(e.response_body())).await;
                    FinishReason::Error
                }
            };
            let _ = tx.send(ChatEvent::Finish(finish)).await;
        });

        Ok(Exchange { events: rx, task })
    }

    async fn run(
        &self,
        mut stream: ChunkStream,
        mut messages: Vec<ProviderMessage>,
        tx: &mpsc::Sender<ChatEvent>,
    ) -> Result<FinishReason> {
        let mut step = 1;
        loop {
            let outcome = consume_step(&mut stream, tx).await?;
            tracing::debug!(step, calls = outcome.calls.len(), "model step finished");
            if outcome.calls.is_empty() {
                return Ok(outcome.finish);
            }

            let content = (!outcome.text.is_empty()).then_some(outcome.text);
            let calls: Vec<ToolCall> = outcome
                .calls
                .iter()
                .map(|call| ToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: if call.arguments.is_empty() {
                            "{}".to_string()
                        } else {
                            call.arguments.clone()
                        },
                    },
                })
                .collect();
            messages.push(ProviderMessage::tool_calls(content, calls));

            for call in &outcome.calls {
                let result = match call.name.parse::<ToolName>() {
                    Ok(tool) => {
                        emit(tx, ChatEvent::ToolCall { id: call.id.clone(), tool }).await?;
                        let result = self.tools.call(tool);
                        emit(
                            tx,
                            ChatEvent::ToolResult {
                                id: call.id.clone(),
                                tool,
                                result: result.clone(),
                            },
                        )
                        .await?;
                        result
                    }
                    Err(e) => {
                        tracing::warn!(tool = %call.name, "model asked for an unknown tool");
                        json!({ "error": e.to_string() })
                    }
                };
                messages.push(ProviderMessage::tool_result(call.id.clone(), &result));
            }

            if step >= self.max_steps {
                tracing::info!(step, "tool step cap reached");
                return Ok(FinishReason::ToolCalls);
            }
            step += 1;
            stream = self.transport.stream_chat(&self.request(messages.clone())).await?;
        }
    }
}

async fn emit(tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| PortfolioError::Internal("client disconnected".to_string()))
}

/// Forward text as it arrives and collect tool calls by index.
async fn consume_step(stream: &mut ChunkStream, tx: &mpsc::Sender<ChatEvent>) -> Result<StepOutcome> {
    let mut text = String::new();
    // keyed by the provider's index, which need not be dense
    let mut by_index: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();
    let mut finish = None;

    while let Some(chunk) = stream.next().await {
        for choice in chunk?.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                text.push_str(&content);
                emit(tx, ChatEvent::TextDelta(content)).await?;
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                by_index.entry(delta.index).or_default().absorb(&delta);
            }
            if let Some(reason) = choice.finish_reason {
                finish = Some(FinishReason::from_provider(Some(reason.as_str())));
            }
        }
    }

    let mut calls: Vec<ToolCallAccumulator> = by_index.into_values().filter(|c| !c.name.is_empty()).collect();
    for call in calls.iter_mut().filter(|c| c.id.is_empty()) {
        call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
    }

    Ok(StepOutcome {
        text,
        calls,
        finish: finish.unwrap_or(FinishReason::Stop),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::FailureKind;
    use crate::models::{MessagePart, ToolInvocation};
    use crate::profile::fixtures::sample;
    use crate::transport::mock::{MockTransport, finish, text, tool_call};
    use async_trait::async_trait;

    fn dispatcher(transport: Arc<dyn Transport>, timeout: Duration) -> Arc<ChatDispatcher> {
        let tools = Arc::new(ToolRegistry::new(Arc::new(sample())));
        Arc::new(ChatDispatcher::new(
            transport,
            tools,
            "You are Ada Park",
            &Config::default().model,
            timeout,
        ))
    }

    async fn collect(exchange: Exchange) -> Vec<ChatEvent> {
        let mut events = exchange.events;
        let mut out = Vec::new();
        while let Some(event) = events.recv().await {
            out.push(event);
        }
        out
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn stream_chat(&self, _req: &CompletionRequest) -> Result<ChunkStream> {
            Ok(futures::stream::pending().boxed())
        }
    }

    #[tokio::test]
    async fn streams_plain_text_answer() {
        let mock = Arc::new(MockTransport::new(vec![Ok(vec![
            text("Hel"),
            text("lo"),
            finish("stop"),
        ])]));
        let d = dispatcher(mock.clone(), Duration::from_secs(5));
        let events = collect(d.dispatch(&[ChatMessage::user("hi")]).await.unwrap()).await;

        assert_eq!(
            events,
            vec![
                ChatEvent::TextDelta("Hel".into()),
                ChatEvent::TextDelta("lo".into()),
                ChatEvent::Finish(FinishReason::Stop),
            ]
        );
        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, "system");
        let names: Vec<&str> = requests[0].tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(names, ToolName::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn executes_tool_and_feeds_result_back() {
        let mock = Arc::new(MockTransport::new(vec![
            Ok(vec![tool_call(0, "call_1", "getContact"), finish("tool_calls")]),
            Ok(vec![text("Email me any time."), finish("stop")]),
        ]));
        let d = dispatcher(mock.clone(), Duration::from_secs(5));
        let events = collect(d.dispatch(&[ChatMessage::user("How do I contact you?")]).await.unwrap()).await;

        let expected = ToolRegistry::new(Arc::new(sample())).call(ToolName::Contact);
        assert_eq!(
            events,
            vec![
                ChatEvent::ToolCall { id: "call_1".into(), tool: ToolName::Contact },
                ChatEvent::ToolResult { id: "call_1".into(), tool: ToolName::Contact, result: expected.clone() },
                ChatEvent::TextDelta("Email me any time.".into()),
                ChatEvent::Finish(FinishReason::Stop),
            ]
        );

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1].messages;
        let assistant = &second[second.len() - 2];
        assert_eq!(assistant.tool_calls.as_ref().unwrap()[0].function.name, "getContact");
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, "tool");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.content.as_deref(), Some(expected.to_string().as_str()));
    }

    #[tokio::test]
    async fn sparse_tool_call_indexes_keep_their_order() {
        let mock = Arc::new(MockTransport::new(vec![
            Ok(vec![
                tool_call(usize::MAX, "call_b", "getSkills"),
                tool_call(7, "call_a", "getProjects"),
                finish("tool_calls"),
            ]),
            Ok(vec![text("Done."), finish("stop")]),
        ]));
        let d = dispatcher(mock, Duration::from_secs(5));
        let events = collect(d.dispatch(&[ChatMessage::user("Projects and skills?")]).await.unwrap()).await;

        let called: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ToolCall { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(called, vec!["call_a", "call_b"]);
        assert_eq!(events.last(), Some(&ChatEvent::Finish(FinishReason::Stop)));
    }

    #[tokio::test]
    async fn stops_at_the_step_cap() {
        let mock = Arc::new(MockTransport::new(vec![
            Ok(vec![tool_call(0, "a", "getSkills"), finish("tool_calls")]),
            Ok(vec![tool_call(0, "b", "getProjects"), finish("tool_calls")]),
            Ok(vec![text("never requested"), finish("stop")]),
        ]));
        let d = dispatcher(mock.clone(), Duration::from_secs(5));
        let events = collect(d.dispatch(&[ChatMessage::user("everything")]).await.unwrap()).await;

        assert_eq!(mock.request_count(), 2);
        assert_eq!(events.last(), Some(&ChatEvent::Finish(FinishReason::ToolCalls)));
        let results = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ToolResult { .. }))
            .count();
        assert_eq!(results, 2);
    }

    #[tokio::test]
    async fn failure_before_streaming_is_returned() {
        let mock = Arc::new(MockTransport::new(vec![Err(PortfolioError::Provider {
            status: 429,
            message: "quota exceeded".into(),
        })]));
        let d = dispatcher(mock, Duration::from_secs(5));
        let err = match d.dispatch(&[ChatMessage::user("hi")]).await {
            Err(e) => e,
            Ok(_) => panic!("expected the open to fail"),
        };
        assert_eq!(err.failure_kind(), FailureKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn failure_mid_stream_becomes_error_event() {
        let mock = Arc::new(MockTransport::new(vec![Ok(vec![
            text("Partial"),
            Err(PortfolioError::Network("connection reset".into())),
        ])]));
        let d = dispatcher(mock, Duration::from_secs(5));
        let events = collect(d.dispatch(&[ChatMessage::user("hi")]).await.unwrap()).await;

        assert_eq!(events[0], ChatEvent::TextDelta("Partial".into()));
        match &events[1] {
            ChatEvent::Error(message) => {
                assert_eq!(FailureKind::classify(None, message), FailureKind::Network)
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(events[2], ChatEvent::Finish(FinishReason::Error));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model_only() {
        let mock = Arc::new(MockTransport::new(vec![
            Ok(vec![tool_call(0, "x", "getWeather"), finish("tool_calls")]),
            Ok(vec![text("I can't check the weather."), finish("stop")]),
        ]));
        let d = dispatcher(mock.clone(), Duration::from_secs(5));
        let events = collect(d.dispatch(&[ChatMessage::user("weather?")]).await.unwrap()).await;

        assert!(events.iter().all(|e| !matches!(e, ChatEvent::ToolCall { .. })));
        let requests = mock.requests.lock().unwrap();
        let tool_msg = requests[1].messages.last().unwrap();
        assert!(tool_msg.content.as_deref().unwrap().contains("getWeather"));
    }

    #[tokio::test]
    async fn deadline_surfaces_as_generic_error() {
        let d = dispatcher(Arc::new(StalledTransport), Duration::from_millis(50));
        let events = collect(d.dispatch(&[ChatMessage::user("hi")]).await.unwrap()).await;
        match &events[0] {
            ChatEvent::Error(message) => {
                assert_eq!(FailureKind::classify(None, message), FailureKind::Generic)
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(events[1], ChatEvent::Finish(FinishReason::Error));
    }

    #[tokio::test]
    async fn dropping_the_receiver_stops_the_exchange() {
        let d = dispatcher(Arc::new(StalledTransport), Duration::from_secs(60));
        let exchange = d.dispatch(&[ChatMessage::user("hi")]).await.unwrap();
        drop(exchange.events);
        tokio::time::timeout(Duration::from_secs(1), exchange.task)
            .await
            .expect("task should end once the client is gone")
            .unwrap();
    }

    #[test]
    fn history_replays_completed_tools_and_drops_pending_ones() {
        let d = dispatcher(Arc::new(MockTransport::new(Vec::new())), Duration::from_secs(1));
        let mut answered = ChatMessage::assistant("Here you go.");
        answered.parts.push(MessagePart::ToolInvocation {
            tool_invocation: ToolInvocation {
                tool_call_id: "c1".into(),
                tool_name: ToolName::Resume,
                state: InvocationState::Result,
                result: Some(json!({"summary": "bio"})),
            },
        });
        let mut pending = ChatMessage::assistant("");
        pending.parts.push(MessagePart::ToolInvocation {
            tool_invocation: ToolInvocation {
                tool_call_id: "c2".into(),
                tool_name: ToolName::Skills,
                state: InvocationState::Pending,
                result: None,
            },
        });

        let messages = d.provider_messages(&[
            ChatMessage::user("resume?"),
            answered,
            ChatMessage::user("skills?"),
            pending,
        ]);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant", "user"]);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("c1"));
    }
}
