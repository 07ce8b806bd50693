//! Client half of the response router.
//!
//! Decides for each submitted question whether a canned preset answers it or
//! the model has to, then folds the model's event stream into the session and
//! a single visible [`RouterState`].

use futures::StreamExt;
use futures::future::{AbortHandle, Abortable};
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;

use crate::compiler::{CONTACT_QUESTION, PresetEntry, PresetReplies};
use crate::error::{FailureKind, PortfolioError, Result};
use crate::models::ChatMessage;
use crate::protocol::{ChatEvent, FinishReason};
use crate::session::{ChatSession, SessionView, Terminal};
use crate::tools::ToolName;

pub type EventStream = BoxStream<'static, Result<ChatEvent>>;

pub const QUOTA_NOTE: &str = "**API Quota Exhausted**\n\n\
    The free model quota has been reached for today. \
    Please contact me directly or use the preset questions below.";

/// Where the model lives, as seen by the router. Opening is lazy: nothing
/// goes over the wire until the returned stream is polled.
#[cfg_attr(test, mockall::automock)]
pub trait ChatBackend: Send + Sync {
    fn open(&self, messages: Vec<ChatMessage>) -> EventStream;
}

/// How a question was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// Quick-question buttons. The only entry point presets can answer.
    QuickQuestion,
    /// The free-text box. Always goes to the model.
    FreeText,
    /// Explicit request for a live answer to a question a preset already covered.
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-send the conversation as it stands.
    Retry,
    /// Show the contact preset.
    ContactPreset,
    /// Dismiss the error and go back to the quick questions.
    UsePresets,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterState {
    Idle,
    PresetShown(PresetEntry),
    AwaitingModel,
    StreamingAnswer,
    ToolResultShown {
        tool: ToolName,
        result: Value,
    },
    ErrorShown {
        kind: FailureKind,
        message: String,
        actions: Vec<RecoveryAction>,
    },
}

/// What `submit` did with a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Preset,
    Dispatched,
    /// Blank input, silently dropped.
    Ignored,
}

struct InFlight {
    events: Abortable<EventStream>,
    abort: AbortHandle,
}

pub struct ResponseRouter {
    backend: Arc<dyn ChatBackend>,
    presets: PresetReplies,
    session: ChatSession,
    state: RouterState,
    inflight: Option<InFlight>,
}

impl FailureKind {
    pub fn recovery_actions(self) -> Vec<RecoveryAction> {
        match self {
            FailureKind::QuotaExceeded => vec![RecoveryAction::ContactPreset, RecoveryAction::UsePresets],
            FailureKind::Network => vec![RecoveryAction::Retry],
            FailureKind::Generic => vec![RecoveryAction::Retry, RecoveryAction::ContactPreset],
        }
    }

    fn user_message(self, detail: &str) -> String {
        match self {
            FailureKind::QuotaExceeded => {
                "API quota exhausted. Contact me directly or use the preset questions.".to_string()
            }
            FailureKind::Network => "Network error. Please check your connection and try again.".to_string(),
            FailureKind::Generic => format!("Error: {detail}"),
        }
    }
}

impl ResponseRouter {
    pub fn new(backend: Arc<dyn ChatBackend>, presets: PresetReplies) -> Self {
        Self {
            backend,
            presets,
            session: ChatSession::new(),
            state: RouterState::Idle,
            inflight: None,
        }
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn presets(&self) -> &PresetReplies {
        &self.presets
    }

    pub fn view(&self) -> SessionView<'_> {
        self.session.derive_view()
    }

    pub fn is_loading(&self) -> bool {
        self.inflight.is_some()
    }

    /// Landing screen: nothing asked, nothing shown, nothing in flight.
    pub fn is_empty_state(&self) -> bool {
        self.session.derive_view().is_empty() && !self.is_loading() && self.state == RouterState::Idle
    }

    /// Lets another task stop the exchange in flight, e.g. a Ctrl-C handler.
    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.inflight.as_ref().map(|f| f.abort.clone())
    }

    pub fn submit(&mut self, query: &str, entry: EntryPoint) -> Result<Routed> {
        if query.trim().is_empty() {
            return Ok(Routed::Ignored);
        }
        if let Some(tool) = self.session.pending_tool() {
            tracing::debug!(%tool, "submission rejected while a tool call is pending");
            return Err(PortfolioError::SessionBusy(tool));
        }

        // one exchange at a time, and a preset replaces whatever was streaming
        if self.is_loading() {
            self.stop();
        }

        if entry == EntryPoint::QuickQuestion {
            if let Some(preset) = self.presets.get(query) {
                tracing::debug!(tool = %preset.tool, "answered from preset");
                self.state = RouterState::PresetShown(preset.clone());
                return Ok(Routed::Preset);
            }
        }

        self.session.append(ChatMessage::user(query));
        self.dispatch();
        Ok(Routed::Dispatched)
    }

    /// Ask the model about the preset currently on screen.
    pub fn escalate(&mut self) -> Result<Routed> {
        match &self.state {
            RouterState::PresetShown(preset) => {
                let question = preset.question.clone();
                self.submit(&question, EntryPoint::Escalate)
            }
            _ => Ok(Routed::Ignored),
        }
    }

    fn dispatch(&mut self) {
        let (abort, registration) = AbortHandle::new_pair();
        let stream = self.backend.open(self.session.messages().to_vec());
        self.inflight = Some(InFlight {
            events: Abortable::new(stream, registration),
            abort,
        });
        self.session.begin_reply();
        self.state = RouterState::AwaitingModel;
    }

    /// Wait for the next event of the exchange in flight and apply it.
    /// Returns `None` when nothing is in flight.
    pub async fn next_event(&mut self) -> Option<&RouterState> {
        let inflight = self.inflight.as_mut()?;
        match inflight.events.next().await {
            Some(Ok(event)) => self.apply(event),
            Some(Err(e)) => self.fail(e.failure_kind(), &e.to_string()),
            None if inflight_was_aborted(&self.inflight) => self.stop_inner(),
            None => self.complete(FinishReason::Stop),
        }
        Some(&self.state)
    }

    /// Drain the exchange in flight.
    pub async fn run_to_completion(&mut self) -> &RouterState {
        while self.is_loading() {
            self.next_event().await;
        }
        &self.state
    }

    fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::TextDelta(delta) => {
                self.session.push_text(&delta);
                if !matches!(self.state, RouterState::ToolResultShown { .. }) {
                    self.state = RouterState::StreamingAnswer;
                }
            }
            ChatEvent::ToolCall { id, tool } => {
                self.session.push_tool_call(&id, tool);
            }
            ChatEvent::ToolResult { id, tool, result } => {
                self.session.attach_tool_result(&id, tool, result.clone());
                self.state = RouterState::ToolResultShown { tool, result };
            }
            ChatEvent::Error(message) => {
                let kind = FailureKind::classify(None, &message);
                self.fail(kind, &message);
            }
            ChatEvent::Finish(reason) => self.complete(reason),
        }
    }

    fn complete(&mut self, reason: FinishReason) {
        self.session.end_reply(Terminal::Complete);
        self.inflight = None;
        tracing::debug!(?reason, "exchange finished");

        // nothing visible arrived: no text and no tool result
        if self.state == RouterState::AwaitingModel {
            self.fail(FailureKind::Generic, "the model returned an empty response");
        }
    }

    fn fail(&mut self, kind: FailureKind, detail: &str) {
        tracing::warn!(?kind, detail, "model exchange failed");
        self.session.end_reply(Terminal::Complete);
        self.inflight = None;
        if kind == FailureKind::QuotaExceeded {
            self.session.append(ChatMessage::assistant(QUOTA_NOTE));
        }
        self.state = RouterState::ErrorShown {
            kind,
            message: kind.user_message(detail),
            actions: kind.recovery_actions(),
        };
    }

    /// Abort the exchange in flight, keeping whatever arrived so far.
    /// Returns false when nothing was in flight.
    pub fn stop(&mut self) -> bool {
        match &self.inflight {
            Some(inflight) => {
                inflight.abort.abort();
                self.stop_inner();
                true
            }
            None => false,
        }
    }

    fn stop_inner(&mut self) {
        self.inflight = None;
        self.session.end_reply(Terminal::Aborted);
        if self.state == RouterState::AwaitingModel {
            self.state = RouterState::Idle;
        }
        tracing::debug!("exchange stopped");
    }

    pub fn recover(&mut self, action: RecoveryAction) -> Result<&RouterState> {
        match action {
            RecoveryAction::Retry => {
                if self.session.latest_user_text().is_none() {
                    return Err(PortfolioError::Internal("nothing to retry".to_string()));
                }
                if let Some(tool) = self.session.pending_tool() {
                    return Err(PortfolioError::SessionBusy(tool));
                }
                if self.is_loading() {
                    self.stop();
                }
                self.dispatch();
            }
            RecoveryAction::ContactPreset => {
                self.state = match self.presets.get(CONTACT_QUESTION) {
                    Some(preset) => RouterState::PresetShown(preset.clone()),
                    None => RouterState::Idle,
                };
            }
            RecoveryAction::UsePresets => self.state = RouterState::Idle,
        }
        Ok(&self.state)
    }
}

fn inflight_was_aborted(inflight: &Option<InFlight>) -> bool {
    inflight.as_ref().is_some_and(|f| f.abort.is_aborted())
}
