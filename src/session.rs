use serde_json::Value;

use crate::models::{ChatMessage, InvocationState, MessagePart, Role, ToolInvocation};
use crate::tools::ToolName;

/// How a streamed reply ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Complete,
    Aborted,
}

/// Append-only accumulator for the assistant reply currently streaming in.
///
/// The assistant message is created lazily on the first delta so that an
/// exchange that fails before any output leaves no empty bubble behind.
#[derive(Debug, Default, Clone, PartialEq)]
struct ReplyAccumulator {
    message_index: Option<usize>,
}

/// Linear message history for one visit. Never persisted.
#[derive(Debug, Default, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    reply: Option<ReplyAccumulator>,
    last_terminal: Option<Terminal>,
}

/// Derived on demand from the message list.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub latest_user: Option<&'a ChatMessage>,
    /// Absent when the visitor has spoken again since this reply.
    pub latest_assistant: Option<&'a ChatMessage>,
    /// Some assistant message still waits for a tool result.
    pub tool_pending: bool,
    /// The shown assistant message carries at least one tool result.
    pub has_tool_result: bool,
}

impl SessionView<'_> {
    pub fn is_empty(&self) -> bool {
        self.latest_user.is_none() && self.latest_assistant.is_none()
    }

    pub fn is_waiting(&self) -> bool {
        self.latest_user.is_some() && self.latest_assistant.is_none()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn derive_view(&self) -> SessionView<'_> {
        let user_idx = self.messages.iter().rposition(|m| m.role == Role::User);
        let assistant_idx = self.messages.iter().rposition(|m| m.role == Role::Assistant);

        let fresh_assistant = match (assistant_idx, user_idx) {
            (Some(a), Some(u)) if a < u => None,
            (a, _) => a,
        };
        let latest_assistant = fresh_assistant.map(|i| &self.messages[i]);

        SessionView {
            latest_user: user_idx.map(|i| &self.messages[i]),
            latest_assistant,
            tool_pending: self
                .messages
                .iter()
                .any(|m| m.role == Role::Assistant && m.has_pending_tool()),
            has_tool_result: latest_assistant.is_some_and(|m| {
                m.tool_invocations()
                    .any(|inv| inv.state == InvocationState::Result)
            }),
        }
    }

    /// The first tool still waiting for its result, if any.
    pub fn pending_tool(&self) -> Option<ToolName> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_invocations())
            .find(|inv| inv.state != InvocationState::Result)
            .map(|inv| inv.tool_name)
    }

    // --- streamed reply ------------------------------------------------------

    pub fn begin_reply(&mut self) {
        self.reply = Some(ReplyAccumulator::default());
        self.last_terminal = None;
    }

    pub fn reply_in_progress(&self) -> bool {
        self.reply.is_some()
    }

    pub fn last_terminal(&self) -> Option<Terminal> {
        self.last_terminal
    }

    /// The assistant message of the open reply, if it produced any output yet.
    pub fn reply_message(&self) -> Option<&ChatMessage> {
        self.reply
            .as_ref()
            .and_then(|r| r.message_index)
            .map(|i| &self.messages[i])
    }

    fn reply_message_mut(&mut self) -> Option<&mut ChatMessage> {
        let reply = self.reply.as_mut()?;
        let index = match reply.message_index {
            Some(i) => i,
            None => {
                self.messages.push(ChatMessage::assistant(""));
                let i = self.messages.len() - 1;
                reply.message_index = Some(i);
                i
            }
        };
        self.messages.get_mut(index)
    }

    /// Returns false when no reply is open.
    pub fn push_text(&mut self, delta: &str) -> bool {
        match self.reply_message_mut() {
            Some(msg) => {
                msg.push_text(delta);
                true
            }
            None => false,
        }
    }

    pub fn push_tool_call(&mut self, id: &str, tool: ToolName) -> bool {
        match self.reply_message_mut() {
            Some(msg) => {
                msg.parts.push(MessagePart::ToolInvocation {
                    tool_invocation: ToolInvocation {
                        tool_call_id: id.to_string(),
                        tool_name: tool,
                        state: InvocationState::Pending,
                        result: None,
                    },
                });
                true
            }
            None => false,
        }
    }

    /// Attach a result to the matching pending invocation, adding the
    /// invocation first if its call was never seen.
    pub fn attach_tool_result(&mut self, id: &str, tool: ToolName, result: Value) -> bool {
        let Some(msg) = self.reply_message_mut() else {
            return false;
        };
        let existing = msg.parts.iter_mut().find_map(|part| match part {
            MessagePart::ToolInvocation { tool_invocation } if tool_invocation.tool_call_id == id => {
                Some(tool_invocation)
            }
            _ => None,
        });
        match existing {
            Some(invocation) => {
                invocation.state = InvocationState::Result;
                invocation.result = Some(result);
            }
            None => msg.parts.push(MessagePart::ToolInvocation {
                tool_invocation: ToolInvocation {
                    tool_call_id: id.to_string(),
                    tool_name: tool,
                    state: InvocationState::Result,
                    result: Some(result),
                },
            }),
        }
        true
    }

    /// Close the open reply. Partial output is kept either way.
    ///
    /// A closed reply can no longer receive tool results, so invocations still
    /// pending at this point are dropped whatever the terminal.
    pub fn end_reply(&mut self, terminal: Terminal) -> Option<Terminal> {
        let reply = self.reply.take()?;
        if let Some(index) = reply.message_index {
            if let Some(msg) = self.messages.get_mut(index) {
                msg.parts.retain(|part| match part {
                    MessagePart::ToolInvocation { tool_invocation } => {
                        tool_invocation.state == InvocationState::Result
                    }
                    MessagePart::Text { .. } => true,
                });
                // nothing survived, so leave no empty bubble behind
                if msg.content.is_empty() && msg.parts.is_empty() && index + 1 == self.messages.len() {
                    self.messages.pop();
                }
            }
        }
        self.last_terminal = Some(terminal);
        Some(terminal)
    }
}
