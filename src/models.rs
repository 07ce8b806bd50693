use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolName;

// ---------------------------------------------------------------------------
// Chat session messages (what the browser / terminal client sends and keeps)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationState {
    Pending,
    Result,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: ToolName,
    pub state: InvocationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInvocation {
        tool_invocation: ToolInvocation,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: new_message_id(),
            role: Role::User,
            parts: vec![MessagePart::Text {
                text: content.clone(),
            }],
            content,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: new_message_id(),
            role: Role::Assistant,
            parts: if content.is_empty() {
                Vec::new()
            } else {
                vec![MessagePart::Text {
                    text: content.clone(),
                }]
            },
            content,
            created_at: Utc::now(),
        }
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::ToolInvocation { tool_invocation } => Some(tool_invocation),
            MessagePart::Text { .. } => None,
        })
    }

    pub fn has_pending_tool(&self) -> bool {
        self.tool_invocations()
            .any(|inv| inv.state != InvocationState::Result)
    }

    /// Append streamed text to the trailing text part, opening one if needed.
    pub fn push_text(&mut self, delta: &str) {
        match self.parts.last_mut() {
            Some(MessagePart::Text { text }) => text.push_str(delta),
            _ => self.parts.push(MessagePart::Text {
                text: delta.to_string(),
            }),
        }
        self.content.push_str(delta);
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completion format (Groq and friends)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: &Value) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(result.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// Chat completion request, always streamed
#[derive(Debug, Serialize, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: i32,
    pub stream: bool,
}

// One `data:` payload of the completion stream
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_message_accepts_sdk_shape() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "parts": [
                {"type": "text", "text": "Here you go"},
                {"type": "tool-invocation", "toolInvocation": {
                    "toolCallId": "call_1",
                    "toolName": "getProjects",
                    "state": "result",
                    "result": {"projects": []}
                }}
            ]
        }))
        .unwrap();

        assert!(!msg.id.is_empty());
        assert_eq!(msg.role, Role::Assistant);
        let invocation = msg.tool_invocations().next().unwrap();
        assert_eq!(invocation.tool_name, ToolName::Projects);
        assert!(!msg.has_pending_tool());
    }

    #[test]
    fn push_text_extends_trailing_text_part() {
        let mut msg = ChatMessage::assistant("");
        msg.push_text("Hel");
        msg.push_text("lo");
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.parts, vec![MessagePart::Text { text: "Hello".into() }]);
    }

    #[test]
    fn parses_streamed_tool_call_delta() {
        let chunk: CompletionChunk = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"getSkills","arguments":""}}]},"finish_reason":null}]}"#,
        )
        .unwrap();
        let delta = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(delta.id.as_deref(), Some("call_9"));
        assert_eq!(
            delta.function.as_ref().and_then(|f| f.name.as_deref()),
            Some("getSkills")
        );
    }
}
