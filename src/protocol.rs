//! Line-oriented data stream spoken by `POST /api/chat`.
//!
//! Each line is `<code>:<json>\n`:
//!
//! | code | payload                                   |
//! |------|-------------------------------------------|
//! | `0`  | text delta, JSON string                   |
//! | `9`  | tool call `{toolCallId, toolName, args}`  |
//! | `a`  | tool result `{toolCallId, toolName, result}` |
//! | `3`  | error message, JSON string                |
//! | `d`  | finish `{finishReason}`                   |

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{PortfolioError, Result};
use crate::tools::ToolName;

pub const STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const STREAM_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
    Other,
}

impl FinishReason {
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") | None => FinishReason::Stop,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::Length,
            Some(_) => FinishReason::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta(String),
    ToolCall { id: String, tool: ToolName },
    ToolResult { id: String, tool: ToolName, result: Value },
    Error(String),
    Finish(FinishReason),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallLine {
    tool_call_id: String,
    tool_name: ToolName,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultLine {
    tool_call_id: String,
    tool_name: ToolName,
    result: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishLine {
    finish_reason: FinishReason,
}

impl ChatEvent {
    pub fn encode(&self) -> String {
        let (code, payload) = match self {
            ChatEvent::TextDelta(text) => ('0', json!(text)),
            ChatEvent::ToolCall { id, tool } => (
                '9',
                json!(ToolCallLine {
                    tool_call_id: id.clone(),
                    tool_name: *tool,
                    args: json!({}),
                }),
            ),
            ChatEvent::ToolResult { id, tool, result } => (
                'a',
                json!(ToolResultLine {
                    tool_call_id: id.clone(),
                    tool_name: *tool,
                    result: result.clone(),
                }),
            ),
            ChatEvent::Error(message) => ('3', json!(message)),
            ChatEvent::Finish(reason) => (
                'd',
                json!(FinishLine {
                    finish_reason: *reason,
                }),
            ),
        };
        format!("{code}:{payload}\n")
    }

    /// Decode one line. Blank lines and unknown codes yield `None`.
    pub fn decode(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some((code, payload)) = line.split_once(':') else {
            return Ok(None);
        };

        let event = match code {
            "0" => ChatEvent::TextDelta(serde_json::from_str(payload)?),
            "9" => {
                let call: ToolCallLine = serde_json::from_str(payload)?;
                ChatEvent::ToolCall {
                    id: call.tool_call_id,
                    tool: call.tool_name,
                }
            }
            "a" => {
                let res: ToolResultLine = serde_json::from_str(payload)?;
                ChatEvent::ToolResult {
                    id: res.tool_call_id,
                    tool: res.tool_name,
                    result: res.result,
                }
            }
            "3" => ChatEvent::Error(serde_json::from_str(payload)?),
            "d" => {
                let finish: FinishLine = serde_json::from_str(payload)?;
                ChatEvent::Finish(finish.finish_reason)
            }
            other => {
                tracing::debug!("Ignoring unknown stream code {:?}", other);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Splits an arbitrarily chunked byte stream into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8(raw)
                .map_err(|e| PortfolioError::Internal(format!("stream is not UTF-8: {e}")))?;
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(lines)
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
        Some(rest)
    }
}
