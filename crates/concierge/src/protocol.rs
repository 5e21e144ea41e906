//! The AI SDK data-stream protocol spoken between server and client.
//!
//! Every part is one line of the form `<code>:<json>\n`.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

/// Incoming chat request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Body of every non-streaming failure response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPart {
    tool_call_id: String,
    tool_name: String,
    args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultPart {
    tool_call_id: String,
    result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishPart {
    finish_reason: String,
    usage: FinishUsage,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("stream part is missing its type prefix: {0:?}")]
    MissingPrefix(String),

    #[error("unknown stream part type {0:?}")]
    UnknownCode(String),

    #[error("invalid payload for stream part {code:?}: {source}")]
    InvalidPayload {
        code: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Text(String),
    Error(String),
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolResult {
        tool_call_id: String,
        result: Value,
    },
    Finish {
        finish_reason: String,
        prompt_tokens: u64,
        completion_tokens: u64,
    },
}

impl WireEvent {
    fn code(&self) -> &'static str {
        match self {
            WireEvent::Text(_) => "0",
            WireEvent::Error(_) => "3",
            WireEvent::ToolCall { .. } => "9",
            WireEvent::ToolResult { .. } => "a",
            WireEvent::Finish { .. } => "d",
        }
    }

    /// Encode as a single protocol line, including the trailing newline
    pub fn encode(&self) -> String {
        let payload = match self {
            WireEvent::Text(text) | WireEvent::Error(text) => serde_json::to_string(text),
            WireEvent::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => serde_json::to_string(&ToolCallPart {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                args: args.clone(),
            }),
            WireEvent::ToolResult {
                tool_call_id,
                result,
            } => serde_json::to_string(&ToolResultPart {
                tool_call_id: tool_call_id.clone(),
                result: result.clone(),
            }),
            WireEvent::Finish {
                finish_reason,
                prompt_tokens,
                completion_tokens,
            } => serde_json::to_string(&FinishPart {
                finish_reason: finish_reason.clone(),
                usage: FinishUsage {
                    prompt_tokens: *prompt_tokens,
                    completion_tokens: *completion_tokens,
                },
            }),
        };
        // serializing strings and Values cannot fail
        format!("{}:{}\n", self.code(), payload.unwrap_or_default())
    }

    /// Decode a single protocol line (with or without its newline)
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MissingPrefix(line.to_string()))?;

        fn parse<T: for<'de> Deserialize<'de>>(code: &str, payload: &str) -> Result<T, ProtocolError> {
            serde_json::from_str(payload).map_err(|source| ProtocolError::InvalidPayload {
                code: code.to_string(),
                source,
            })
        }

        match code {
            "0" => Ok(WireEvent::Text(parse(code, payload)?)),
            "3" => Ok(WireEvent::Error(parse(code, payload)?)),
            "9" => {
                let part: ToolCallPart = parse(code, payload)?;
                Ok(WireEvent::ToolCall {
                    tool_call_id: part.tool_call_id,
                    tool_name: part.tool_name,
                    args: part.args,
                })
            }
            "a" => {
                let part: ToolResultPart = parse(code, payload)?;
                Ok(WireEvent::ToolResult {
                    tool_call_id: part.tool_call_id,
                    result: part.result,
                })
            }
            "d" => {
                let part: FinishPart = parse(code, payload)?;
                Ok(WireEvent::Finish {
                    finish_reason: part.finish_reason,
                    prompt_tokens: part.usage.prompt_tokens,
                    completion_tokens: part.usage.completion_tokens,
                })
            }
            other => Err(ProtocolError::UnknownCode(other.to_string())),
        }
    }
}

/// Splits an arbitrarily chunked byte stream into protocol lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a final newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}
