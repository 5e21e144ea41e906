use serde_json::Value;

use crate::errors::AgentResult;
use crate::providers::base::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// The agent hit its tool round limit
    Length,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
        }
    }
}

/// One unit of agent output, in generation order
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TextDelta(String),
    ToolCallStarted {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallFinished {
        id: String,
        name: String,
        result: AgentResult<Value>,
    },
    /// Token accounting for one model round
    Usage(Usage),
    Completion {
        reason: FinishReason,
        usage: Usage,
    },
    Error(String),
}

impl AgentEvent {
    /// Whether this event ends the event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Completion { .. } | AgentEvent::Error(_))
    }
}
