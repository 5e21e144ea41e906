use futures::{future, Stream, StreamExt};
use serde_json::json;

use crate::events::AgentEvent;
use crate::protocol::WireEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeOptions {
    /// Log tool steps on the server instead of forwarding them to the client
    pub log_tool_steps: bool,
}

/// Map one agent event to at most one wire event
pub fn transcode_event(event: AgentEvent, options: &TranscodeOptions) -> Option<WireEvent> {
    match event {
        AgentEvent::TextDelta(text) if text.is_empty() => None,
        AgentEvent::TextDelta(text) => Some(WireEvent::Text(text)),
        AgentEvent::ToolCallStarted {
            id,
            name,
            arguments,
        } => {
            if options.log_tool_steps {
                tracing::info!(tool_call_id = %id, tool = %name, %arguments, "tool call started");
                return None;
            }
            Some(WireEvent::ToolCall {
                tool_call_id: id,
                tool_name: name,
                args: arguments,
            })
        }
        AgentEvent::ToolCallFinished { id, name, result } => {
            if options.log_tool_steps {
                match &result {
                    Ok(output) => tracing::info!(tool_call_id = %id, tool = %name, %output, "tool call finished"),
                    Err(err) => tracing::info!(tool_call_id = %id, tool = %name, error = %err, "tool call failed"),
                }
                return None;
            }
            let result = match result {
                Ok(output) => output,
                Err(err) => json!({ "error": err.to_string() }),
            };
            Some(WireEvent::ToolResult {
                tool_call_id: id,
                result,
            })
        }
        AgentEvent::Usage(_) => None,
        AgentEvent::Completion { reason, usage } => Some(WireEvent::Finish {
            finish_reason: reason.as_str().to_string(),
            prompt_tokens: usage.input_tokens.unwrap_or(0).max(0) as u64,
            completion_tokens: usage.output_tokens.unwrap_or(0).max(0) as u64,
        }),
        AgentEvent::Error(message) => Some(WireEvent::Error(message)),
    }
}

/// Lazily reshape an agent event stream into wire events, preserving order
pub fn transcode<S>(events: S, options: TranscodeOptions) -> impl Stream<Item = WireEvent>
where
    S: Stream<Item = AgentEvent>,
{
    events.filter_map(move |event| future::ready(transcode_event(event, &options)))
}
