use concierge::protocol::{ChatMessage, ChatRequest, WireEvent};
use serde_json::Value;

use crate::error_state::{error_message_from_response, ErrorState, Observation};

pub const USER: &str = "user";
pub const ASSISTANT: &str = "assistant";
/// Display-only messages, such as tool steps. The server never replays them.
pub const SYSTEM: &str = "system";

/// Client side of one conversation: the message list, the loading flag and
/// the blocking error state.
///
/// Every method applies one observed event; none of them do I/O.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    loading: bool,
    error: ErrorState,
    /// Set once an error part arrives; later parts of that stream are ignored
    halted: bool,
    streaming_into: Option<usize>,
    notifications: Vec<String>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> &ErrorState {
        &self.error
    }

    /// Transient notifications raised since the last call
    pub fn take_notifications(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notifications)
    }

    /// Start a request for `text`. Returns None, and changes nothing, while a
    /// request is in flight, while blocked, or for blank input.
    pub fn submit(&mut self, text: &str) -> Option<ChatRequest> {
        if self.loading || self.error.is_blocked() || text.trim().is_empty() {
            return None;
        }

        self.push(USER, text.trim().to_string());
        self.loading = true;
        self.halted = false;
        self.streaming_into = None;

        Some(ChatRequest {
            messages: self.messages.clone(),
        })
    }

    pub fn on_response_ok(&mut self) {
        self.observe(Observation::ResponseOk);
    }

    pub fn on_response_failed(&mut self, status: u16, body: &str) {
        let message = error_message_from_response(status, body);
        self.observe(Observation::ResponseFailed { message });
        self.loading = false;
    }

    /// Apply one stream part. Returns whether it was applied.
    pub fn on_event(&mut self, event: &WireEvent) -> bool {
        if self.halted || !self.loading {
            return false;
        }

        match event {
            WireEvent::Text(delta) => self.append_delta(delta),
            WireEvent::ToolCall {
                tool_name, args, ..
            } => {
                self.push(SYSTEM, format!("Using {} {}", tool_name, compact(args)));
            }
            WireEvent::ToolResult { result, .. } => {
                self.push(SYSTEM, format!("Result {}", compact(result)));
            }
            WireEvent::Error(message) => {
                self.halted = true;
                self.loading = false;
                self.notifications.push(message.clone());
                self.observe(Observation::StreamError {
                    message: message.clone(),
                });
            }
            WireEvent::Finish { .. } => {
                self.loading = false;
                self.observe(Observation::Completed);
            }
        }
        true
    }

    pub fn on_transport_error(&mut self, message: &str) {
        self.loading = false;
        self.notifications.push(message.to_string());
        self.observe(Observation::TransportFailed {
            message: message.to_string(),
        });
    }

    /// The response body ended. A stream that ends without a finish part
    /// still counts as complete.
    pub fn on_stream_end(&mut self) {
        if self.loading {
            self.loading = false;
            self.observe(Observation::Completed);
        }
    }

    /// The user's recovery action. Yields the URL to send them to, or None if
    /// there is nothing to recover from.
    pub fn retry(&self, reauth_url: &str) -> Option<String> {
        self.error.is_blocked().then(|| reauth_url.to_string())
    }

    pub fn reauthenticated(&mut self) {
        self.observe(Observation::Reauthenticated);
    }

    fn observe(&mut self, observation: Observation) {
        self.error = std::mem::take(&mut self.error).transition(&observation);
    }

    fn append_delta(&mut self, delta: &str) {
        match self.streaming_into {
            Some(index) => self.messages[index].content.push_str(delta),
            None => {
                self.push(ASSISTANT, delta.to_string());
                self.streaming_into = Some(self.messages.len() - 1);
            }
        }
    }

    fn push(&mut self, role: &str, content: String) {
        self.messages.push(ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: role.to_string(),
            content,
        });
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
