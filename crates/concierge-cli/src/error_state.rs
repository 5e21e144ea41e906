use concierge::protocol::ErrorBody;

pub const READY_PLACEHOLDER: &str = "Send a message...";
pub const BLOCKED_PLACEHOLDER: &str = "Sign out and sign back in to continue";

/// What the client saw happen to a chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The server accepted the request and started streaming
    ResponseOk,
    /// The server answered with a non-success status
    ResponseFailed { message: String },
    TransportFailed { message: String },
    /// An error part arrived inside the stream
    StreamError { message: String },
    Completed,
    /// The user came back from the re-authentication flow
    Reauthenticated,
}

/// The blocking error flag. While blocked, input is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorState {
    #[default]
    Clear,
    Blocked { message: String },
}

impl ErrorState {
    pub fn transition(self, observation: &Observation) -> ErrorState {
        match (self, observation) {
            (_, Observation::ResponseFailed { message })
            | (_, Observation::TransportFailed { message })
            | (_, Observation::StreamError { message }) => ErrorState::Blocked {
                message: message.clone(),
            },
            (_, Observation::ResponseOk) | (_, Observation::Reauthenticated) => ErrorState::Clear,
            (state, Observation::Completed) => state,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, ErrorState::Blocked { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ErrorState::Clear => None,
            ErrorState::Blocked { message } => Some(message),
        }
    }

    pub fn input_enabled(&self) -> bool {
        !self.is_blocked()
    }

    pub fn placeholder(&self) -> &'static str {
        if self.is_blocked() {
            BLOCKED_PLACEHOLDER
        } else {
            READY_PLACEHOLDER
        }
    }
}

/// The message to show for a failed response: the body's `error` if it has
/// one, otherwise one made up from the status code
pub fn error_message_from_response(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) if !error.trim().is_empty() => error,
        _ => format!("Request failed with status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(message: &str) -> Observation {
        Observation::ResponseFailed {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_failures_block() {
        for observation in [
            failed("forbidden"),
            Observation::TransportFailed {
                message: "connection refused".into(),
            },
            Observation::StreamError {
                message: "model overloaded".into(),
            },
        ] {
            let state = ErrorState::Clear.transition(&observation);
            assert!(state.is_blocked());
            assert!(!state.input_enabled());
            assert_eq!(state.placeholder(), BLOCKED_PLACEHOLDER);
        }
    }

    #[test]
    fn test_completion_keeps_state() {
        assert_eq!(
            ErrorState::Clear.transition(&Observation::Completed),
            ErrorState::Clear
        );
        let blocked = ErrorState::Clear.transition(&failed("forbidden"));
        assert_eq!(blocked.clone().transition(&Observation::Completed), blocked);
    }

    #[test]
    fn test_clears_on_reauth_or_success() {
        let blocked = ErrorState::Clear.transition(&failed("forbidden"));
        assert_eq!(blocked.message(), Some("forbidden"));

        let cleared = blocked.clone().transition(&Observation::Reauthenticated);
        assert_eq!(cleared, ErrorState::Clear);
        assert!(cleared.input_enabled());
        assert_eq!(cleared.placeholder(), READY_PLACEHOLDER);

        assert_eq!(blocked.transition(&Observation::ResponseOk), ErrorState::Clear);
    }

    #[test]
    fn test_error_message_from_response() {
        assert_eq!(
            error_message_from_response(403, r#"{"error":"forbidden"}"#),
            "forbidden"
        );
        assert_eq!(
            error_message_from_response(502, "<html>Bad Gateway</html>"),
            "Request failed with status 502"
        );
        assert_eq!(
            error_message_from_response(400, r#"{"error":""}"#),
            "Request failed with status 400"
        );
        assert_eq!(
            error_message_from_response(500, r#"{"message":"nope"}"#),
            "Request failed with status 500"
        );
    }
}
