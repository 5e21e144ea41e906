use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a capability call failed. The message is shown to the model as the
/// tool result, so it should say what the model can do about it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The remote service rejected the delegated credential mid-request
    #[error("{service} rejected the credential ({status}); the user needs to sign out and sign back in")]
    CredentialRejected { service: String, status: u16 },

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

impl AgentError {
    /// Classify a non-success status from a capability's backing service
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => AgentError::CredentialRejected {
                service: service.to_string(),
                status,
            },
            _ if body.trim().is_empty() => {
                AgentError::ExecutionError(format!("{} returned {}", service, status))
            }
            _ => AgentError::ExecutionError(format!("{} returned {}: {}", service, status, body.trim())),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
