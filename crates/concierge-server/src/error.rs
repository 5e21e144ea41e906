use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use concierge::protocol::ErrorBody;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings path to the environment variable that sets it
pub fn to_env_var(field_path: &str) -> String {
    format!("CONCIERGE_{}", field_path.to_uppercase().replace('.', "__"))
}

/// Failures a chat request can end with before its stream starts. Rendered
/// as `{ "error": ... }` with the matching status.
#[derive(Error, Debug)]
pub enum ApiError {
    /// A precondition of the server itself is not met
    #[error("Server configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    BadRequest(String),
    /// The model API refused the request; its status is passed through
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "chat request failed: {}", self);
        } else {
            tracing::warn!(%status, "chat request rejected: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
