use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use concierge::{
    agent::{Agent, SessionContext},
    capabilities::{base_capabilities, build_google_capabilities, tools},
    models::message::Message,
    prompt_template::behavior_template,
    protocol::{ChatMessage, ChatRequest, DATA_STREAM_HEADER, DATA_STREAM_VERSION},
    providers::base::ProviderError,
    provisioner::{CredentialOutcome, Provision, Provisioner},
    transcoder::{transcode, TranscodeOptions},
};
use futures::{stream::StreamExt, Stream};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

/// Which capabilities a chat route may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    /// Search and calculator only
    Base,
    /// Adds Gmail and Google Calendar through a delegated credential
    Google,
}

// Streaming response that speaks the AI SDK data-stream protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
                (
                    header::HeaderName::from_static(DATA_STREAM_HEADER),
                    DATA_STREAM_VERSION,
                ),
            ],
            body,
        )
            .into_response()
    }
}

// Keep only the conversational turns; display-only messages never reach the model
fn convert_messages(incoming: Vec<ChatMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "user" => messages.push(Message::user().with_text(msg.content)),
            "assistant" => {
                if !msg.content.is_empty() {
                    messages.push(Message::assistant().with_text(msg.content));
                }
            }
            _ => {
                tracing::debug!(role = %msg.role, id = %msg.id, "skipping non-conversational message");
            }
        }
    }

    messages
}

/// The caller's session token, from `Authorization: Bearer <token>`
fn session_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn provision(state: &AppState, variant: Variant, headers: &HeaderMap) -> Provision {
    let (base, _) = base_capabilities(state.settings.search.config());
    let provisioner = Provisioner::new(base);

    match variant {
        Variant::Base => provisioner.provision(CredentialOutcome::NotRequired, |_| Ok(Vec::new())),
        Variant::Google => {
            let google = state.google.clone();
            provisioner
                .acquire(
                    state.identity.as_deref(),
                    session_token(headers),
                    move |token| build_google_capabilities(token, &google),
                )
                .await
        }
    }
}

async fn handle(
    state: AppState,
    variant: Variant,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<SseResponse, ApiError> {
    // Check protocol header (optional in our case)
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(ApiError::BadRequest("unsupported stream protocol".to_string()));
        }
    }

    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let history = convert_messages(request.messages);

    let provider_config = state
        .settings
        .model
        .provider_config()
        .ok_or_else(|| ApiError::Config("Missing Gemini API key".to_string()))?;

    let provision = provision(&state, variant, &headers).await;
    if let Some(note) = &provision.note {
        tracing::warn!(
            remediation = ?note.remediation,
            detail = %note.detail,
            "serving {:?} chat with reduced capabilities",
            variant
        );
    }

    let template = behavior_template(&tools(&provision.capabilities), Utc::now())
        .map_err(|e| ApiError::Internal(format!("failed to render behavior template: {}", e)))?;
    let context = SessionContext::new(history, provision, template);

    let provider = (state.provider_factory)(provider_config)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let events = Agent::new(provider).reply(context).await.map_err(|err| {
        match err.downcast_ref::<ProviderError>() {
            Some(provider_error) => ApiError::Upstream {
                status: provider_error.status,
                message: provider_error.message.clone(),
            },
            None => ApiError::Internal(err.to_string()),
        }
    })?;

    let options = TranscodeOptions {
        log_tool_steps: state.settings.dev.log_tool_steps,
    };
    let mut wire = transcode(events, options).boxed();

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        loop {
            match timeout(Duration::from_millis(500), wire.next()).await {
                Ok(Some(event)) => {
                    if let Err(e) = tx.send(event.encode()).await {
                        tracing::error!("Error sending event through channel: {}", e);
                        break;
                    }
                }
                Ok(None) => break,
                // Heartbeat, used to detect disconnected clients and stop running tools
                Err(_) => {
                    if tx.is_closed() {
                        tracing::info!("client disconnected, abandoning reply");
                        break;
                    }
                }
            }
        }
    });

    Ok(SseResponse::new(ReceiverStream::new(rx)))
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<SseResponse, ApiError> {
    handle(state, Variant::Base, headers, body).await
}

async fn google_chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<SseResponse, ApiError> {
    handle(state, Variant::Google, headers, body).await
}

async fn health() -> StatusCode {
    StatusCode::OK
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/google", post(google_chat_handler))
        .route("/health", get(health))
        .with_state(state)
}
