use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use concierge::protocol::{ChatRequest, LineDecoder, ProtocolError, WireEvent};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed stream: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type EventStream = BoxStream<'static, Result<WireEvent, TransportError>>;

/// How the server answered a chat request
pub enum ChatResponse {
    Failed { status: u16, body: String },
    Streaming(EventStream),
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError>;
}

/// Talks to a chat endpoint over HTTP
pub struct HttpTransport {
    client: Client,
    url: String,
    session: Option<String>,
}

impl HttpTransport {
    pub fn new(url: String, session: Option<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url,
            session,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(session) = &self.session {
            builder = builder.bearer_auth(session);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ChatResponse::Failed {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = response.bytes_stream();
        let events = async_stream::stream! {
            let mut decoder = LineDecoder::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for line in decoder.push(&chunk) {
                            yield WireEvent::decode(&line).map_err(TransportError::from);
                        }
                    }
                    Err(e) => {
                        yield Err(TransportError::from(e));
                        return;
                    }
                }
            }
            if let Some(line) = decoder.finish() {
                yield WireEvent::decode(&line).map_err(TransportError::from);
            }
        };
        Ok(ChatResponse::Streaming(events.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge::protocol::ChatMessage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage {
                id: "1".into(),
                role: "user".into(),
                content: "hi".into(),
            }],
        }
    }

    #[tokio::test]
    async fn test_streams_decoded_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer session-123"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "0:\"Hel\"\n0:\"lo\"\nd:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":1,\"completionTokens\":2}}\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            format!("{}/api/chat", server.uri()),
            Some("session-123".into()),
        )
        .unwrap();
        let events: Vec<WireEvent> = match transport.send(&request()).await.unwrap() {
            ChatResponse::Streaming(stream) => stream.map(|e| e.unwrap()).collect().await,
            ChatResponse::Failed { status, .. } => panic!("unexpected status {}", status),
        };

        assert_eq!(
            events,
            vec![
                WireEvent::Text("Hel".into()),
                WireEvent::Text("lo".into()),
                WireEvent::Finish {
                    finish_reason: "stop".into(),
                    prompt_tokens: 1,
                    completion_tokens: 2,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_status_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403).set_body_raw(r#"{"error":"forbidden"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), None).unwrap();
        match transport.send(&request()).await.unwrap() {
            ChatResponse::Failed { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, r#"{"error":"forbidden"}"#);
            }
            ChatResponse::Streaming(_) => panic!("expected a failure"),
        }
    }

    #[tokio::test]
    async fn test_malformed_line_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("z:\"?\"\n", "text/event-stream"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), None).unwrap();
        let events: Vec<Result<WireEvent, TransportError>> =
            match transport.send(&request()).await.unwrap() {
                ChatResponse::Streaming(stream) => stream.collect().await,
                ChatResponse::Failed { .. } => panic!("expected a stream"),
            };
        assert!(matches!(events[0], Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // nothing listens on port 9 locally
        let transport = HttpTransport::new("http://127.0.0.1:9/api/chat".into(), None).unwrap();
        assert!(matches!(
            transport.send(&request()).await,
            Err(TransportError::Request(_))
        ));
    }
}
