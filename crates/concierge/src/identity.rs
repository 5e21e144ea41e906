//! Delegated credentials for extended capabilities.
//!
//! The identity provider owns user sessions; this module only asks it for a
//! third-party access token on behalf of the caller and classifies the answer.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[cfg(test)]
use mockall::automock;

/// An access token for a third-party API, as handed out by the identity provider
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            scopes: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Why no usable credential could be obtained
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    #[error("no delegated credential is linked to this session")]
    Absent,

    #[error("the delegated credential has expired or was revoked")]
    Expired,

    #[error("the delegated credential lacks required permissions: {0}")]
    InsufficientScope(String),

    #[error("identity provider request failed: {0}")]
    Unavailable(String),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange the caller's session for a delegated access token
    async fn access_token(&self, session: Option<String>) -> Result<AccessToken, CredentialError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token exchange against the identity provider's federated connection endpoint
pub struct HttpIdentityProvider {
    client: Client,
    token_url: Url,
    connection: String,
}

impl HttpIdentityProvider {
    pub fn new<C: Into<String>>(token_url: &str, connection: C) -> anyhow::Result<Self> {
        let token_url = Url::parse(token_url)?;
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            token_url,
            connection: connection.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn access_token(&self, session: Option<String>) -> Result<AccessToken, CredentialError> {
        let session = session
            .filter(|s| !s.trim().is_empty())
            .ok_or(CredentialError::Absent)?;

        let response = self
            .client
            .post(self.token_url.clone())
            .json(&json!({
                "grant_type": "urn:ietf:params:oauth:grant-type:token-exchange",
                "subject_token": session,
                "connection": self.connection,
            }))
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TokenErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error_description.or(body.error))
                .unwrap_or_else(|| status.to_string());
            return Err(match status {
                StatusCode::UNAUTHORIZED => CredentialError::Expired,
                StatusCode::FORBIDDEN => CredentialError::InsufficientScope(detail),
                StatusCode::NOT_FOUND => CredentialError::Absent,
                _ => CredentialError::Unavailable(detail),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Unavailable(format!("invalid token response: {}", e)))?;

        let mut token = AccessToken::new(body.access_token).with_scopes(
            body.scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        );
        if let Some(expires_at) = body.expires_at {
            token = token.with_expiry(expires_at);
        }
        if token.is_expired() {
            return Err(CredentialError::Expired);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(server: &MockServer) -> HttpIdentityProvider {
        HttpIdentityProvider::new(&format!("{}/oauth/token", server.uri()), "google-oauth2").unwrap()
    }

    #[test]
    fn test_rejects_malformed_token_url() {
        assert!(HttpIdentityProvider::new("not a url", "google-oauth2").is_err());
    }

    #[tokio::test]
    async fn test_exchange_returns_token_with_scopes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({"subject_token": "session-1", "connection": "google-oauth2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "scope": "scope-a scope-b"
            })))
            .mount(&server)
            .await;

        let token = provider_for(&server)
            .await
            .access_token(Some("session-1".into()))
            .await
            .unwrap();
        assert_eq!(token.value, "ya29.token");
        assert!(token.has_scope("scope-a"));
        assert!(token.has_scope("scope-b"));
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_missing_session_is_absent_without_calling_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        assert_eq!(provider.access_token(None).await, Err(CredentialError::Absent));
        assert_eq!(
            provider.access_token(Some(" ".into())).await,
            Err(CredentialError::Absent)
        );
    }

    #[tokio::test]
    async fn test_status_codes_map_to_typed_reasons() {
        let cases = [
            (401, CredentialError::Expired),
            (403, CredentialError::InsufficientScope("consent required".into())),
            (404, CredentialError::Absent),
            (502, CredentialError::Unavailable("consent required".into())),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(status)
                        .set_body_json(json!({"error": "x", "error_description": "consent required"})),
                )
                .mount(&server)
                .await;

            let result = provider_for(&server)
                .await
                .access_token(Some("session".into()))
                .await;
            assert_eq!(result, Err(expected), "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "expires_at": (Utc::now() - ChronoDuration::minutes(5)).to_rfc3339()
            })))
            .mount(&server)
            .await;

        let result = provider_for(&server)
            .await
            .access_token(Some("session".into()))
            .await;
        assert_eq!(result, Err(CredentialError::Expired));
    }
}
