use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{CalendarEvents, CapabilitySet, GmailSearch};
use crate::errors::{AgentError, AgentResult};
use crate::identity::AccessToken;

/// User-facing names of the capabilities that need a delegated Google token
pub const GOOGLE_CAPABILITY_NAMES: [&str; 2] = ["Gmail", "Google Calendar"];

pub const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

const GMAIL_HOST: &str = "https://gmail.googleapis.com";
const CALENDAR_HOST: &str = "https://www.googleapis.com";

/// Failure while turning an acquired token into usable Google capabilities
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtensionError {
    #[error("access token is missing required scopes: {}", .0.join(", "))]
    MissingScopes(Vec<String>),

    #[error("access token is not usable: {0}")]
    InvalidToken(String),

    #[error("failed to build Google client: {0}")]
    Client(String),
}

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub gmail_host: String,
    pub calendar_host: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            gmail_host: GMAIL_HOST.to_string(),
            calendar_host: CALENDAR_HOST.to_string(),
        }
    }
}

/// Authenticated client shared by the Google capabilities of one request
#[derive(Clone)]
pub(crate) struct GoogleClient {
    client: Client,
}

impl GoogleClient {
    fn new(token: &AccessToken) -> Result<Self, ExtensionError> {
        let value = token.value.trim();
        if value.is_empty() {
            return Err(ExtensionError::InvalidToken("token is empty".to_string()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", value))
            .map_err(|e| ExtensionError::InvalidToken(e.to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExtensionError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// GET a Google API resource. `service` names the API in error messages.
    pub(crate) async fn get_json(
        &self,
        service: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> AgentResult<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("{} request failed: {}", service, e)))?;

        check_status(service, response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("invalid {} response: {}", service, e)))
    }
}

async fn check_status(service: &str, response: Response) -> AgentResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::from_status(service, status.as_u16(), &body))
}

/// Build the Gmail and Calendar capabilities for an acquired token.
///
/// When the identity provider reports granted scopes, both read scopes must be
/// present; tokens without scope information are accepted as-is.
pub fn build_google_capabilities(
    token: &AccessToken,
    endpoints: &GoogleEndpoints,
) -> Result<CapabilitySet, ExtensionError> {
    if !token.scopes.is_empty() {
        let missing: Vec<String> = [GMAIL_SCOPE, CALENDAR_SCOPE]
            .iter()
            .filter(|scope| !token.has_scope(scope))
            .map(|scope| scope.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ExtensionError::MissingScopes(missing));
        }
    }

    let client = GoogleClient::new(token)?;
    Ok(vec![
        Arc::new(GmailSearch::new(client.clone(), &endpoints.gmail_host)),
        Arc::new(CalendarEvents::new(client, &endpoints.calendar_host)),
    ])
}
