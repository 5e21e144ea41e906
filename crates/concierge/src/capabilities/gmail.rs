use async_trait::async_trait;
use serde_json::{json, Value};

use super::google::GoogleClient;
use super::Capability;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

const SERVICE: &str = "Gmail";
const DEFAULT_MAX_RESULTS: u64 = 5;
const MAX_RESULTS_LIMIT: u64 = 20;

/// Searches the user's mailbox with Gmail query syntax
pub struct GmailSearch {
    tool: Tool,
    client: GoogleClient,
    base_url: String,
}

impl GmailSearch {
    pub(crate) fn new(client: GoogleClient, host: &str) -> Self {
        Self {
            tool: Tool::new(
                "gmail_search",
                "Search the user's Gmail messages. Returns sender, subject, date and a snippet for each match.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Gmail search query, e.g. 'from:alice newer_than:7d'"
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum number of messages to return (default 5)"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            client,
            base_url: format!("{}/gmail/v1/users/me/messages", host.trim_end_matches('/')),
        }
    }
}

fn header<'a>(message: &'a Value, name: &str) -> Option<&'a str> {
    message
        .pointer("/payload/headers")?
        .as_array()?
        .iter()
        .find(|h| h.get("name").and_then(Value::as_str) == Some(name))?
        .get("value")?
        .as_str()
}

#[async_trait]
impl Capability for GmailSearch {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::InvalidParameters("query parameter required".into()))?;
        let max_results = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);

        let listing = self
            .client
            .get_json(
                SERVICE,
                &self.base_url,
                &[("q", query.to_string()), ("maxResults", max_results.to_string())],
            )
            .await?;

        let ids: Vec<&str> = listing
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let message = self
                .client
                .get_json(
                    SERVICE,
                    &format!("{}/{}", self.base_url, id),
                    &[
                        ("format", "metadata".to_string()),
                        ("metadataHeaders", "From".to_string()),
                        ("metadataHeaders", "Subject".to_string()),
                        ("metadataHeaders", "Date".to_string()),
                    ],
                )
                .await?;
            messages.push(json!({
                "id": id,
                "from": header(&message, "From"),
                "subject": header(&message, "Subject"),
                "date": header(&message, "Date"),
                "snippet": message.get("snippet").and_then(Value::as_str).unwrap_or_default(),
            }));
        }

        Ok(json!({ "query": query, "messages": messages }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{build_google_capabilities, find};
    use crate::capabilities::google::GoogleEndpoints;
    use crate::identity::AccessToken;
    use wiremock::matchers::{header as header_matcher, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_fetches_metadata_for_each_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param("q", "from:alice"))
            .and(header_matcher("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": "m1", "threadId": "t1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m1",
                "snippet": "See you at lunch",
                "payload": {"headers": [
                    {"name": "From", "value": "Alice <alice@example.com>"},
                    {"name": "Subject", "value": "Lunch"}
                ]}
            })))
            .mount(&server)
            .await;

        let endpoints = GoogleEndpoints {
            gmail_host: server.uri(),
            calendar_host: server.uri(),
        };
        let capabilities =
            build_google_capabilities(&AccessToken::new("ya29.token"), &endpoints).unwrap();
        let gmail = find(&capabilities, "gmail_search").unwrap();

        let output = gmail.call(json!({"query": "from:alice"})).await.unwrap();
        let first = &output["messages"][0];
        assert_eq!(first["subject"], json!("Lunch"));
        assert_eq!(first["from"], json!("Alice <alice@example.com>"));
        assert_eq!(first["date"], Value::Null);
        assert_eq!(first["snippet"], json!("See you at lunch"));
    }

    #[tokio::test]
    async fn test_search_propagates_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficientPermissions"))
            .mount(&server)
            .await;

        let endpoints = GoogleEndpoints {
            gmail_host: server.uri(),
            calendar_host: server.uri(),
        };
        let capabilities =
            build_google_capabilities(&AccessToken::new("ya29.token"), &endpoints).unwrap();
        let err = find(&capabilities, "gmail_search")
            .unwrap()
            .call(json!({"query": "x"}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::CredentialRejected {
                service: "Gmail".into(),
                status: 403
            }
        );
    }
}
