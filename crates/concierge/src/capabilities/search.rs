use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::Capability;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

pub const TOOL_NAME: &str = "web_search";
pub const SEARCH_HOST: &str = "https://api.tavily.com";
pub const SEARCH_MAX_RESULTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub api_key: String,
    pub max_results: u32,
}

impl SearchConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: SEARCH_HOST.to_string(),
            api_key: api_key.into(),
            max_results: SEARCH_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

/// Web search backed by a Tavily-compatible search API
pub struct WebSearch {
    tool: Tool,
    client: Client,
    config: SearchConfig,
}

impl WebSearch {
    pub fn new(config: SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            tool: Tool::new(
                TOOL_NAME,
                "Search the web for current information. Returns titles, URLs and snippets.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            client,
            config,
        }
    }
}

#[async_trait]
impl Capability for WebSearch {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| AgentError::InvalidParameters("query parameter required".into()))?;

        let url = format!("{}/search", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "api_key": self.config.api_key,
                "query": query,
                "max_results": self.config.max_results,
            }))
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("search request failed: {}", e)))?;

        // the search key is ours, so even a 401 is a plain failure for the model
        if !response.status().is_success() {
            return Err(AgentError::ExecutionError(format!(
                "search provider returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("invalid search response: {}", e)))?;

        let results: Vec<Value> = body
            .results
            .into_iter()
            .map(|hit| json!({ "title": hit.title, "url": hit.url, "snippet": hit.content }))
            .collect();

        Ok(json!({ "query": query, "results": results }))
    }
}
