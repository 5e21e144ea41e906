mod calculator;
mod calendar;
mod gmail;
pub mod google;
mod search;

pub use calculator::Calculator;
pub use calendar::CalendarEvents;
pub use gmail::GmailSearch;
pub use google::{build_google_capabilities, ExtensionError, GoogleEndpoints, GOOGLE_CAPABILITY_NAMES};
pub use search::{SearchConfig, WebSearch, SEARCH_HOST, SEARCH_MAX_RESULTS};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::AgentResult;
use crate::models::tool::Tool;

/// A single callable capability the agent may be offered.
///
/// Implementations own their transport and credentials; the agent only sees
/// the tool declaration and the JSON in/out of [`Capability::call`].
#[async_trait]
pub trait Capability: Send + Sync {
    /// The declaration shown to the model
    fn tool(&self) -> &Tool;

    /// Execute the capability with arguments produced by the model
    async fn call(&self, arguments: Value) -> AgentResult<Value>;
}

/// Ordered set of capabilities for a single request. Order only changes the
/// listing order the model sees.
pub type CapabilitySet = Vec<Arc<dyn Capability>>;

/// Tool declarations of a set, in order
pub fn tools(capabilities: &[Arc<dyn Capability>]) -> Vec<Tool> {
    capabilities.iter().map(|c| c.tool().clone()).collect()
}

/// Look up a capability by its tool name
pub fn find<'a>(capabilities: &'a [Arc<dyn Capability>], name: &str) -> Option<&'a Arc<dyn Capability>> {
    capabilities.iter().find(|c| c.tool().name == name)
}

/// Capabilities that need no delegated credential. The search tool is only
/// included when a search key is configured; its absence is reported in the
/// returned list of omitted tool names rather than treated as a degradation.
pub fn base_capabilities(search: Option<SearchConfig>) -> (CapabilitySet, Vec<String>) {
    let mut capabilities: CapabilitySet = Vec::new();
    let mut omitted = Vec::new();

    match search {
        Some(config) => capabilities.push(Arc::new(WebSearch::new(config))),
        None => {
            tracing::warn!("No search API key configured, the web search tool is disabled");
            omitted.push(search::TOOL_NAME.to_string());
        }
    }
    capabilities.push(Arc::new(Calculator::new()));

    (capabilities, omitted)
}
