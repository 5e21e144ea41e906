use std::sync::Arc;

use concierge::capabilities::GoogleEndpoints;
use concierge::identity::{HttpIdentityProvider, IdentityProvider};
use concierge::providers::{base::Provider, configs::ProviderConfig, factory};

use crate::configuration::Settings;

/// Builds the model provider for one request
pub type ProviderFactory =
    Arc<dyn Fn(ProviderConfig) -> anyhow::Result<Box<dyn Provider>> + Send + Sync>;

/// Shared application state. Everything here is read-only; per-request state
/// lives in the handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Present only when a token exchange endpoint is configured
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub provider_factory: ProviderFactory,
    pub google: GoogleEndpoints,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let identity: Option<Arc<dyn IdentityProvider>> = match &settings.identity.token_url {
            Some(token_url) => Some(Arc::new(HttpIdentityProvider::new(
                token_url,
                settings.identity.connection.clone(),
            )?)),
            None => {
                tracing::info!("No identity token URL configured, Google tools will be unavailable");
                None
            }
        };

        Ok(Self {
            settings: Arc::new(settings),
            identity,
            provider_factory: Arc::new(factory::get_provider),
            google: GoogleEndpoints::default(),
        })
    }
}
