use super::{base::Provider, configs::ProviderConfig, gemini::GeminiProvider};
use anyhow::Result;

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::Gemini(gemini_config) => Ok(Box::new(GeminiProvider::new(gemini_config)?)),
    }
}
