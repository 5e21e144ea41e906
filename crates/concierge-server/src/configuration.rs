use crate::error::{to_env_var, ConfigError};
use concierge::capabilities::{SearchConfig, SEARCH_HOST, SEARCH_MAX_RESULTS};
use concierge::providers::configs::{GeminiProviderConfig, ProviderConfig, GEMINI_HOST, GEMINI_MODEL};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Checked per request rather than at startup, so a missing key surfaces
    /// to clients as a configuration error response
    #[serde(default)]
    pub api_key: Option<String>,
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ModelSettings {
    /// The provider config, or None when no usable API key is set
    pub fn provider_config(&self) -> Option<ProviderConfig> {
        let api_key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some(ProviderConfig::Gemini(GeminiProviderConfig {
            host: self.host.clone(),
            api_key: api_key.to_string(),
            model: self.name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    pub host: String,
    pub max_results: u32,
}

impl SearchSettings {
    pub fn config(&self) -> Option<SearchConfig> {
        let api_key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some(SearchConfig {
            host: self.host.clone(),
            api_key: api_key.to_string(),
            max_results: self.max_results,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    /// Token exchange endpoint; without it the Google variant always degrades
    #[serde(default)]
    pub token_url: Option<String>,
    pub connection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevSettings {
    pub log_tool_steps: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub search: SearchSettings,
    pub identity: IdentitySettings,
    pub dev: DevSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("model.name", GEMINI_MODEL)?
            .set_default("model.host", GEMINI_HOST)?
            .set_default("search.host", SEARCH_HOST)?
            .set_default("search.max_results", SEARCH_MAX_RESULTS as i64)?
            .set_default("identity.connection", "google-oauth2")?
            .set_default("dev.log_tool_steps", false)?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("CONCIERGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // "missing field `name`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("CONCIERGE_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.model.name, "gemini-1.5-flash");
        assert_eq!(settings.model.host, GEMINI_HOST);
        assert!(settings.model.api_key.is_none());
        assert!(settings.model.provider_config().is_none());
        assert!(settings.search.config().is_none());
        assert_eq!(settings.search.max_results, 5);
        assert!(settings.identity.token_url.is_none());
        assert_eq!(settings.identity.connection, "google-oauth2");
        assert!(!settings.dev.log_tool_steps);
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("CONCIERGE_SERVER__PORT", "8080");
        env::set_var("CONCIERGE_MODEL__API_KEY", "gemini-key");
        env::set_var("CONCIERGE_MODEL__NAME", "gemini-1.5-pro");
        env::set_var("CONCIERGE_MODEL__TEMPERATURE", "0.7");
        env::set_var("CONCIERGE_MODEL__MAX_TOKENS", "2000");
        env::set_var("CONCIERGE_SEARCH__API_KEY", "tvly-key");
        env::set_var("CONCIERGE_IDENTITY__TOKEN_URL", "https://id.example.com/oauth/token");
        env::set_var("CONCIERGE_DEV__LOG_TOOL_STEPS", "true");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        match settings.model.provider_config() {
            Some(ProviderConfig::Gemini(config)) => {
                assert_eq!(config.api_key, "gemini-key");
                assert_eq!(config.model, "gemini-1.5-pro");
                assert_eq!(config.temperature, Some(0.7));
                assert_eq!(config.max_tokens, Some(2000));
            }
            None => panic!("Expected a Gemini provider config"),
        }
        assert_eq!(settings.search.config().unwrap().api_key, "tvly-key");
        assert_eq!(
            settings.identity.token_url.as_deref(),
            Some("https://id.example.com/oauth/token")
        );
        assert!(settings.dev.log_tool_steps);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_blank_keys_count_as_missing() {
        clean_env();
        env::set_var("CONCIERGE_MODEL__API_KEY", "  ");
        env::set_var("CONCIERGE_SEARCH__API_KEY", "");

        let settings = Settings::new().unwrap();
        assert!(settings.model.provider_config().is_none());
        assert!(settings.search.config().is_none());

        clean_env();
    }

    #[test]
    #[serial]
    fn test_malformed_value_is_rejected() {
        clean_env();
        env::set_var("CONCIERGE_SERVER__PORT", "not-a-port");

        assert!(matches!(Settings::new(), Err(ConfigError::Other(_))));

        clean_env();
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
