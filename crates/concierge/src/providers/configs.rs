pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";

// Unified enum to wrap different provider configurations
#[derive(Clone)]
pub enum ProviderConfig {
    Gemini(GeminiProviderConfig),
}

#[derive(Clone)]
pub struct GeminiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl GeminiProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: GEMINI_HOST.to_string(),
            api_key: api_key.into(),
            model: GEMINI_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}
