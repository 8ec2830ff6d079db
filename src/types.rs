// Type definitions and enums

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LLMProvider {
    OpenAI,
    OpenRouter,
    Groq,
}

impl LLMProvider {
    /// Parse a provider name as it appears in `LLM_PROVIDER`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(LLMProvider::OpenAI),
            "openrouter" => Some(LLMProvider::OpenRouter),
            "groq" => Some(LLMProvider::Groq),
            _ => None,
        }
    }

    /// Default OpenAI-compatible API base for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LLMProvider::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Groq => write!(f, "groq"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Agent error: {0}")]
    Agent(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(LLMProvider::parse("openai"), Some(LLMProvider::OpenAI));
        assert_eq!(LLMProvider::parse(" OpenRouter "), Some(LLMProvider::OpenRouter));
        assert_eq!(LLMProvider::parse("groq"), Some(LLMProvider::Groq));
        assert_eq!(LLMProvider::parse("anthropic"), None);
    }

    #[test]
    fn test_provider_display_matches_parse() {
        for provider in [LLMProvider::OpenAI, LLMProvider::OpenRouter, LLMProvider::Groq] {
            assert_eq!(LLMProvider::parse(&provider.to_string()), Some(provider));
        }
    }
}
