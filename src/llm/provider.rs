use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LLMConfig;
use crate::llm::openai::OpenAIAdapter;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for LLM provider (renamed to avoid conflict with LLMProvider enum in types.rs)
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider: LLMProvider,
}

impl LLM {
    pub fn new(config: LLMProviderConfig) -> AppResult<Self> {
        let provider = LLMProvider::parse(&config.name)
            .ok_or_else(|| AppError::Config(format!("Unsupported provider: {}", config.name)))?;

        let base_url = config
            .base_url
            .unwrap_or_else(|| provider.default_base_url().to_string());
        let adapter: Box<dyn LLMAdapter> =
            Box::new(OpenAIAdapter::with_base_url(&config.api_key, &base_url));

        Ok(Self { adapter, provider })
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }
}

#[async_trait]
impl LLMAdapter for LLM {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}

/// Produces the language-model client for one session
pub trait LLMConnector: Send + Sync {
    fn connect(&self, config: &LLMConfig) -> AppResult<Arc<dyn LLMAdapter>>;
}

/// Builds real provider clients from the environment-backed configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderConnector;

impl LLMConnector for ProviderConnector {
    fn connect(&self, config: &LLMConfig) -> AppResult<Arc<dyn LLMAdapter>> {
        let api_key = config.active_api_key().ok_or_else(|| {
            AppError::Config(format!(
                "No API key configured for provider '{}'",
                config.provider
            ))
        })?;

        let llm: Arc<dyn LLMAdapter> = Arc::new(LLM::new(LLMProviderConfig {
            name: config.provider.clone(),
            api_key,
            base_url: config.base_url.clone(),
        })?);

        Ok(llm)
    }
}
