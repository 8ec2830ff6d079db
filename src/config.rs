use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::LLMProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub staging: StagingConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub max_upload_bytes: usize,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    pub dir: Option<PathBuf>,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub read_only: bool,
    pub max_rows: usize,
    pub sample_rows: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub openai_api_key: String,
    pub openrouter_api_key: String,
    pub groq_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub verbose: bool,
    pub max_iterations: usize,
    pub top_k: usize,
}

impl LLMConfig {
    /// API key for the configured provider, if one is set
    pub fn active_api_key(&self) -> Option<String> {
        let key = match LLMProvider::parse(&self.provider)? {
            LLMProvider::OpenAI => &self.openai_api_key,
            LLMProvider::OpenRouter => &self.openrouter_api_key,
            LLMProvider::Groq => &self.groq_api_key,
        };
        if key.trim().is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            server: ServerConfig {
                port: parse_var(&lookup, "PORT", 3000)?,
                host: var("HOST", "0.0.0.0"),
                max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES", 200 * 1024 * 1024)?,
                log_dir: lookup("LOG_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            },
            staging: StagingConfig {
                dir: lookup("STAGING_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
                allowed_extensions: var("UPLOAD_EXTENSIONS", "db,sqlite,sqlite3")
                    .split(',')
                    .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                read_only: parse_var(&lookup, "SQL_READ_ONLY", true)?,
                max_rows: parse_var(&lookup, "SQL_MAX_ROWS", 200)?,
                sample_rows: parse_var(&lookup, "SQL_SAMPLE_ROWS", 3)?,
            },
            llm: LLMConfig {
                provider: var("LLM_PROVIDER", "openai"),
                model: var("LLM_MODEL", "gpt-4o-mini"),
                base_url: lookup("LLM_BASE_URL").filter(|s| !s.is_empty()),
                max_tokens: parse_var(&lookup, "LLM_MAX_TOKENS", 1024)?,
                openai_api_key: lookup("OPENAI_API_KEY").unwrap_or_default(),
                openrouter_api_key: lookup("OPENROUTER_API_KEY").unwrap_or_default(),
                groq_api_key: lookup("GROQ_API_KEY").unwrap_or_default(),
            },
            agent: AgentConfig {
                verbose: parse_var(&lookup, "AGENT_VERBOSE", true)?,
                max_iterations: parse_var(&lookup, "AGENT_MAX_ITERATIONS", 15)?,
                top_k: parse_var(&lookup, "AGENT_TOP_K", 10)?,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.staging.allowed_extensions, vec!["db", "sqlite", "sqlite3"]);
        assert!(config.staging.dir.is_none());
        assert!(config.database.read_only);
        assert_eq!(config.llm.provider, "openai");
        assert!(config.agent.verbose);
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.agent.top_k, 10);
        assert!(config.llm.active_api_key().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("PORT", "8080"),
            ("UPLOAD_EXTENSIONS", ".DB, sqlite"),
            ("AGENT_VERBOSE", "false"),
            ("LLM_PROVIDER", "groq"),
            ("GROQ_API_KEY", "gsk-test"),
            ("STAGING_DIR", "/tmp/staging"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.staging.allowed_extensions, vec!["db", "sqlite"]);
        assert_eq!(config.staging.dir, Some(PathBuf::from("/tmp/staging")));
        assert!(!config.agent.verbose);
        assert_eq!(config.llm.active_api_key(), Some("gsk-test".to_string()));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = config_with(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_key_for_other_provider_is_ignored() {
        let config = config_with(&[("OPENAI_API_KEY", "sk-test"), ("LLM_PROVIDER", "openrouter")]).unwrap();
        assert!(config.llm.active_api_key().is_none());
    }
}
