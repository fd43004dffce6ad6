//! Configuration for the OpenAI-compatible completion client

use super::client::ModelTier;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Completion client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key (read from env LLM_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Model used for the economy tier
    #[serde(default = "default_economy_model")]
    pub economy_model: String,

    /// Model used for the premium tier
    #[serde(default = "default_premium_model")]
    pub premium_model: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum in-flight calls across all tiers
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Retries after the first failed attempt
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,

    /// Base backoff in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Consecutive failures before a tier's breaker opens
    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,

    /// Seconds an open breaker waits before probing
    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

fn default_api_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_economy_model() -> String { "gpt-4o-mini".to_string() }
fn default_premium_model() -> String { "gpt-4o".to_string() }
fn default_timeout_ms() -> u64 { 60_000 }
fn default_max_concurrent() -> usize { 16 }
fn default_retry_attempts() -> usize { 2 }
fn default_retry_backoff_ms() -> u64 { 250 }
fn default_breaker_failures() -> usize { 5 }
fn default_breaker_reset() -> u64 { 30 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            economy_model: default_economy_model(),
            premium_model: default_premium_model(),
            timeout_ms: default_timeout_ms(),
            max_concurrent_requests: default_max_concurrent(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl LlmConfig {
    /// Override fields from environment variables
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_API_URL") {
            self.api_url = val;
        }

        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.api_key = Some(SecretString::new(val));
        }

        if let Ok(val) = std::env::var("LLM_ECONOMY_MODEL") {
            self.economy_model = val;
        }

        if let Ok(val) = std::env::var("LLM_PREMIUM_MODEL") {
            self.premium_model = val;
        }

        if let Ok(val) = std::env::var("LLM_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("LLM_MAX_CONCURRENT") {
            if let Ok(max) = val.parse() {
                self.max_concurrent_requests = max;
            }
        }

        if let Ok(val) = std::env::var("LLM_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.retry_attempts = retries;
            }
        }

        self
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Economy => &self.economy_model,
            ModelTier::Premium => &self.premium_model,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.model_for(ModelTier::Economy), "gpt-4o-mini");
        assert_eq!(config.model_for(ModelTier::Premium), "gpt-4o");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("LLM_API_KEY", "sk-test");
        std::env::set_var("LLM_ECONOMY_MODEL", "small-model");
        std::env::set_var("LLM_TIMEOUT_MS", "1500");

        let config = LlmConfig::default().from_env();
        assert_eq!(config.api_key.as_ref().map(|k| k.expose_secret().as_str()), Some("sk-test"));
        assert_eq!(config.economy_model, "small-model");
        assert_eq!(config.timeout(), Duration::from_millis(1500));

        std::env::remove_var("LLM_API_KEY");
        std::env::remove_var("LLM_ECONOMY_MODEL");
        std::env::remove_var("LLM_TIMEOUT_MS");
    }
}
