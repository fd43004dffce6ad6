//! Gateway configuration
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - `config/gateway.toml` (optional)
//! - `GATEWAY__<SECTION>__<KEY>` environment variables
//! - `LLM_*` environment variables for the completion client

use crate::batch::BatchConfig;
use crate::context::{ContextWindowConfig, TokenBudgetConfig};
use crate::error::Result;
use crate::llm::LlmConfig;
use config::{Environment, File, FileFormat};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/gateway";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub token_budget: TokenBudgetConfig,

    #[serde(default)]
    pub context: ContextWindowConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load from the default path, `.env` and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_file(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` (extension optional, file may be absent) plus the environment
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.llm = config.llm.from_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without consulting the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.token_budget.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.token_budget.total, 16_000);
        assert_eq!(config.context.min_recent_pairs, 3);
        assert_eq!(config.batch.max_batch_size, 8);
        assert_eq!(config.llm.economy_model, "gpt-4o-mini");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [logging]
            json = true

            [token_budget]
            total = 32000
            history = 12000

            [context.summarizer]
            max_output_tokens = 300

            [llm]
            premium_model = "gpt-4.1"
            api_key = "sk-test"

            [batch]
            max_batch_size = 4
            "#,
        )
        .unwrap();

        assert!(config.logging.json);
        assert_eq!(config.token_budget.total, 32_000);
        assert_eq!(config.token_budget.history, 12_000);
        assert_eq!(config.token_budget.system, 2_000);
        assert_eq!(config.context.summarizer.max_output_tokens, 300);
        assert_eq!(config.llm.premium_model, "gpt-4.1");
        assert_eq!(config.llm.api_key.as_ref().unwrap().expose_secret(), "sk-test");
        assert_eq!(config.batch.max_batch_size, 4);
        assert_eq!(config.batch.temperature, 0.1);
    }

    #[test]
    fn test_over_allocated_budget_rejected() {
        let err = Config::from_toml_str("[token_budget]\ntotal = 1000").unwrap_err();
        assert!(err.to_string().contains("1000"));
    }
}
