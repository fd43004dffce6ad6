//! Crate-level error type

use thiserror::Error;

use crate::context::BudgetError;
use crate::llm::{LlmError, TemplateError};

/// Result alias used across the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can escape a gateway boundary
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}
