//! Completion client boundary

use crate::context::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model tier used for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheaper, faster model for batchable or low-stakes tasks
    Economy,
    /// Higher-quality model for non-batchable or quality-sensitive tasks
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Economy => "economy",
            ModelTier::Premium => "premium",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub tier: ModelTier,
    pub messages: Vec<Message>,
    pub max_output_tokens: usize,
    pub temperature: f32,
    /// Telemetry tag
    pub task_type: String,
}

impl CompletionRequest {
    pub fn new(tier: ModelTier, messages: Vec<Message>, task_type: impl Into<String>) -> Self {
        Self {
            tier,
            messages,
            max_output_tokens: 1024,
            temperature: 0.2,
            task_type: task_type.into(),
        }
    }

    pub fn max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Generated text, optionally with structured data the client already parsed
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: String,
    pub validated_data: Option<serde_json::Value>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            validated_data: None,
        }
    }
}

/// Completion client errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Circuit breaker is open for {0} tier")]
    CircuitOpen(ModelTier),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// 4xx other than 408/429; resending the same request cannot succeed
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether resending the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_) | Self::UpstreamError(_) | Self::Timeout(_)
        )
    }
}

/// Anything that can turn messages into generated text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_retryable() {
        assert!(LlmError::Timeout("slow".to_string()).is_retryable());
        assert!(LlmError::UpstreamError("Status 503".to_string()).is_retryable());
        assert!(LlmError::RequestFailed("connection reset".to_string()).is_retryable());

        assert!(!LlmError::Rejected("Status 401".to_string()).is_retryable());
        assert!(!LlmError::InvalidResponse("No choices in response".to_string()).is_retryable());
        assert!(!LlmError::CircuitOpen(ModelTier::Premium).is_retryable());
    }
}
