//! LLM boundary: completion client, templates and the bundled HTTP adapter

pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod openai;
pub mod template;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use client::{CompletionClient, CompletionRequest, CompletionResponse, LlmError, ModelTier};
pub use config::LlmConfig;
pub use openai::OpenAiCompatClient;
pub use template::{PromptTemplate, RenderedPrompt, TemplateError, TemplateRegistry, TemplateRenderer};
