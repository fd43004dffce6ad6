//! AI gateway core
//!
//! Three pieces that sit between application requests and an LLM:
//! - [`context`] fits an unbounded conversation into a fixed token window
//! - [`batch`] folds small same-type jobs into one call, falling back per item
//! - [`validation`] turns free-text model output into repaired, scored data
//!
//! [`Gateway`] wires them to a [`llm::CompletionClient`].

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod json_extract;
pub mod llm;
pub mod metrics;
pub mod routing;
pub mod telemetry;
pub mod validation;

pub use batch::{BatchConfig, BatchError, BatchJob, TaskBatcher, TaskContext};
pub use config::Config;
pub use context::{ContextWindowManager, ConversationContext, Message, Role, TokenBudgetConfig, TokenCounter};
pub use error::{GatewayError, Result};
pub use gateway::{ExchangeOutcome, Gateway};
pub use llm::{CompletionClient, CompletionRequest, CompletionResponse, LlmError, ModelTier};
pub use validation::{ConfidenceLevel, OutputValidator, ValidationResult};
