//! Context window management with token budget enforcement
//!
//! Fits a system prompt, retrieved context, an unbounded history and a new
//! message into a fixed token window, summarizing history that falls out.

pub mod models;
pub mod summarizer;
pub mod token_budget;
pub mod token_estimator;
pub mod window_manager;

pub use models::{ContentPart, ConversationContext, ImageUrl, Message, MessageContent, Role};
pub use summarizer::{CompletionSummarizer, Summarizer, SummarizerConfig, SummarizerError};
pub use token_budget::{BudgetAllocation, BudgetError, BudgetLedger, TokenBudgetConfig};
pub use token_estimator::{
    CharHeuristicEstimator, TiktokenEstimator, TokenCounter, TokenEstimator, MESSAGE_OVERHEAD_TOKENS,
};
pub use window_manager::{ContextWindowConfig, ContextWindowManager, PreparedContext, SUMMARY_PREFIX};
