//! Token counting using tiktoken, with a character heuristic fallback

use super::models::Message;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

/// Framing overhead charged per message (role name, delimiters)
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

const CHARS_PER_TOKEN: usize = 4;

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Keep the longest prefix of `text` that fits in `max_tokens`
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// Tiktoken-based token estimator using cl100k_base
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    pub fn new() -> anyhow::Result<Self> {
        let bpe = cl100k_base()?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        // A cut can land inside a multi-byte sequence; back off until it decodes.
        let mut end = max_tokens;
        while end > 0 {
            if let Ok(prefix) = self.bpe.decode(tokens[..end].to_vec()) {
                return prefix;
            }
            end -= 1;
        }
        String::new()
    }
}

/// Character heuristic: one token per four characters, never below one
pub struct CharHeuristicEstimator;

impl TokenEstimator for CharHeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        (text.chars().count() / CHARS_PER_TOKEN).max(1)
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        text.chars().take(max_tokens * CHARS_PER_TOKEN).collect()
    }
}

/// Counts tokens for text and messages
#[derive(Clone)]
pub struct TokenCounter {
    estimator: Arc<dyn TokenEstimator>,
}

impl TokenCounter {
    /// Use the BPE tokenizer, falling back to the heuristic if it fails to load
    pub fn new() -> Self {
        match TiktokenEstimator::new() {
            Ok(estimator) => Self::with_estimator(Arc::new(estimator)),
            Err(e) => {
                warn!("Tokenizer unavailable ({}), using character heuristic", e);
                Self::heuristic()
            }
        }
    }

    pub fn heuristic() -> Self {
        Self::with_estimator(Arc::new(CharHeuristicEstimator))
    }

    pub fn with_estimator(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    pub fn count(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    /// Text parts of the message plus framing overhead
    pub fn count_message(&self, message: &Message) -> usize {
        let content: usize = message
            .content
            .text_parts()
            .iter()
            .map(|part| self.count(part))
            .sum();
        content + MESSAGE_OVERHEAD_TOKENS
    }

    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        self.estimator.truncate(text, max_tokens)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}
