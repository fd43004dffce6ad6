//! Token budget allotments and the per-request ledger
//!
//! Default policy for a 16k window:
//! - System prompt: 2,000 tokens
//! - Retrieved (RAG) context: 4,000 tokens
//! - Conversation history: 6,000 tokens
//! - Current message + completion headroom: 4,000 tokens
//!
//! Allotments are soft. Whatever system and RAG leave unused flows to history,
//! but history never exceeds its own allotment and the `current` reserve is
//! never spent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetConfig {
    #[serde(default = "default_total")]
    pub total: usize,
    #[serde(default = "default_system")]
    pub system: usize,
    #[serde(default = "default_rag")]
    pub rag: usize,
    #[serde(default = "default_history")]
    pub history: usize,
    #[serde(default = "default_current")]
    pub current: usize,
}

fn default_total() -> usize { 16_000 }
fn default_system() -> usize { 2_000 }
fn default_rag() -> usize { 4_000 }
fn default_history() -> usize { 6_000 }
fn default_current() -> usize { 4_000 }

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            total: default_total(),
            system: default_system(),
            rag: default_rag(),
            history: default_history(),
            current: default_current(),
        }
    }
}

impl TokenBudgetConfig {
    /// Validate that the allotments fit inside the total
    pub fn validate(&self) -> Result<(), BudgetError> {
        let allocated = self.system + self.rag + self.history + self.current;
        if allocated > self.total {
            return Err(BudgetError::ConfigurationInvalid {
                allocated,
                max: self.total,
            });
        }
        Ok(())
    }
}

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Configuration invalid: {allocated} tokens allocated, {max} tokens max")]
    ConfigurationInvalid { allocated: usize, max: usize },
}

/// Snapshot of what a ledger has charged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub system_tokens: usize,
    pub tool_tokens: usize,
    pub rag_tokens: usize,
    pub history_tokens: usize,
    pub current_reserved: usize,
    pub total_allocated: usize,
    pub remaining: usize,
}

impl BudgetAllocation {
    pub fn is_within_budget(&self, max_total: usize) -> bool {
        self.total_allocated <= max_total
    }
}

/// Mutable ledger threaded through the context preparation stages
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    config: TokenBudgetConfig,
    system_tokens: usize,
    tool_tokens: usize,
    rag_tokens: usize,
    history_tokens: usize,
}

impl BudgetLedger {
    pub fn new(config: TokenBudgetConfig) -> Self {
        Self {
            config,
            system_tokens: 0,
            tool_tokens: 0,
            rag_tokens: 0,
            history_tokens: 0,
        }
    }

    pub fn config(&self) -> &TokenBudgetConfig {
        &self.config
    }

    pub fn system_allotment(&self) -> usize {
        self.config.system
    }

    pub fn rag_allotment(&self) -> usize {
        self.config.rag
    }

    pub fn charge_system(&mut self, tokens: usize) {
        self.system_tokens += tokens;
    }

    pub fn charge_tools(&mut self, tokens: usize) {
        self.tool_tokens += tokens;
    }

    pub fn charge_rag(&mut self, tokens: usize) {
        self.rag_tokens += tokens;
    }

    pub fn charge_history(&mut self, tokens: usize) {
        self.history_tokens += tokens;
    }

    fn spent(&self) -> usize {
        self.system_tokens + self.tool_tokens + self.rag_tokens + self.history_tokens
    }

    /// Tokens still available to history and RAG, after the `current` reserve
    pub fn remaining(&self) -> usize {
        self.config
            .total
            .saturating_sub(self.config.current)
            .saturating_sub(self.spent())
    }

    /// History gets whatever is left, capped at its own allotment
    pub fn history_budget(&self) -> usize {
        self.remaining().min(self.config.history)
    }

    pub fn allocation(&self) -> BudgetAllocation {
        let total_allocated = self.spent() + self.config.current;
        BudgetAllocation {
            system_tokens: self.system_tokens,
            tool_tokens: self.tool_tokens,
            rag_tokens: self.rag_tokens,
            history_tokens: self.history_tokens,
            current_reserved: self.config.current,
            total_allocated,
            remaining: self.config.total.saturating_sub(total_allocated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TokenBudgetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total, 16_000);
    }

    #[test]
    fn test_oversubscribed_config_rejected() {
        let config = TokenBudgetConfig {
            total: 8_000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BudgetError::ConfigurationInvalid { allocated: 16_000, max: 8_000 })
        ));
    }

    #[test]
    fn test_unused_system_and_rag_flow_to_history_up_to_allotment() {
        let mut ledger = BudgetLedger::new(TokenBudgetConfig::default());
        ledger.charge_system(100);
        // 16000 - 4000 - 100 = 11900 left, but history caps at 6000
        assert_eq!(ledger.remaining(), 11_900);
        assert_eq!(ledger.history_budget(), 6_000);
    }

    #[test]
    fn test_history_budget_shrinks_when_remaining_is_small() {
        let config = TokenBudgetConfig {
            total: 10_000,
            system: 2_000,
            rag: 2_000,
            history: 4_000,
            current: 2_000,
        };
        let mut ledger = BudgetLedger::new(config);
        ledger.charge_system(2_000);
        ledger.charge_tools(1_500);
        ledger.charge_rag(2_000);
        assert_eq!(ledger.remaining(), 2_500);
        assert_eq!(ledger.history_budget(), 2_500);
    }

    #[test]
    fn test_allocation_snapshot() {
        let mut ledger = BudgetLedger::new(TokenBudgetConfig::default());
        ledger.charge_system(500);
        ledger.charge_rag(1_000);
        ledger.charge_history(2_000);
        let alloc = ledger.allocation();
        assert_eq!(alloc.total_allocated, 7_500);
        assert_eq!(alloc.remaining, 8_500);
        assert!(alloc.is_within_budget(16_000));
    }
}
