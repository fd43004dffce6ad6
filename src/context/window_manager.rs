//! Context window manager with token budget enforcement
//!
//! Assembles a request in fixed stages, each charging an explicit ledger:
//! - System prompt, truncated to its allotment
//! - Tool definitions (counted, never emitted)
//! - Retrieved context, truncated to its allotment
//! - History, fitted newest-first with optional summary of what is left out
//! - The new user message, always included

use super::models::{ConversationContext, Message};
use super::summarizer::{CompletionSummarizer, Summarizer, SummarizerConfig};
use super::token_budget::{BudgetAllocation, BudgetLedger, TokenBudgetConfig};
use super::token_estimator::TokenCounter;
use crate::error::Result;
use crate::llm::CompletionClient;
use crate::metrics::METRICS;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SUMMARY_PREFIX: &str = "Earlier conversation summary: ";

/// Tuning for history fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWindowConfig {
    /// Most recent user/assistant pairs protected from the older-history pass
    #[serde(default = "default_min_recent_pairs")]
    pub min_recent_pairs: usize,
    /// Headroom required before a summary is attempted
    #[serde(default = "default_summary_min_headroom")]
    pub summary_min_headroom: usize,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

fn default_min_recent_pairs() -> usize { 3 }
fn default_summary_min_headroom() -> usize { 200 }

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            min_recent_pairs: default_min_recent_pairs(),
            summary_min_headroom: default_summary_min_headroom(),
            summarizer: SummarizerConfig::default(),
        }
    }
}

/// Messages ready for the completion client, plus accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedContext {
    pub messages: Vec<Message>,
    pub allocation: BudgetAllocation,
    pub summarized: bool,
    /// History messages neither included nor covered by a summary
    pub dropped_messages: usize,
}

impl PreparedContext {
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

struct FittedHistory {
    messages: Vec<Message>,
    tokens: usize,
    summarized: bool,
    dropped: usize,
}

/// Fits conversations into a fixed token window
pub struct ContextWindowManager {
    budget: TokenBudgetConfig,
    config: ContextWindowConfig,
    counter: TokenCounter,
    summarizer: Arc<dyn Summarizer>,
}

impl ContextWindowManager {
    /// Summaries go through `client` on the economy tier
    pub fn new(
        budget: TokenBudgetConfig,
        config: ContextWindowConfig,
        counter: TokenCounter,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self> {
        let summarizer = Arc::new(CompletionSummarizer::new(client, config.summarizer.clone()));
        Self::with_summarizer(budget, config, counter, summarizer)
    }

    pub fn with_summarizer(
        budget: TokenBudgetConfig,
        config: ContextWindowConfig,
        counter: TokenCounter,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self> {
        budget.validate()?;
        Ok(Self {
            budget,
            config,
            counter,
            summarizer,
        })
    }

    pub fn budget(&self) -> &TokenBudgetConfig {
        &self.budget
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Assemble the message list for one exchange
    pub async fn prepare_context(
        &self,
        system_prompt: &str,
        tool_defs: Option<&serde_json::Value>,
        rag_context: Option<&str>,
        history: &[Message],
        new_message: &str,
    ) -> Vec<Message> {
        self.assemble(system_prompt, tool_defs, rag_context, history, new_message)
            .await
            .into_messages()
    }

    /// Same as [`prepare_context`](Self::prepare_context), keeping the ledger snapshot
    pub async fn prepare(&self, context: &ConversationContext) -> PreparedContext {
        self.assemble(
            &context.system_prompt,
            context.tool_definitions.as_ref(),
            context.rag_context.as_deref(),
            &context.history,
            &context.new_message,
        )
        .await
    }

    async fn assemble(
        &self,
        system_prompt: &str,
        tool_defs: Option<&serde_json::Value>,
        rag_context: Option<&str>,
        history: &[Message],
        new_message: &str,
    ) -> PreparedContext {
        let mut ledger = BudgetLedger::new(self.budget.clone());
        let mut messages = Vec::with_capacity(history.len() + 3);

        if !system_prompt.trim().is_empty() {
            let system_text = self.fit_to_allotment(system_prompt, ledger.system_allotment(), "system prompt");
            let system_message = Message::system(system_text);
            ledger.charge_system(self.counter.count_message(&system_message));
            messages.push(system_message);
        }

        if let Some(tools) = tool_defs.filter(|t| !t.is_null()) {
            let serialized = serde_json::to_string(tools).unwrap_or_default();
            ledger.charge_tools(self.counter.count(&serialized));
        }

        if let Some(rag) = rag_context.filter(|r| !r.trim().is_empty()) {
            let rag_text = self.fit_to_allotment(rag, ledger.rag_allotment(), "retrieved context");
            let rag_message = Message::system(rag_text);
            ledger.charge_rag(self.counter.count_message(&rag_message));
            messages.push(rag_message);
        }

        let history_budget = ledger.history_budget();
        let fitted = self.fit_history(history, history_budget).await;
        ledger.charge_history(fitted.tokens);
        messages.extend(fitted.messages);

        messages.push(Message::user(new_message));

        let allocation = ledger.allocation();
        debug!(
            "Token allocation: system={}, tools={}, rag={}, history={}/{}, reserved={}, remaining={}",
            allocation.system_tokens,
            allocation.tool_tokens,
            allocation.rag_tokens,
            allocation.history_tokens,
            history_budget,
            allocation.current_reserved,
            allocation.remaining
        );
        METRICS.record_token_budget(allocation.total_allocated, allocation.remaining, fitted.dropped);

        PreparedContext {
            messages,
            allocation,
            summarized: fitted.summarized,
            dropped_messages: fitted.dropped,
        }
    }

    fn fit_to_allotment(&self, text: &str, allotment: usize, label: &str) -> String {
        let tokens = self.counter.count(text);
        if tokens <= allotment {
            return text.to_string();
        }
        warn!("Truncating {} from {} to {} tokens", label, tokens, allotment);
        self.counter.truncate(text, allotment)
    }

    async fn fit_history(&self, history: &[Message], budget: usize) -> FittedHistory {
        if history.is_empty() {
            return FittedHistory {
                messages: Vec::new(),
                tokens: 0,
                summarized: false,
                dropped: 0,
            };
        }

        let costs: Vec<usize> = history.iter().map(|m| self.counter.count_message(m)).collect();
        let recent_len = (2 * self.config.min_recent_pairs).min(history.len());
        let split = history.len() - recent_len;
        let recent_tokens: usize = costs[split..].iter().sum();

        // Recency beats completeness: keep the newest messages that fit.
        if recent_tokens > budget {
            let mut used = 0;
            let mut keep_from = history.len();
            for idx in (0..history.len()).rev() {
                if used + costs[idx] > budget {
                    break;
                }
                used += costs[idx];
                keep_from = idx;
            }
            warn!(
                "Recent history ({} tokens) exceeds budget {}; keeping last {} messages",
                recent_tokens,
                budget,
                history.len() - keep_from
            );
            return FittedHistory {
                messages: history[keep_from..].to_vec(),
                tokens: used,
                summarized: false,
                dropped: keep_from,
            };
        }

        let remaining = budget - recent_tokens;
        if split == 0 {
            return FittedHistory {
                messages: history.to_vec(),
                tokens: recent_tokens,
                summarized: false,
                dropped: 0,
            };
        }

        let mut older_tokens = 0;
        let mut older_from = split;
        for idx in (0..split).rev() {
            if older_tokens + costs[idx] > remaining {
                break;
            }
            older_tokens += costs[idx];
            older_from = idx;
        }

        let unincluded = &history[..older_from];
        let headroom = remaining - older_tokens;
        let mut messages = Vec::with_capacity(history.len() - older_from + 1);
        let mut tokens = recent_tokens + older_tokens;
        let mut summarized = false;

        if !unincluded.is_empty() {
            if headroom > self.config.summary_min_headroom {
                if let Some(summary) = self.summarize_overflow(unincluded, headroom).await {
                    tokens += self.counter.count_message(&summary);
                    messages.push(summary);
                    summarized = true;
                }
            } else {
                debug!(
                    "Skipping summary of {} messages: only {} tokens of headroom",
                    unincluded.len(),
                    headroom
                );
                METRICS.record_summarization("skipped");
            }
        }

        messages.extend_from_slice(&history[older_from..]);
        info!(
            "Fitted history: {} of {} messages, {} tokens, summarized={}",
            history.len() - older_from,
            history.len(),
            tokens,
            summarized
        );

        FittedHistory {
            messages,
            tokens,
            summarized,
            dropped: if summarized { 0 } else { unincluded.len() },
        }
    }

    /// Summary message for `unincluded`, or None if it cannot be produced or does not fit
    async fn summarize_overflow(&self, unincluded: &[Message], headroom: usize) -> Option<Message> {
        let summary = match self.summarizer.summarize(unincluded).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("History summarization failed, continuing without it: {}", e);
                METRICS.record_summarization("failed");
                return None;
            }
        };

        let message = Message::system(format!("{}{}", SUMMARY_PREFIX, summary));
        let cost = self.counter.count_message(&message);
        if cost > headroom {
            debug!("Summary ({} tokens) does not fit headroom {}", cost, headroom);
            METRICS.record_summarization("skipped");
            return None;
        }

        METRICS.record_summarization("inserted");
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::summarizer::SummarizerError;
    use crate::context::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSummarizer {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedSummarizer {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> std::result::Result<String, SummarizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or(SummarizerError::EmptySummary)
        }
    }

    fn manager(budget: TokenBudgetConfig, summarizer: Arc<FixedSummarizer>) -> ContextWindowManager {
        ContextWindowManager::with_summarizer(
            budget,
            ContextWindowConfig::default(),
            TokenCounter::heuristic(),
            summarizer,
        )
        .unwrap()
    }

    /// Each message costs 25 + 4 = 29 tokens under the heuristic
    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                let body = format!("{:03}{}", i, "m".repeat(97));
                if i % 2 == 0 {
                    Message::user(body)
                } else {
                    Message::assistant(body)
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_short_conversation_kept_whole() {
        let manager = manager(TokenBudgetConfig::default(), FixedSummarizer::ok("unused"));
        let prepared = manager
            .prepare(&ConversationContext::new("You are helpful.", "Next?").with_history(history(4)))
            .await;

        assert_eq!(prepared.messages.len(), 6);
        assert_eq!(prepared.messages[0].role, Role::System);
        assert_eq!(prepared.messages.last().unwrap().text(), "Next?");
        assert!(!prepared.summarized);
        assert_eq!(prepared.allocation.history_tokens, 4 * 29);
    }

    #[tokio::test]
    async fn test_system_prompt_truncated_to_allotment() {
        let budget = TokenBudgetConfig {
            system: 10,
            ..Default::default()
        };
        let manager = manager(budget, FixedSummarizer::ok("unused"));
        let messages = manager
            .prepare_context(&"s".repeat(400), None, None, &[], "hi")
            .await;
        assert_eq!(messages[0].text().len(), 40);
    }

    #[tokio::test]
    async fn test_rag_and_tools_reduce_history_budget() {
        let budget = TokenBudgetConfig {
            total: 1_000,
            system: 100,
            rag: 200,
            history: 500,
            current: 200,
        };
        let manager = manager(budget, FixedSummarizer::ok("unused"));
        let tools = serde_json::json!([{"name": "lookup", "description": "x".repeat(1_000)}]);
        let prepared = manager
            .prepare(
                &ConversationContext::new("sys", "now")
                    .with_rag_context("r".repeat(4_000))
                    .with_tool_definitions(tools)
                    .with_history(history(30)),
            )
            .await;

        // RAG truncated to its 200-token allotment
        assert_eq!(prepared.messages[1].text().len(), 800);
        assert!(prepared.allocation.tool_tokens > 250);
        assert!(prepared.allocation.total_allocated <= 1_000);
    }

    #[tokio::test]
    async fn test_recent_overflow_keeps_newest_that_fit() {
        let budget = TokenBudgetConfig {
            total: 1_000,
            system: 100,
            rag: 100,
            history: 100,
            current: 200,
        };
        let summarizer = FixedSummarizer::ok("unused");
        let manager = manager(budget, summarizer.clone());
        let hist = history(10);
        let messages = manager.prepare_context("", None, None, &hist, "new").await;

        // 100 tokens holds three 29-token messages
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], hist[7]);
        assert_eq!(messages[2], hist[9]);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    /// Twenty messages where message 10 is too large to fit behind the recent ones
    fn blocked_history() -> Vec<Message> {
        let mut hist = history(20);
        hist[10] = Message::user("b".repeat(2_000));
        hist
    }

    #[tokio::test]
    async fn test_twenty_message_history_keeps_recent_and_summarizes() {
        // 6 recent = 174 tokens; budget 600 leaves 426 for older messages,
        // three of which fit before the oversized one stops the scan
        let budget = TokenBudgetConfig {
            total: 2_000,
            system: 200,
            rag: 200,
            history: 600,
            current: 1_000,
        };
        let summarizer = FixedSummarizer::ok("They screened Acme and agreed to request audited financials.");
        let manager = manager(budget, summarizer.clone());
        let hist = blocked_history();
        let prepared = manager
            .prepare(&ConversationContext::new("", "What next?").with_history(hist.clone()))
            .await;

        let msgs = &prepared.messages;
        assert_eq!(msgs.last().unwrap().text(), "What next?");
        assert_eq!(&msgs[msgs.len() - 7..msgs.len() - 1], &hist[14..]);
        assert!(prepared.summarized);
        assert!(msgs[0].text().starts_with(SUMMARY_PREFIX));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(prepared.allocation.history_tokens <= 600);

        // Older messages included newest-first and contiguous
        assert_eq!(msgs.len(), 11);
        assert_eq!(&msgs[1..4], &hist[11..14]);
    }

    #[tokio::test]
    async fn test_summary_failure_is_not_fatal() {
        let budget = TokenBudgetConfig {
            total: 2_000,
            system: 200,
            rag: 200,
            history: 600,
            current: 1_000,
        };
        let summarizer = FixedSummarizer::failing();
        let manager = manager(budget, summarizer.clone());
        let hist = blocked_history();
        let prepared = manager
            .prepare(&ConversationContext::new("", "go").with_history(hist.clone()))
            .await;

        assert!(!prepared.summarized);
        assert_eq!(prepared.dropped_messages, 11);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        let msgs = &prepared.messages;
        assert_eq!(&msgs[msgs.len() - 7..msgs.len() - 1], &hist[14..]);
        assert_eq!(msgs.len() - 1 + prepared.dropped_messages, 20);
    }

    #[tokio::test]
    async fn test_oversized_summary_is_left_out() {
        // ~1,000 token summary against 339 tokens of headroom
        let budget = TokenBudgetConfig {
            total: 2_000,
            system: 200,
            rag: 200,
            history: 600,
            current: 1_000,
        };
        let summarizer = FixedSummarizer::ok(&"x".repeat(4_000));
        let manager = manager(budget, summarizer.clone());
        let hist = blocked_history();
        let prepared = manager
            .prepare(&ConversationContext::new("", "go").with_history(hist.clone()))
            .await;

        assert!(!prepared.summarized);
        assert_eq!(prepared.dropped_messages, 11);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(prepared
            .messages
            .iter()
            .all(|m| !m.text().starts_with(SUMMARY_PREFIX)));
        assert_eq!(&prepared.messages[..9], &hist[11..]);
        assert!(prepared.allocation.history_tokens <= 600);
    }

    #[tokio::test]
    async fn test_no_summary_without_headroom() {
        // 6 recent = 174; budget 200 leaves 26 tokens, below the 200 threshold
        let budget = TokenBudgetConfig {
            total: 2_000,
            system: 200,
            rag: 200,
            history: 200,
            current: 1_000,
        };
        let summarizer = FixedSummarizer::ok("summary");
        let manager = manager(budget, summarizer.clone());
        let prepared = manager
            .prepare(&ConversationContext::new("", "go").with_history(history(20)))
            .await;

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(prepared.messages.len(), 7);
        assert_eq!(prepared.dropped_messages, 14);
    }

    #[test]
    fn test_invalid_budget_rejected() {
        let budget = TokenBudgetConfig {
            total: 100,
            ..Default::default()
        };
        let result = ContextWindowManager::with_summarizer(
            budget,
            ContextWindowConfig::default(),
            TokenCounter::heuristic(),
            FixedSummarizer::ok("x"),
        );
        assert!(result.is_err());
    }
}
