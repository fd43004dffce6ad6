//! Summarization of history that no longer fits the window

use super::models::Message;
use crate::llm::{CompletionClient, CompletionRequest, LlmError, ModelTier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condense `messages` (oldest first) into a short prose summary
    async fn summarize(&self, messages: &[Message]) -> Result<String, SummarizerError>;
}

/// Configuration for the completion-backed summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Characters kept from each message in the transcript
    #[serde(default = "default_max_chars_per_message")]
    pub max_chars_per_message: usize,
    /// Cap on the whole transcript sent for summarization
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_chars_per_message() -> usize { 500 }
fn default_max_input_chars() -> usize { 3_000 }
fn default_max_output_tokens() -> usize { 200 }
fn default_temperature() -> f32 { 0.3 }

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_chars_per_message: default_max_chars_per_message(),
            max_input_chars: default_max_input_chars(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Summarizer that asks the economy-tier model
pub struct CompletionSummarizer {
    client: Arc<dyn CompletionClient>,
    config: SummarizerConfig,
}

impl CompletionSummarizer {
    pub fn new(client: Arc<dyn CompletionClient>, config: SummarizerConfig) -> Self {
        Self { client, config }
    }

    /// `"<Role>: <content prefix>"` lines, capped at `max_input_chars`
    pub fn build_transcript(&self, messages: &[Message]) -> String {
        let transcript = messages
            .iter()
            .map(|m| {
                let text: String = m.text().chars().take(self.config.max_chars_per_message).collect();
                format!("{}: {}", m.role.label(), text)
            })
            .collect::<Vec<_>>()
            .join("\n");
        transcript.chars().take(self.config.max_input_chars).collect()
    }

    fn build_prompt(transcript: &str) -> String {
        format!(
            "Summarize the following earlier part of a conversation in 2-3 sentences. \
             Capture the main topic, key findings, and any action items.\n\n{}",
            transcript
        )
    }
}

#[async_trait]
impl Summarizer for CompletionSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, SummarizerError> {
        if messages.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }

        let transcript = self.build_transcript(messages);
        debug!(
            "Summarizing {} messages ({} chars)",
            messages.len(),
            transcript.chars().count()
        );

        let request = CompletionRequest::new(
            ModelTier::Economy,
            vec![
                Message::system("You summarize conversations concisely and factually."),
                Message::user(Self::build_prompt(&transcript)),
            ],
            "conversation_summary",
        )
        .max_output_tokens(self.config.max_output_tokens)
        .temperature(self.config.temperature);

        let response = self.client.complete(request).await?;
        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }
        Ok(summary.to_string())
    }
}

/// Summarizer errors
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("Completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("Model returned an empty summary")]
    EmptySummary,
}
