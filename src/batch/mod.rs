//! Task batching
//!
//! Folds many small same-type jobs into one completion call and degrades to
//! per-item calls when a batch cannot be trusted.

pub mod batcher;
pub mod response_parser;

use crate::json_extract::ParseError;
use crate::llm::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use batcher::TaskBatcher;
pub use response_parser::parse_batch_response;

/// Per-item context handed to the template renderer
pub type TaskContext = Map<String, Value>;

/// A list of same-type jobs submitted together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub task_type: String,
    pub contexts: Vec<TaskContext>,
}

impl BatchJob {
    pub fn new(task_type: impl Into<String>, contexts: Vec<TaskContext>) -> Self {
        Self {
            task_type: task_type.into(),
            contexts,
        }
    }
}

/// Flag set on every per-item failure entry the batcher produces
pub const ITEM_ERROR_KEY: &str = "_batch_error";

/// Failure entry for an item that produced no usable object:
/// `{"error": .., "raw": .., "_batch_error": true}`
pub fn error_entry(error: impl Into<String>, raw: Value) -> Value {
    let mut entry = Map::new();
    entry.insert("error".to_string(), Value::String(error.into()));
    entry.insert("raw".to_string(), raw);
    entry.insert(ITEM_ERROR_KEY.to_string(), Value::Bool(true));
    Value::Object(entry)
}

/// True only for entries built by [`error_entry`]
pub fn is_error_entry(entry: &Value) -> bool {
    entry.get(ITEM_ERROR_KEY).and_then(Value::as_bool) == Some(true)
}

/// Reasons a batched chunk is abandoned in favour of per-item calls
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Batch call failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("Batch returned {got} results for {expected} tasks")]
    CountMismatch { expected: usize, got: usize },

    #[error("Batch response unparseable: {0}")]
    Unparseable(#[from] ParseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_batch_temperature")]
    pub temperature: f32,

    #[serde(default = "default_batch_max_output_tokens")]
    pub max_output_tokens: usize,

    #[serde(default = "default_individual_temperature")]
    pub individual_temperature: f32,

    #[serde(default = "default_individual_max_output_tokens")]
    pub individual_max_output_tokens: usize,

    /// Characters of unparseable output kept in a per-item error entry
    #[serde(default = "default_raw_snippet_chars")]
    pub raw_snippet_chars: usize,
}

fn default_max_batch_size() -> usize {
    8
}

fn default_batch_temperature() -> f32 {
    0.1
}

fn default_batch_max_output_tokens() -> usize {
    4096
}

fn default_individual_temperature() -> f32 {
    0.2
}

fn default_individual_max_output_tokens() -> usize {
    1024
}

fn default_raw_snippet_chars() -> usize {
    200
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            temperature: default_batch_temperature(),
            max_output_tokens: default_batch_max_output_tokens(),
            individual_temperature: default_individual_temperature(),
            individual_max_output_tokens: default_individual_max_output_tokens(),
            raw_snippet_chars: default_raw_snippet_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_entry_is_marked() {
        let entry = error_entry("Timeout: slow upstream", Value::Null);
        assert!(is_error_entry(&entry));
        assert_eq!(entry["error"], json!("Timeout: slow upstream"));
        assert_eq!(entry["raw"], Value::Null);

        // a model payload that happens to use the same field names
        let payload = json!({"error": "restated margin", "raw": "Q3 filing", "score": 55});
        assert!(!is_error_entry(&payload));
        assert!(!is_error_entry(&json!([1, 2])));
    }
}
