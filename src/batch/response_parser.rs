//! Array-aware parsing of combined batch responses

use super::BatchError;
use crate::json_extract::{array_span, balanced_spans, first_success, strip_code_fences, Strategy};
use serde_json::Value;
use tracing::debug;

const ARRAY_STRATEGIES: [Strategy<Vec<Value>>; 4] = [
    ("direct", parse_direct),
    ("code_fence", parse_fenced),
    ("array_span", parse_array_span),
    ("object_scan", scan_objects),
];

fn parse_array(text: &str) -> Result<Vec<Value>, String> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err("JSON is not an array".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_direct(text: &str) -> Result<Vec<Value>, String> {
    parse_array(text)
}

fn parse_fenced(text: &str) -> Result<Vec<Value>, String> {
    let body = strip_code_fences(text).ok_or("no code fence")?;
    parse_array(&body)
}

fn parse_array_span(text: &str) -> Result<Vec<Value>, String> {
    let span = array_span(text).ok_or("no array span")?;
    parse_array(span)
}

/// Collect every top-level object that parses on its own
fn scan_objects(text: &str) -> Result<Vec<Value>, String> {
    let objects: Vec<Value> = balanced_spans(text, '{', '}')
        .into_iter()
        .filter_map(|span| match serde_json::from_str::<Value>(span) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        })
        .collect();

    if objects.is_empty() {
        Err("no parseable objects".to_string())
    } else {
        Ok(objects)
    }
}

/// Parse a batch reply into exactly `expected` items
pub fn parse_batch_response(text: &str, expected: usize) -> Result<Vec<Value>, BatchError> {
    let (items, strategy) = first_success(text, &ARRAY_STRATEGIES)?;
    debug!(
        "Parsed batch response with {} strategy: {} items",
        strategy,
        items.len()
    );

    if items.len() != expected {
        return Err(BatchError::CountMismatch {
            expected,
            got: items.len(),
        });
    }
    Ok(items)
}
