//! Order and length invariants of the task batcher under mixed failures

use ai_gateway::routing::ROUTES;
use ai_gateway::{BatchConfig, CompletionClient, CompletionRequest, CompletionResponse, LlmError, TaskBatcher};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Echoes item ids back; every third call misbehaves in a different way
struct FlakyClient {
    calls: AtomicUsize,
}

fn item_ids(text: &str) -> Vec<u64> {
    text.match_indices("\"item\": ")
        .filter_map(|(idx, pat)| {
            let rest = &text[idx + pat.len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .collect()
}

#[async_trait]
impl CompletionClient for FlakyClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.messages.last().map(|m| m.text().into_owned()).unwrap_or_default();
        let ids = item_ids(&prompt);
        let batched = prompt.contains("=== TASK 1 ===");

        match call % 3 {
            0 if batched => Ok(CompletionResponse::text("[]")),
            1 if !batched => Err(LlmError::Timeout("slow upstream".to_string())),
            _ => {
                let items: Vec<Value> = ids.iter().map(|id| json!({ "item": id })).collect();
                let body = if batched {
                    Value::Array(items).to_string()
                } else {
                    items[0].to_string()
                };
                Ok(CompletionResponse::text(body))
            }
        }
    }
}

fn contexts(n: usize) -> Vec<Map<String, Value>> {
    (0..n)
        .map(|i| json!({ "item": i }).as_object().cloned().unwrap())
        .collect()
}

#[tokio::test]
async fn test_one_result_per_input_in_order() {
    for route in ROUTES {
        for n in [0usize, 1, 2, 7, 8, 9, 17] {
            for max_batch_size in [1usize, 3, 8] {
                let client = Arc::new(FlakyClient {
                    calls: AtomicUsize::new(0),
                });
                let batcher = TaskBatcher::new(client, BatchConfig::default());
                let results = batcher
                    .batch_complete(route.task_type, &contexts(n), max_batch_size)
                    .await;

                assert_eq!(results.len(), n, "{} n={} size={}", route.task_type, n, max_batch_size);
                for (i, result) in results.iter().enumerate() {
                    // Each slot is either its own item or an error entry
                    match result.get("item") {
                        Some(id) => assert_eq!(id, &json!(i)),
                        None => assert!(result.get("error").is_some(), "slot {} is {}", i, result),
                    }
                }
            }
        }
    }
}
