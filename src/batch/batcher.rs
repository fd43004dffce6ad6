//! Batched completion with chunk-local fallback to per-item calls

use super::response_parser::parse_batch_response;
use super::{error_entry, BatchConfig, BatchError, BatchJob, TaskContext};
use crate::context::Message;
use crate::llm::{CompletionClient, CompletionRequest, ModelTier, TemplateRenderer};
use crate::metrics::METRICS;
use crate::routing;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TASK_DIVIDER: &str = "\n\n---\n\n";

/// Groups same-type jobs into single completion calls
pub struct TaskBatcher {
    client: Arc<dyn CompletionClient>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    config: BatchConfig,
}

/// Rendered form of one item: its task body and the system prompt it came with
struct RenderedItem {
    system: Option<String>,
    body: String,
}

impl TaskBatcher {
    pub fn new(client: Arc<dyn CompletionClient>, config: BatchConfig) -> Self {
        Self {
            client,
            renderer: None,
            config,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run a job with the configured batch size
    pub async fn run(&self, job: &BatchJob) -> Vec<Value> {
        self.batch_complete(&job.task_type, &job.contexts, self.config.max_batch_size)
            .await
    }

    /// One result per context, in input order
    pub async fn batch_complete(
        &self,
        task_type: &str,
        contexts: &[TaskContext],
        max_batch_size: usize,
    ) -> Vec<Value> {
        if contexts.is_empty() {
            return Vec::new();
        }

        if !routing::is_batchable(task_type) || contexts.len() == 1 {
            debug!(
                "Processing {} {} item(s) individually",
                contexts.len(),
                task_type
            );
            return self.process_individually(task_type, contexts).await;
        }

        let batch_id = Uuid::new_v4();
        let chunk_size = max_batch_size.max(1);
        info!(
            "Batch {}: {} {} items in chunks of {}",
            batch_id,
            contexts.len(),
            task_type,
            chunk_size
        );

        let chunks = contexts
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| self.process_chunk(batch_id, index, task_type, chunk));

        join_all(chunks).await.into_iter().flatten().collect()
    }

    async fn process_chunk(
        &self,
        batch_id: Uuid,
        index: usize,
        task_type: &str,
        chunk: &[TaskContext],
    ) -> Vec<Value> {
        if chunk.len() == 1 {
            return self.process_individually(task_type, chunk).await;
        }

        match self.batch_call(task_type, chunk).await {
            Ok(results) => {
                debug!("Batch {} chunk {}: {} results", batch_id, index, results.len());
                METRICS.record_batch_chunk(task_type, true);
                METRICS.record_batch_items(task_type, "batched", results.len());
                results
            }
            Err(e) => {
                warn!(
                    "Batch {} chunk {} failed, falling back to individual calls: {}",
                    batch_id, index, e
                );
                METRICS.record_batch_chunk(task_type, false);
                self.process_individually(task_type, chunk).await
            }
        }
    }

    async fn batch_call(&self, task_type: &str, chunk: &[TaskContext]) -> Result<Vec<Value>, BatchError> {
        let mut items = Vec::with_capacity(chunk.len());
        for context in chunk {
            items.push(self.render_item(task_type, context).await);
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = items.first().and_then(|item| item.system.clone()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(build_batch_prompt(task_type, &items)));

        let request = CompletionRequest::new(ModelTier::Economy, messages, task_type)
            .temperature(self.config.temperature)
            .max_output_tokens(self.config.max_output_tokens);

        let response = self.client.complete(request).await?;
        parse_batch_response(&response.content, chunk.len())
    }

    async fn render_item(&self, task_type: &str, context: &TaskContext) -> RenderedItem {
        if let Some(renderer) = &self.renderer {
            match renderer.render(task_type, context).await {
                Ok(rendered) => {
                    if let Some(user) = rendered.first_user_message() {
                        return RenderedItem {
                            system: rendered.system_message().map(|m| m.text().into_owned()),
                            body: user.text().into_owned(),
                        };
                    }
                }
                Err(e) => warn!("Template render failed for {}: {}", task_type, e),
            }
        }

        RenderedItem {
            system: None,
            body: dump_context(context),
        }
    }

    async fn render_messages(&self, task_type: &str, context: &TaskContext) -> Vec<Message> {
        if let Some(renderer) = &self.renderer {
            match renderer.render(task_type, context).await {
                Ok(rendered) if !rendered.messages.is_empty() => return rendered.messages,
                Ok(_) => {}
                Err(e) => warn!("Template render failed for {}: {}", task_type, e),
            }
        }
        vec![Message::user(dump_context(context))]
    }

    async fn process_individually(&self, task_type: &str, contexts: &[TaskContext]) -> Vec<Value> {
        let tier = routing::individual_tier(task_type);
        let mut results = Vec::with_capacity(contexts.len());
        for context in contexts {
            results.push(self.process_item(task_type, tier, context).await);
        }
        METRICS.record_batch_items(task_type, "individual", results.len());
        results
    }

    async fn process_item(&self, task_type: &str, tier: ModelTier, context: &TaskContext) -> Value {
        let messages = self.render_messages(task_type, context).await;
        let request = CompletionRequest::new(tier, messages, task_type)
            .temperature(self.config.individual_temperature)
            .max_output_tokens(self.config.individual_max_output_tokens);

        let response = match self.client.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Individual {} call failed: {}", task_type, e);
                return error_entry(e.to_string(), Value::Null);
            }
        };

        if let Some(data @ Value::Object(_)) = response.validated_data {
            return data;
        }

        match serde_json::from_str::<Value>(response.content.trim()) {
            Ok(data @ Value::Object(_)) => data,
            Ok(_) => self.unparseable(task_type, "Response is not a JSON object", &response.content),
            Err(e) => self.unparseable(task_type, &e.to_string(), &response.content),
        }
    }

    fn unparseable(&self, task_type: &str, reason: &str, content: &str) -> Value {
        warn!("Individual {} response unparseable: {}", task_type, reason);
        let raw: String = content.chars().take(self.config.raw_snippet_chars).collect();
        error_entry(format!("Failed to parse response: {}", reason), Value::String(raw))
    }
}

fn dump_context(context: &TaskContext) -> String {
    serde_json::to_string_pretty(context).unwrap_or_else(|_| format!("{:?}", context))
}

fn build_batch_prompt(task_type: &str, items: &[RenderedItem]) -> String {
    let n = items.len();
    let header = format!(
        "You will complete {n} independent {task_type} tasks.\n\
         Return a single JSON array containing exactly {n} JSON objects, one per task, \
         in the same order as the tasks below. Each object must be the complete answer \
         to its task. Do not include any text outside the array."
    );

    let tasks: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("=== TASK {} ===\n{}", i + 1, item.body.trim()))
        .collect();

    format!("{}\n\n{}", header, tasks.join(TASK_DIVIDER))
}
