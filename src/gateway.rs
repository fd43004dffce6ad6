//! Gateway facade: bounded context, model call, validated output

use crate::batch::{self, BatchJob, TaskBatcher, TaskContext};
use crate::config::Config;
use crate::context::{BudgetAllocation, ContextWindowManager, ConversationContext, TokenCounter};
use crate::error::Result;
use crate::llm::{
    CompletionClient, CompletionRequest, CompletionResponse, ModelTier, OpenAiCompatClient,
    TemplateRegistry, TemplateRenderer,
};
use crate::routing;
use crate::validation::{OutputValidator, ValidationResult};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one conversational exchange
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeOutcome {
    pub content: String,
    pub validation: ValidationResult,
    pub allocation: BudgetAllocation,
    pub summarized: bool,
}

pub struct Gateway {
    client: Arc<dyn CompletionClient>,
    templates: Arc<TemplateRegistry>,
    context: ContextWindowManager,
    batcher: TaskBatcher,
    validator: OutputValidator,
}

impl Gateway {
    pub fn new(config: &Config, client: Arc<dyn CompletionClient>) -> Result<Self> {
        let templates = Arc::new(TemplateRegistry::with_defaults());
        let context = ContextWindowManager::new(
            config.token_budget.clone(),
            config.context.clone(),
            TokenCounter::new(),
            client.clone(),
        )?;
        let renderer: Arc<dyn TemplateRenderer> = templates.clone();
        let batcher = TaskBatcher::new(client.clone(), config.batch.clone()).with_renderer(renderer);

        info!(
            "Gateway ready: {} token window, batch size {}",
            config.token_budget.total, config.batch.max_batch_size
        );

        Ok(Self {
            client,
            templates,
            context,
            batcher,
            validator: OutputValidator::default(),
        })
    }

    /// Gateway backed by the bundled OpenAI-compatible client
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OpenAiCompatClient::new(config.llm.clone())?;
        Self::new(config, Arc::new(client))
    }

    pub fn context_manager(&self) -> &ContextWindowManager {
        &self.context
    }

    pub fn batcher(&self) -> &TaskBatcher {
        &self.batcher
    }

    pub fn validator(&self) -> &OutputValidator {
        &self.validator
    }

    /// Fit the conversation into the window, call the model and validate the reply
    pub async fn exchange(
        &self,
        task_type: &str,
        conversation: &ConversationContext,
    ) -> Result<ExchangeOutcome> {
        let prepared = self.context.prepare(conversation).await;
        let request = CompletionRequest::new(tier_for(task_type), prepared.messages, task_type);

        let response = self.client.complete(request).await?;
        let validation = self.validate_response(task_type, &response);

        Ok(ExchangeOutcome {
            content: response.content,
            validation,
            allocation: prepared.allocation,
            summarized: prepared.summarized,
        })
    }

    /// Render the task template, call the routed tier and validate
    pub async fn run_task(&self, task_type: &str, context: &TaskContext) -> Result<ValidationResult> {
        let rendered = self.templates.render(task_type, context).await?;
        debug!("Rendered {} with template {}", task_type, rendered.template_id);

        let request = CompletionRequest::new(tier_for(task_type), rendered.messages, task_type);
        let response = self.client.complete(request).await?;
        Ok(self.validate_response(task_type, &response))
    }

    /// Batch the job and validate every entry; error entries come back FAILED
    pub async fn run_batch(&self, job: &BatchJob) -> Vec<ValidationResult> {
        self.batcher
            .run(job)
            .await
            .into_iter()
            .map(|entry| match entry {
                entry if batch::is_error_entry(&entry) => {
                    let error = entry
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("Task failed")
                        .to_string();
                    ValidationResult::failed(error)
                }
                Value::Object(map) => self.validator.validate_structured(&job.task_type, map),
                other => self.validator.validate(&job.task_type, &other.to_string()),
            })
            .collect()
    }

    fn validate_response(&self, task_type: &str, response: &CompletionResponse) -> ValidationResult {
        match &response.validated_data {
            Some(Value::Object(data)) => self.validator.validate_structured(task_type, data.clone()),
            _ => self.validator.validate(task_type, &response.content),
        }
    }
}

fn tier_for(task_type: &str) -> ModelTier {
    routing::route(task_type)
        .map(|route| route.tier)
        .unwrap_or(ModelTier::Premium)
}
