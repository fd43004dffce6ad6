//! Prompt templates keyed by task type

use crate::context::Message;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Template rendering errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("No template registered for task type '{0}'")]
    NotFound(String),

    #[error("Template for '{task_type}' needs variable '{variable}'")]
    MissingVariable { task_type: String, variable: String },
}

/// Output of a template render
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub messages: Vec<Message>,
    pub template_id: String,
    pub metadata: HashMap<String, String>,
}

impl RenderedPrompt {
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == crate::context::Role::System)
    }

    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == crate::context::Role::User)
    }
}

/// Turns a task type and its context into role-tagged messages
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        task_type: &str,
        context: &Map<String, Value>,
    ) -> Result<RenderedPrompt, TemplateError>;
}

/// A system + user template pair
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system: Option<String>,
    pub user: String,
}

impl PromptTemplate {
    pub fn new(system: Option<&str>, user: &str) -> Self {
        Self {
            system: system.map(str::to_string),
            user: user.to_string(),
        }
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.system.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.user.as_bytes());
        hex::encode(hasher.finalize())[..12].to_string()
    }
}

/// In-memory template registry
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, PromptTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with a template for every routed task type
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (task_type, template) in default_templates() {
            registry.register(task_type, template);
        }
        registry
    }

    pub fn register(&mut self, task_type: impl Into<String>, template: PromptTemplate) {
        self.templates.insert(task_type.into(), template);
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.templates.contains_key(task_type)
    }

    fn fill(task_type: &str, template: &str, context: &Map<String, Value>) -> Result<String, TemplateError> {
        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match context.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(variable) => Err(TemplateError::MissingVariable {
                task_type: task_type.to_string(),
                variable,
            }),
            None => Ok(rendered.into_owned()),
        }
    }
}

#[async_trait]
impl TemplateRenderer for TemplateRegistry {
    async fn render(
        &self,
        task_type: &str,
        context: &Map<String, Value>,
    ) -> Result<RenderedPrompt, TemplateError> {
        let template = self
            .templates
            .get(task_type)
            .ok_or_else(|| TemplateError::NotFound(task_type.to_string()))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &template.system {
            messages.push(Message::system(Self::fill(task_type, system, context)?));
        }
        messages.push(Message::user(Self::fill(task_type, &template.user, context)?));

        let mut metadata = HashMap::new();
        metadata.insert("task_type".to_string(), task_type.to_string());

        Ok(RenderedPrompt {
            messages,
            template_id: format!("{}@{}", task_type, template.fingerprint()),
            metadata,
        })
    }
}

const JSON_ONLY: &str = "Respond with a single JSON object and nothing else.";

fn default_templates() -> Vec<(&'static str, PromptTemplate)> {
    vec![
        (
            "deal_screening",
            PromptTemplate::new(
                Some("You are an investment analyst screening inbound deals."),
                "Screen the following company and recommend whether to proceed.\n\n{{company}}\n\n\
                 Return fields: score (0-100), recommendation (proceed | pass | need_more_info), \
                 rationale, strengths (list), risks (list). ",
            ),
        ),
        (
            "signal_score",
            PromptTemplate::new(
                Some("You score companies on the strength of their market signals."),
                "Score the signals for:\n\n{{company}}\n\n\
                 Return fields: score (0-100), explanation, factors (list).",
            ),
        ),
        (
            "document_classification",
            PromptTemplate::new(
                Some("You classify financial documents."),
                "Classify this document:\n\n{{document}}\n\n\
                 Return fields: document_type (pitch_deck | financial_statement | term_sheet | \
                 legal | market_research | other), confidence (0-1), reasoning, tags (list).",
            ),
        ),
        (
            "kpi_extraction",
            PromptTemplate::new(
                Some("You extract key performance indicators from company documents."),
                "Extract KPIs from:\n\n{{document}}\n\n\
                 Return fields: kpis (list of objects with name, value, unit, period), \
                 confidence (0-1), notes.",
            ),
        ),
        (
            "sentiment_analysis",
            PromptTemplate::new(
                Some("You assess sentiment in business text."),
                "Assess the sentiment of:\n\n{{text}}\n\n\
                 Return fields: sentiment (positive | neutral | negative), confidence (0-1), \
                 reasoning, key_phrases (list).",
            ),
        ),
        (
            "memo_narrative",
            PromptTemplate::new(
                Some("You write investment committee memos."),
                "Write a memo narrative for:\n\n{{company}}\n\n\
                 Return fields: narrative, sections (list), key_points (list).",
            ),
        ),
        (
            "executive_summary",
            PromptTemplate::new(
                Some("You write concise executive summaries."),
                "Summarize for executives:\n\n{{content}}\n\n\
                 Return fields: summary, highlights (list), next_steps (list).",
            ),
        ),
        (
            "chat",
            PromptTemplate::new(
                Some("You are a helpful analyst assistant."),
                "{{message}}",
            ),
        ),
        (
            "conversation_summary",
            PromptTemplate::new(
                Some("You summarize conversations concisely."),
                "{{transcript}}",
            ),
        ),
    ]
    .into_iter()
    .map(|(task_type, mut template)| {
        if !matches!(task_type, "chat" | "conversation_summary") {
            template.user = format!("{}\n\n{}", template.user.trim_end(), JSON_ONLY);
        }
        (task_type, template)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_render_fills_placeholders() {
        let mut registry = TemplateRegistry::new();
        registry.register(
            "greet",
            PromptTemplate::new(Some("Be brief."), "Hello {{ name }}, you are {{age}}."),
        );

        let rendered = registry
            .render("greet", &ctx(json!({"name": "Ada", "age": 36})))
            .await
            .unwrap();

        assert_eq!(rendered.messages.len(), 2);
        assert_eq!(rendered.messages[0].role, Role::System);
        assert_eq!(rendered.first_user_message().unwrap().text(), "Hello Ada, you are 36.");
        assert!(rendered.template_id.starts_with("greet@"));
        assert_eq!(rendered.template_id.len(), "greet@".len() + 12);
    }

    #[tokio::test]
    async fn test_missing_variable_and_unknown_task() {
        let registry = TemplateRegistry::with_defaults();
        let err = registry.render("signal_score", &Map::new()).await.unwrap_err();
        assert!(matches!(err, TemplateError::MissingVariable { ref variable, .. } if variable == "company"));

        let err = registry.render("nope", &Map::new()).await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_template_id_is_stable() {
        let registry = TemplateRegistry::with_defaults();
        let context = ctx(json!({"message": "hi"}));
        let a = registry.render("chat", &context).await.unwrap();
        let b = registry.render("chat", &context).await.unwrap();
        assert_eq!(a.template_id, b.template_id);
    }
}
