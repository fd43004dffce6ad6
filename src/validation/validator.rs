//! Output validator: parse, repair and score model responses

use super::confidence::{score_structured, score_text, ConfidenceLevel};
use super::repair::apply_repairs;
use super::schema::{SchemaRegistry, ValidationSchema};
use crate::json_extract::{
    first_balanced, first_success, relax_trailing_commas, strip_code_fences, ParseError, Strategy,
};
use crate::metrics::METRICS;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Outcome of validating one model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validated: bool,
    pub data: Option<Map<String, Value>>,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub repairs_applied: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            validated: false,
            data: None,
            confidence: 0.0,
            confidence_level: ConfidenceLevel::Failed,
            repairs_applied: Vec::new(),
            error: Some(error.into()),
        }
    }

    fn accepted(data: Option<Map<String, Value>>, confidence: f64, repairs: Vec<String>) -> Self {
        Self {
            validated: true,
            data,
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            repairs_applied: repairs,
            error: None,
        }
    }
}

const OBJECT_STRATEGIES: [Strategy<Map<String, Value>>; 4] = [
    ("direct", parse_direct),
    ("code_fence", parse_fenced),
    ("embedded_object", parse_embedded),
    ("trailing_commas", parse_relaxed),
];

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("JSON is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_direct(text: &str) -> Result<Map<String, Value>, String> {
    parse_object(text)
}

fn parse_fenced(text: &str) -> Result<Map<String, Value>, String> {
    let body = strip_code_fences(text).ok_or("no code fence")?;
    parse_object(&body)
}

fn parse_embedded(text: &str) -> Result<Map<String, Value>, String> {
    let span = first_balanced(text, '{', '}').ok_or("no balanced object")?;
    parse_object(span)
}

fn parse_relaxed(text: &str) -> Result<Map<String, Value>, String> {
    let body = strip_code_fences(text).unwrap_or_else(|| text.to_string());
    let span = first_balanced(&body, '{', '}').unwrap_or(&body);
    parse_object(&relax_trailing_commas(span))
}

/// Parse the first JSON object out of `raw`, trying each recovery strategy in turn
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    first_success(raw, &OBJECT_STRATEGIES).map(|(map, strategy)| {
        debug!("Parsed model output with {} strategy", strategy);
        map
    })
}

/// Validates model output against the schema registered for its task type
#[derive(Debug, Clone)]
pub struct OutputValidator {
    registry: SchemaRegistry,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(SchemaRegistry::with_defaults())
    }
}

impl OutputValidator {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Validate raw model text
    pub fn validate(&self, task_type: &str, raw_text: &str) -> ValidationResult {
        let result = match self.registry.get(task_type) {
            None => ValidationResult::failed(format!(
                "No validation schema registered for task type '{}'",
                task_type
            )),
            Some(ValidationSchema::Flexible) => validate_text(raw_text),
            Some(schema) => match parse_json_object(raw_text) {
                Ok(data) => validate_object(schema, data),
                Err(e) => {
                    warn!("Validation failed for {}: {}", task_type, e);
                    ValidationResult::failed(e.to_string())
                }
            },
        };
        self.record(task_type, &result);
        result
    }

    /// Validate a payload the completion client already parsed
    pub fn validate_structured(&self, task_type: &str, data: Map<String, Value>) -> ValidationResult {
        let result = match self.registry.get(task_type) {
            None => ValidationResult::failed(format!(
                "No validation schema registered for task type '{}'",
                task_type
            )),
            Some(ValidationSchema::Flexible) => {
                let text = Value::Object(data).to_string();
                validate_text(&text)
            }
            Some(schema) => validate_object(schema, data),
        };
        self.record(task_type, &result);
        result
    }

    fn record(&self, task_type: &str, result: &ValidationResult) {
        debug!(
            "Validated {}: level={}, confidence={}, repairs={}",
            task_type,
            result.confidence_level,
            result.confidence,
            result.repairs_applied.len()
        );
        METRICS.record_validation(
            task_type,
            result.confidence_level.as_str(),
            result.repairs_applied.len(),
        );
    }
}

fn validate_text(raw_text: &str) -> ValidationResult {
    if raw_text.trim().is_empty() {
        return ValidationResult::failed("Response is empty");
    }
    ValidationResult::accepted(None, score_text(raw_text), Vec::new())
}

fn validate_object(schema: &ValidationSchema, mut data: Map<String, Value>) -> ValidationResult {
    let Some(rules) = schema.rules() else {
        return ValidationResult::failed("Schema has no field rules");
    };
    let repairs = apply_repairs(rules, &mut data);
    let confidence = score_structured(schema, rules, &data);
    ValidationResult::accepted(Some(data), confidence, repairs)
}
