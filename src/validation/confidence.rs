//! Confidence scoring for validated payloads

use super::schema::{FieldRules, NumericRule, ValidationSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const HIGH_THRESHOLD: f64 = 0.7;
pub const LOW_THRESHOLD: f64 = 0.4;

const BASELINE: f64 = 0.7;
const MISSING_REQUIRED_PENALTY: f64 = 0.15;
const ABSENT_EXPLANATION_PENALTY: f64 = 0.2;
const SHORT_EXPLANATION_PENALTY: f64 = 0.1;
const UNCERTAINTY_PENALTY: f64 = 0.15;
const ROUND_NUMBER_PENALTY: f64 = 0.02;
const RICHNESS_BONUS: f64 = 0.05;
const MAX_RICHNESS_BONUS: f64 = 0.1;
const FULL_COVERAGE_BONUS: f64 = 0.1;

const FLEXIBLE_CONFIDENCE: f64 = 0.85;
const FLEXIBLE_UNCERTAINTY_PENALTY: f64 = 0.3;

const UNCERTAINTY_PHRASES: &[&str] = &[
    "unable to assess",
    "unable to determine",
    "insufficient data",
    "insufficient information",
    "not enough information",
    "cannot determine",
    "can't determine",
    "cannot be determined",
    "no data available",
    "unclear",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Failed,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Bucket a score for a payload that validated
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            ConfidenceLevel::High
        } else if score < LOW_THRESHOLD {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Failed => "FAILED",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn contains_uncertainty(text: &str) -> bool {
    let lowered = text.to_lowercase();
    UNCERTAINTY_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Score free text validated against the flexible schema
pub fn score_text(text: &str) -> f64 {
    let score = if contains_uncertainty(text) {
        FLEXIBLE_CONFIDENCE - FLEXIBLE_UNCERTAINTY_PENALTY
    } else {
        FLEXIBLE_CONFIDENCE
    };
    round3(score)
}

/// Score a repaired structured payload
pub fn score_structured(schema: &ValidationSchema, rules: &FieldRules, data: &Map<String, Value>) -> f64 {
    let mut score = BASELINE;

    let missing = rules.required.iter().filter(|f| !is_present(data, f)).count();
    score -= MISSING_REQUIRED_PENALTY * missing as f64;

    if let Some(field) = rules.explanation {
        let text = data.get(field).and_then(Value::as_str).unwrap_or("").trim();
        if text.is_empty() {
            score -= ABSENT_EXPLANATION_PENALTY;
        } else {
            if text.chars().count() < schema.min_explanation_chars() {
                score -= SHORT_EXPLANATION_PENALTY;
            }
            if contains_uncertainty(text) {
                score -= UNCERTAINTY_PENALTY;
            }
        }
    }

    for rule in rules.numeric {
        if let Some(v) = data.get(rule.field).and_then(Value::as_f64) {
            if looks_round(rule, v) {
                score -= ROUND_NUMBER_PENALTY;
            }
        }
    }

    let rich = rules.richness.iter().filter(|f| is_present(data, f)).count();
    score += (RICHNESS_BONUS * rich as f64).min(MAX_RICHNESS_BONUS);

    if rules.known_fields().iter().all(|f| is_present(data, f)) {
        score += FULL_COVERAGE_BONUS;
    }

    round3(score.clamp(0.0, 1.0))
}

/// Multiples of 5 on wide ranges, of 0.1 on unit ranges
fn looks_round(rule: &NumericRule, v: f64) -> bool {
    if rule.max > 1.0 {
        v.fract() == 0.0 && (v as i64) % 5 == 0
    } else {
        let hundredths = v * 100.0;
        (hundredths - hundredths.round()).abs() < 1e-9 && (hundredths.round() as i64) % 10 == 0
    }
}

fn is_present(data: &Map<String, Value>, field: &str) -> bool {
    match data.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::schema::{SchemaRegistry, ValidationSchema};
    use serde_json::json;

    fn signal_schema() -> ValidationSchema {
        *SchemaRegistry::with_defaults().get("signal_score").unwrap()
    }

    fn score(value: Value) -> f64 {
        let schema = signal_schema();
        let data = value.as_object().cloned().unwrap();
        score_structured(&schema, schema.rules().unwrap(), &data)
    }

    #[test]
    fn test_levels() {
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.55), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.39), ConfidenceLevel::Low);
        assert_eq!(serde_json::to_value(ConfidenceLevel::Failed).unwrap(), json!("FAILED"));
    }

    #[test]
    fn test_specific_beats_round() {
        let explanation = "Strong inbound demand and two enterprise pilots converting this quarter.";
        let specific = score(json!({"score": 53, "explanation": explanation}));
        let round = score(json!({"score": 50, "explanation": explanation}));
        assert!(specific >= round);
        assert!(specific > round);
    }

    #[test]
    fn test_complete_payload_scores_high() {
        let s = score(json!({
            "score": 78,
            "explanation": "Revenue grew 40% year over year with improving net retention.",
            "factors": ["growth", "retention"]
        }));
        // baseline + richness + coverage
        assert_eq!(s, 0.85);
    }

    #[test]
    fn test_missing_and_hedged_payload_scores_low() {
        let s = score(json!({"explanation": "Unable to assess."}));
        // 0.7 - 0.15 missing - 0.1 short - 0.15 hedged
        assert_eq!(s, 0.3);
        assert_eq!(ConfidenceLevel::from_score(s), ConfidenceLevel::Low);
    }

    #[test]
    fn test_unit_range_roundness() {
        let rule = NumericRule { field: "confidence", min: 0.0, max: 1.0 };
        assert!(looks_round(&rule, 0.8));
        assert!(!looks_round(&rule, 0.83));
        assert!(!looks_round(&rule, 0.85));
    }

    #[test]
    fn test_text_scoring() {
        assert_eq!(score_text("The Signal Score is 78."), 0.85);
        assert_eq!(score_text("It is unclear from the deck."), 0.55);
    }
}
