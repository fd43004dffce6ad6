//! Validation schemas per task type
//!
//! Each task type maps to one of four schema families. Structured families
//! carry typed field rules; the flexible family only asks for non-blank text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema family, which also drives family-specific confidence heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFamily {
    Scored,
    Classification,
    Narrative,
    Flexible,
}

/// Numeric field with an inclusive range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRule {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
}

/// Enumerated field with its canonical values and fallback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumRule {
    pub field: &'static str,
    pub allowed: &'static [&'static str],
    pub default: &'static str,
}

/// Field rules shared by the structured families
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRules {
    pub required: &'static [&'static str],
    pub numeric: &'static [NumericRule],
    pub enums: &'static [EnumRule],
    pub lists: &'static [&'static str],
    /// Free-text field judged for length and hedging
    pub explanation: Option<&'static str>,
    /// Optional fields whose presence signals a thorough answer
    pub richness: &'static [&'static str],
}

impl FieldRules {
    /// Every field any rule mentions, without duplicates
    pub fn known_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = Vec::new();
        let all = self
            .required
            .iter()
            .copied()
            .chain(self.numeric.iter().map(|r| r.field))
            .chain(self.enums.iter().map(|r| r.field))
            .chain(self.lists.iter().copied())
            .chain(self.explanation)
            .chain(self.richness.iter().copied());
        for field in all {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationSchema {
    Scored(FieldRules),
    Classification(FieldRules),
    Narrative(FieldRules),
    /// Any non-blank text
    Flexible,
}

impl ValidationSchema {
    pub fn family(&self) -> SchemaFamily {
        match self {
            ValidationSchema::Scored(_) => SchemaFamily::Scored,
            ValidationSchema::Classification(_) => SchemaFamily::Classification,
            ValidationSchema::Narrative(_) => SchemaFamily::Narrative,
            ValidationSchema::Flexible => SchemaFamily::Flexible,
        }
    }

    pub fn rules(&self) -> Option<&FieldRules> {
        match self {
            ValidationSchema::Scored(rules)
            | ValidationSchema::Classification(rules)
            | ValidationSchema::Narrative(rules) => Some(rules),
            ValidationSchema::Flexible => None,
        }
    }

    /// Explanations shorter than this read as thin
    pub fn min_explanation_chars(&self) -> usize {
        match self {
            ValidationSchema::Scored(_) => 40,
            ValidationSchema::Classification(_) => 20,
            ValidationSchema::Narrative(_) => 150,
            ValidationSchema::Flexible => 0,
        }
    }
}

const UNIT: (f64, f64) = (0.0, 1.0);
const PERCENT: (f64, f64) = (0.0, 100.0);

const fn numeric(field: &'static str, range: (f64, f64)) -> NumericRule {
    NumericRule {
        field,
        min: range.0,
        max: range.1,
    }
}

const DEAL_SCREENING: ValidationSchema = ValidationSchema::Scored(FieldRules {
    required: &["score", "recommendation", "rationale"],
    numeric: &[numeric("score", PERCENT)],
    enums: &[EnumRule {
        field: "recommendation",
        allowed: &["proceed", "pass", "need_more_info"],
        default: "need_more_info",
    }],
    lists: &["strengths", "risks"],
    explanation: Some("rationale"),
    richness: &["strengths", "risks"],
});

const SIGNAL_SCORE: ValidationSchema = ValidationSchema::Scored(FieldRules {
    required: &["score", "explanation"],
    numeric: &[numeric("score", PERCENT)],
    enums: &[],
    lists: &["factors"],
    explanation: Some("explanation"),
    richness: &["factors"],
});

const KPI_EXTRACTION: ValidationSchema = ValidationSchema::Scored(FieldRules {
    required: &["kpis"],
    numeric: &[numeric("confidence", UNIT)],
    enums: &[],
    lists: &["kpis"],
    explanation: None,
    richness: &["notes"],
});

const DOCUMENT_CLASSIFICATION: ValidationSchema = ValidationSchema::Classification(FieldRules {
    required: &["document_type", "confidence"],
    numeric: &[numeric("confidence", UNIT)],
    enums: &[EnumRule {
        field: "document_type",
        allowed: &[
            "pitch_deck",
            "financial_statement",
            "term_sheet",
            "legal",
            "market_research",
            "other",
        ],
        default: "other",
    }],
    lists: &["tags"],
    explanation: Some("reasoning"),
    richness: &["tags"],
});

const SENTIMENT_ANALYSIS: ValidationSchema = ValidationSchema::Classification(FieldRules {
    required: &["sentiment"],
    numeric: &[numeric("confidence", UNIT)],
    enums: &[EnumRule {
        field: "sentiment",
        allowed: &["positive", "neutral", "negative"],
        default: "neutral",
    }],
    lists: &["key_phrases"],
    explanation: Some("reasoning"),
    richness: &["key_phrases"],
});

const MEMO_NARRATIVE: ValidationSchema = ValidationSchema::Narrative(FieldRules {
    required: &["narrative"],
    numeric: &[],
    enums: &[],
    lists: &["sections", "key_points"],
    explanation: Some("narrative"),
    richness: &["sections", "key_points"],
});

const EXECUTIVE_SUMMARY: ValidationSchema = ValidationSchema::Narrative(FieldRules {
    required: &["summary"],
    numeric: &[],
    enums: &[],
    lists: &["highlights", "next_steps"],
    explanation: Some("summary"),
    richness: &["highlights", "next_steps"],
});

/// Built-in schemas, one per routed task type
pub const DEFAULT_SCHEMAS: &[(&str, ValidationSchema)] = &[
    ("deal_screening", DEAL_SCREENING),
    ("signal_score", SIGNAL_SCORE),
    ("kpi_extraction", KPI_EXTRACTION),
    ("document_classification", DOCUMENT_CLASSIFICATION),
    ("sentiment_analysis", SENTIMENT_ANALYSIS),
    ("memo_narrative", MEMO_NARRATIVE),
    ("executive_summary", EXECUTIVE_SUMMARY),
    ("chat", ValidationSchema::Flexible),
    ("conversation_summary", ValidationSchema::Flexible),
];

/// Lookup from task type to schema
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ValidationSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (task_type, schema) in DEFAULT_SCHEMAS {
            registry.register(*task_type, *schema);
        }
        registry
    }

    pub fn register(&mut self, task_type: impl Into<String>, schema: ValidationSchema) {
        self.schemas.insert(task_type.into(), schema);
    }

    pub fn get(&self, task_type: &str) -> Option<&ValidationSchema> {
        self.schemas.get(task_type)
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.schemas.contains_key(task_type)
    }

    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_defaults_are_allowed_values() {
        for (task_type, schema) in DEFAULT_SCHEMAS {
            if let Some(rules) = schema.rules() {
                for rule in rules.enums {
                    assert!(
                        rule.allowed.contains(&rule.default),
                        "{}.{} default not allowed",
                        task_type,
                        rule.field
                    );
                }
                for rule in rules.numeric {
                    assert!(rule.min < rule.max);
                }
            }
        }
    }

    #[test]
    fn test_known_fields_deduplicated() {
        let rules = DEAL_SCREENING.rules().unwrap();
        assert_eq!(
            rules.known_fields(),
            vec!["score", "recommendation", "rationale", "strengths", "risks"]
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(registry.get("chat").map(|s| s.family()), Some(SchemaFamily::Flexible));
        assert_eq!(
            registry.get("signal_score").map(|s| s.family()),
            Some(SchemaFamily::Scored)
        );
        assert!(registry.get("unknown").is_none());
    }
}
