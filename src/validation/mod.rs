//! Output validation for model responses
//!
//! Parses free-form model text into JSON, repairs fields that drift from the
//! task's schema and scores how much the result can be trusted.

pub mod confidence;
pub mod repair;
pub mod schema;
pub mod validator;

pub use confidence::{ConfidenceLevel, HIGH_THRESHOLD, LOW_THRESHOLD};
pub use repair::apply_repairs;
pub use schema::{
    EnumRule, FieldRules, NumericRule, SchemaFamily, SchemaRegistry, ValidationSchema, DEFAULT_SCHEMAS,
};
pub use validator::{parse_json_object, OutputValidator, ValidationResult};
