//! Field repairs that bring a parsed payload into schema compliance

use super::schema::{EnumRule, FieldRules, NumericRule};
use serde_json::{Map, Number, Value};

/// Apply every rule in `rules` to `data`, returning one entry per repair
pub fn apply_repairs(rules: &FieldRules, data: &mut Map<String, Value>) -> Vec<String> {
    let mut repairs = Vec::new();

    for rule in rules.numeric {
        repair_numeric(rule, data, &mut repairs);
    }
    for rule in rules.enums {
        repair_enum(rule, data, &mut repairs);
    }
    for field in rules.lists {
        repair_list(field, data, &mut repairs);
    }

    repairs
}

fn repair_numeric(rule: &NumericRule, data: &mut Map<String, Value>, repairs: &mut Vec<String>) {
    let Some(value) = data.get_mut(rule.field) else {
        return;
    };

    let number = match value {
        Value::Number(n) => match n.as_f64() {
            Some(v) => v,
            None => return,
        },
        Value::String(s) => match coerce_numeric_string(s) {
            Some(v) => {
                repairs.push(format!("Coerced {} from \"{}\" to {}", rule.field, s, v));
                *value = to_json_number(v);
                v
            }
            None => return,
        },
        _ => return,
    };

    let clamped = number.clamp(rule.min, rule.max);
    if clamped != number {
        repairs.push(format!(
            "Clamped {} from {} to {}",
            rule.field, number, clamped
        ));
        *value = to_json_number(clamped);
    }
}

/// `"72"` → 72, `"85%"` → 0.85
fn coerce_numeric_string(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
        None => trimmed.parse::<f64>().ok(),
    };
    parsed.filter(|v| v.is_finite())
}

/// Whole numbers stay integers so `100` does not become `100.0`
fn to_json_number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::Number(Number::from(v as i64))
    } else {
        Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn repair_enum(rule: &EnumRule, data: &mut Map<String, Value>, repairs: &mut Vec<String>) {
    let Some(value) = data.get_mut(rule.field) else {
        return;
    };

    let current = match &*value {
        Value::String(s) => s.clone(),
        Value::Null => return,
        other => other.to_string(),
    };

    if rule.allowed.contains(&current.as_str()) {
        return;
    }

    let normalized = current.trim().to_lowercase();
    match rule.allowed.iter().find(|allowed| allowed.to_lowercase() == normalized) {
        Some(canonical) => {
            repairs.push(format!(
                "Fixed {} case: \"{}\" -> \"{}\"",
                rule.field, current, canonical
            ));
            *value = Value::String((*canonical).to_string());
        }
        None => {
            repairs.push(format!(
                "Reset {}: \"{}\" is not one of {:?}, using \"{}\"",
                rule.field, current, rule.allowed, rule.default
            ));
            *value = Value::String(rule.default.to_string());
        }
    }
}

fn repair_list(field: &str, data: &mut Map<String, Value>, repairs: &mut Vec<String>) {
    let Some(value) = data.get_mut(field) else {
        return;
    };
    if value.is_array() || value.is_null() {
        return;
    }
    let scalar = value.take();
    *value = Value::Array(vec![scalar]);
    repairs.push(format!("Wrapped {} in a list", field));
}
