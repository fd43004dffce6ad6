//! Static task routing table
//!
//! Which model tier serves a task type, whether it may be folded into a
//! batch call, and which schema family validates its output.

use crate::llm::ModelTier;
use crate::validation::SchemaFamily;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskRoute {
    pub task_type: &'static str,
    pub tier: ModelTier,
    pub batchable: bool,
    pub family: SchemaFamily,
}

const fn route_of(
    task_type: &'static str,
    tier: ModelTier,
    batchable: bool,
    family: SchemaFamily,
) -> TaskRoute {
    TaskRoute {
        task_type,
        tier,
        batchable,
        family,
    }
}

pub const ROUTES: &[TaskRoute] = &[
    route_of("deal_screening", ModelTier::Premium, false, SchemaFamily::Scored),
    route_of("signal_score", ModelTier::Economy, true, SchemaFamily::Scored),
    route_of("document_classification", ModelTier::Economy, true, SchemaFamily::Classification),
    route_of("kpi_extraction", ModelTier::Economy, true, SchemaFamily::Scored),
    route_of("sentiment_analysis", ModelTier::Economy, true, SchemaFamily::Classification),
    route_of("memo_narrative", ModelTier::Premium, false, SchemaFamily::Narrative),
    route_of("executive_summary", ModelTier::Premium, false, SchemaFamily::Narrative),
    route_of("chat", ModelTier::Premium, false, SchemaFamily::Flexible),
    route_of("conversation_summary", ModelTier::Economy, false, SchemaFamily::Flexible),
];

pub fn route(task_type: &str) -> Option<&'static TaskRoute> {
    ROUTES.iter().find(|r| r.task_type == task_type)
}

/// Task types on the batch allow-list
pub fn is_batchable(task_type: &str) -> bool {
    route(task_type).map(|r| r.batchable).unwrap_or(false)
}

pub fn batchable_task_types() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().filter(|r| r.batchable).map(|r| r.task_type)
}

/// Tier for the per-item path: economy when batchable, premium otherwise
pub fn individual_tier(task_type: &str) -> ModelTier {
    if is_batchable(task_type) {
        ModelTier::Economy
    } else {
        ModelTier::Premium
    }
}
