//! Metrics collection for observability

use crate::llm::ModelTier;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Context window metrics
    pub token_budget_used: Histogram,
    pub token_budget_remaining: Histogram,
    pub history_messages_dropped: Counter,
    pub summarizations: CounterVec,

    // Completion client metrics
    pub llm_requests: CounterVec,
    pub llm_request_duration: HistogramVec,
    pub llm_circuit_open: CounterVec,

    // Batching metrics
    pub batch_chunks: CounterVec,
    pub batch_items: CounterVec,

    // Validation metrics
    pub validations: CounterVec,
    pub validation_repairs: Counter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let token_budget_used = register_histogram_with_registry!(
            "gateway_context_tokens_used",
            "Tokens allocated per prepared context",
            registry
        )?;

        let token_budget_remaining = register_histogram_with_registry!(
            "gateway_context_tokens_remaining",
            "Tokens left unallocated per prepared context",
            registry
        )?;

        let history_messages_dropped = register_counter_with_registry!(
            Opts::new(
                "gateway_history_messages_dropped_total",
                "History messages left out of a prepared context"
            ),
            registry
        )?;

        let summarizations = register_counter_vec_with_registry!(
            Opts::new("gateway_summarizations_total", "History summarization attempts"),
            &["outcome"],
            registry
        )?;

        let llm_requests = register_counter_vec_with_registry!(
            Opts::new("gateway_llm_requests_total", "Completion requests by tier"),
            &["tier", "status"],
            registry
        )?;

        let llm_request_duration = register_histogram_vec_with_registry!(
            "gateway_llm_request_duration_seconds",
            "Completion call duration in seconds, retries included",
            &["tier"],
            registry
        )?;

        let llm_circuit_open = register_counter_vec_with_registry!(
            Opts::new("gateway_llm_circuit_open_total", "Calls rejected by an open breaker"),
            &["tier"],
            registry
        )?;

        let batch_chunks = register_counter_vec_with_registry!(
            Opts::new("gateway_batch_chunks_total", "Batch chunks by outcome"),
            &["task_type", "outcome"],
            registry
        )?;

        let batch_items = register_counter_vec_with_registry!(
            Opts::new("gateway_batch_items_total", "Batch items by processing path"),
            &["task_type", "path"],
            registry
        )?;

        let validations = register_counter_vec_with_registry!(
            Opts::new("gateway_validations_total", "Validation results by confidence level"),
            &["task_type", "level"],
            registry
        )?;

        let validation_repairs = register_counter_with_registry!(
            Opts::new("gateway_validation_repairs_total", "Field repairs applied"),
            registry
        )?;

        Ok(Self {
            registry,
            token_budget_used,
            token_budget_remaining,
            history_messages_dropped,
            summarizations,
            llm_requests,
            llm_request_duration,
            llm_circuit_open,
            batch_chunks,
            batch_items,
            validations,
            validation_repairs,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_token_budget(&self, used: usize, remaining: usize, dropped_messages: usize) {
        self.token_budget_used.observe(used as f64);
        self.token_budget_remaining.observe(remaining as f64);
        if dropped_messages > 0 {
            self.history_messages_dropped.inc_by(dropped_messages as f64);
        }
    }

    /// outcome: "inserted", "failed", "skipped"
    pub fn record_summarization(&self, outcome: &str) {
        self.summarizations.with_label_values(&[outcome]).inc();
    }

    pub fn record_llm_request(&self, tier: ModelTier, success: bool) {
        let status = if success { "success" } else { "error" };
        self.llm_requests.with_label_values(&[tier.as_str(), status]).inc();
    }

    pub fn observe_llm_duration(&self, tier: ModelTier, elapsed: Duration) {
        self.llm_request_duration
            .with_label_values(&[tier.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_circuit_open(&self, tier: ModelTier) {
        self.llm_circuit_open.with_label_values(&[tier.as_str()]).inc();
    }

    pub fn record_batch_chunk(&self, task_type: &str, batched: bool) {
        let outcome = if batched { "batched" } else { "fallback" };
        self.batch_chunks.with_label_values(&[task_type, outcome]).inc();
    }

    pub fn record_batch_items(&self, task_type: &str, path: &str, count: usize) {
        self.batch_items
            .with_label_values(&[task_type, path])
            .inc_by(count as f64);
    }

    pub fn record_validation(&self, task_type: &str, level: &str, repairs: usize) {
        self.validations.with_label_values(&[task_type, level]).inc();
        if repairs > 0 {
            self.validation_repairs.inc_by(repairs as f64);
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
