//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Request lifecycle
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,

    // Routing
    pub routing_decisions: CounterVec,
    pub routing_fallbacks: Counter,

    // Context ranking and cache
    pub context_cache_hits: Counter,
    pub context_cache_misses: Counter,
    pub context_cache_evictions: CounterVec,
    pub context_tokens_selected: Histogram,
    pub semantic_index_fallbacks: Counter,

    // History
    pub summarizations: Counter,
    pub summarization_fallbacks: Counter,
    pub history_tokens_saved: Histogram,

    // Enhancement and streaming
    pub prompts_enhanced: Counter,
    pub stream_flushes: Histogram,

    // Token usage
    pub usage_input_tokens: Histogram,
    pub usage_output_tokens: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let requests_total = register_counter_vec_with_registry!(
            Opts::new("requests_total", "Total requests handled"),
            &["outcome"],
            registry
        )?;

        let request_duration = register_histogram_vec_with_registry!(
            "request_duration_seconds",
            "End-to-end request duration in seconds",
            &["tier"],
            registry
        )?;

        let routing_decisions = register_counter_vec_with_registry!(
            Opts::new("routing_decisions_total", "Routing decisions by tier"),
            &["tier"],
            registry
        )?;

        let routing_fallbacks = register_counter_with_registry!(
            Opts::new(
                "routing_fallbacks_total",
                "Routing decisions where a tier model was unset"
            ),
            registry
        )?;

        let context_cache_hits = register_counter_with_registry!(
            Opts::new("context_cache_hits_total", "Context cache hits"),
            registry
        )?;

        let context_cache_misses = register_counter_with_registry!(
            Opts::new("context_cache_misses_total", "Context cache misses"),
            registry
        )?;

        let context_cache_evictions = register_counter_vec_with_registry!(
            Opts::new(
                "context_cache_evictions_total",
                "Context cache evictions by reason"
            ),
            &["reason"],
            registry
        )?;

        let context_tokens_selected = register_histogram_with_registry!(
            "context_tokens_selected",
            "Approximate tokens of context selected per request",
            registry
        )?;

        let semantic_index_fallbacks = register_counter_with_registry!(
            Opts::new(
                "semantic_index_fallbacks_total",
                "Semantic index failures downgraded to keyword ranking"
            ),
            registry
        )?;

        let summarizations = register_counter_with_registry!(
            Opts::new("summarizations_total", "Conversation summaries synthesized"),
            registry
        )?;

        let summarization_fallbacks = register_counter_with_registry!(
            Opts::new(
                "summarization_fallbacks_total",
                "Summaries produced by the extractive fallback"
            ),
            registry
        )?;

        let history_tokens_saved = register_histogram_with_registry!(
            "history_tokens_saved",
            "Tokens saved by windowing and summarization per request",
            registry
        )?;

        let prompts_enhanced = register_counter_with_registry!(
            Opts::new("prompts_enhanced_total", "Prompts rewritten by the enhancer"),
            registry
        )?;

        let stream_flushes = register_histogram_with_registry!(
            "stream_flushes",
            "Output buffer flushes per request",
            registry
        )?;

        let usage_input_tokens = register_histogram_with_registry!(
            "usage_input_tokens",
            "Input tokens reported per generation",
            registry
        )?;

        let usage_output_tokens = register_histogram_with_registry!(
            "usage_output_tokens",
            "Output tokens reported per generation",
            registry
        )?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            routing_decisions,
            routing_fallbacks,
            context_cache_hits,
            context_cache_misses,
            context_cache_evictions,
            context_tokens_selected,
            semantic_index_fallbacks,
            summarizations,
            summarization_fallbacks,
            history_tokens_saved,
            prompts_enhanced,
            stream_flushes,
            usage_input_tokens,
            usage_output_tokens,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome of one request
    pub fn record_request(&self, outcome: &str, tier: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[outcome]).inc();
        self.request_duration
            .with_label_values(&[tier])
            .observe(duration_secs);
    }

    /// Record a routing decision
    pub fn record_routing(&self, tier: &str, fallback_used: bool) {
        self.routing_decisions.with_label_values(&[tier]).inc();
        if fallback_used {
            self.routing_fallbacks.inc();
        }
    }

    /// Record a context cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.context_cache_hits.inc();
        } else {
            self.context_cache_misses.inc();
        }
    }

    /// Record a context cache eviction
    pub fn record_cache_eviction(&self, reason: &str) {
        self.context_cache_evictions
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a generation's token usage
    pub fn record_usage(&self, input_tokens: usize, output_tokens: usize) {
        self.usage_input_tokens.observe(input_tokens as f64);
        self.usage_output_tokens.observe(output_tokens as f64);
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
