//! Observability infrastructure for the scoring engine
//!
//! Provides:
//! - Prometheus metrics (ingest counters and latency, node gauges, transitions)
//! - Structured JSON logging with tracing

use crate::models::{Transition, UtilizationCategory};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Global metrics instance (registered once). `None` if registration failed.
static GLOBAL_METRICS: OnceLock<Option<EngineMetricsInner>> = OnceLock::new();

struct EngineMetricsInner {
    samples_accepted: IntCounter,
    samples_rejected: IntCounterVec,
    ingest_latency_seconds: Histogram,
    snapshot_latency_seconds: Histogram,
    nodes_tracked: IntGauge,
    nodes_by_category: IntGaugeVec,
    nodes_stale: IntGauge,
    transitions: IntCounterVec,
    nodes_collected: IntCounter,
}

impl EngineMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            samples_accepted: register_int_counter!(
                "balancer_samples_accepted_total",
                "Total number of samples accepted at ingest"
            )?,

            samples_rejected: register_int_counter_vec!(
                "balancer_samples_rejected_total",
                "Total number of samples rejected at ingest, by reason",
                &["reason"]
            )?,

            ingest_latency_seconds: register_histogram!(
                "balancer_ingest_latency_seconds",
                "Time spent validating, scoring and classifying one sample",
                LATENCY_BUCKETS.to_vec()
            )?,

            snapshot_latency_seconds: register_histogram!(
                "balancer_snapshot_latency_seconds",
                "Time spent assembling a registry snapshot",
                LATENCY_BUCKETS.to_vec()
            )?,

            nodes_tracked: register_int_gauge!(
                "balancer_nodes_tracked",
                "Number of nodes currently held in the registry"
            )?,

            nodes_by_category: register_int_gauge_vec!(
                "balancer_nodes_by_category",
                "Number of nodes per utilization category",
                &["category"]
            )?,

            nodes_stale: register_int_gauge!(
                "balancer_nodes_stale",
                "Number of nodes that stopped reporting"
            )?,

            transitions: register_int_counter_vec!(
                "balancer_category_transitions_total",
                "Total number of utilization category transitions",
                &["from", "to"]
            )?,

            nodes_collected: register_int_counter!(
                "balancer_nodes_collected_total",
                "Total number of decommissioned nodes removed after retention"
            )?,
        })
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match EngineMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register engine metrics, metrics disabled");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&EngineMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn inc_samples_accepted(&self) {
        if let Some(m) = self.inner() {
            m.samples_accepted.inc();
        }
    }

    pub fn inc_samples_rejected(&self, reason: &str) {
        if let Some(m) = self.inner() {
            m.samples_rejected.with_label_values(&[reason]).inc();
        }
    }

    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.ingest_latency_seconds.observe(duration_secs);
        }
    }

    pub fn observe_snapshot_latency(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.snapshot_latency_seconds.observe(duration_secs);
        }
    }

    pub fn inc_transition(&self, from: UtilizationCategory, to: UtilizationCategory) {
        if let Some(m) = self.inner() {
            m.transitions
                .with_label_values(&[from.as_str(), to.as_str()])
                .inc();
        }
    }

    pub fn add_nodes_collected(&self, count: u64) {
        if let Some(m) = self.inner() {
            m.nodes_collected.inc_by(count);
        }
    }

    /// Refresh registry gauges from a category histogram
    pub fn set_node_gauges(
        &self,
        tracked: usize,
        stale: usize,
        by_category: &BTreeMap<UtilizationCategory, usize>,
    ) {
        if let Some(m) = self.inner() {
            m.nodes_tracked.set(tracked as i64);
            m.nodes_stale.set(stale as i64);
            for category in UtilizationCategory::ALL {
                let count = by_category.get(&category).copied().unwrap_or(0);
                m.nodes_by_category
                    .with_label_values(&[category.as_str()])
                    .set(count as i64);
            }
        }
    }
}

/// Structured logger for engine events
///
/// Provides consistent JSON-formatted logging for transitions, rejections
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a category transition
    pub fn log_transition(&self, transition: &Transition) {
        info!(
            event = "category_transition",
            instance = %self.instance,
            node_id = %transition.node_id,
            from = %transition.from,
            to = %transition.to,
            triggering_score = ?transition.triggering_score,
            timestamp = transition.timestamp,
            "Utilization category changed"
        );
    }

    /// Log a rejected sample
    pub fn log_rejection(&self, node_id: &str, code: &str, error: &str) {
        warn!(
            event = "sample_rejected",
            instance = %self.instance,
            node_id = %node_id,
            code = %code,
            error = %error,
            "Sample rejected"
        );
    }

    /// Log a node registration
    pub fn log_registration(&self, node_id: &str, name: &str, created: bool) {
        info!(
            event = "node_registered",
            instance = %self.instance,
            node_id = %node_id,
            name = %name,
            created = created,
            "Node registered"
        );
    }

    /// Log a decommission request
    pub fn log_decommission(&self, node_id: &str, previous: UtilizationCategory) {
        info!(
            event = "node_decommissioned",
            instance = %self.instance,
            node_id = %node_id,
            previous = %previous,
            "Node moved to SUNDOWN"
        );
    }

    /// Log nodes removed by retention
    pub fn log_gc(&self, removed: &[String]) {
        if removed.is_empty() {
            return;
        }
        info!(
            event = "nodes_collected",
            instance = %self.instance,
            count = removed.len(),
            nodes = ?removed,
            "Removed decommissioned nodes past retention"
        );
    }

    /// Log nodes whose stale flag changed
    pub fn log_stale(&self, newly_stale: &[String], recovered: &[String]) {
        if !newly_stale.is_empty() {
            warn!(
                event = "nodes_stale",
                instance = %self.instance,
                nodes = ?newly_stale,
                "Nodes stopped reporting"
            );
        }
        if !recovered.is_empty() {
            debug!(
                event = "nodes_recovered",
                instance = %self.instance,
                nodes = ?recovered,
                "Nodes resumed reporting"
            );
        }
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str, restored_nodes: usize) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            engine_version = %version,
            restored_nodes = restored_nodes,
            "Scoring engine started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Scoring engine shutting down"
        );
    }
}
