//! Scoring engine facade
//!
//! Runs the ingest → score → classify pipeline against the registry and
//! serves reads. Everything that needs the current time goes through the
//! injected [`Clock`].

use crate::classifier::{Classifier, TransitionLog};
use crate::clock::{duration_ms, Clock, SystemClock};
use crate::config::EngineSettings;
use crate::error::{ConfigError, IngestError, RegistryError};
use crate::ingest::{validate_sample, BatchOutcome, IngestReceipt};
use crate::models::{
    ContainerMeta, Lifecycle, NodeId, NodeRecord, RawSample, Sample, ScoreVector, Transition,
    UtilizationCategory,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::registry::NodeRegistry;
use crate::scoring::ScoreCalculator;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Request to pre-create a node before it reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterNode {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMeta>,
}

/// Ingest and registry counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub nodes_tracked: usize,
    pub capacity: Option<usize>,
    pub samples_accepted: u64,
    /// Rejections by error code
    pub samples_rejected: BTreeMap<String, u64>,
    pub transitions: u64,
    pub nodes_collected: u64,
    pub stale_nodes: usize,
    pub nodes_by_category: BTreeMap<UtilizationCategory, usize>,
}

/// Result of one maintenance pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub collected: Vec<NodeId>,
    pub newly_stale: Vec<NodeId>,
    pub stale_total: usize,
    pub nodes_tracked: usize,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected_invalid: AtomicU64,
    rejected_stale: AtomicU64,
    rejected_full: AtomicU64,
    transitions: AtomicU64,
    collected: AtomicU64,
}

impl Counters {
    fn rejected(&self, err: &IngestError) -> &AtomicU64 {
        match err {
            IngestError::InvalidValue { .. } => &self.rejected_invalid,
            IngestError::StaleSample { .. } => &self.rejected_stale,
            IngestError::RegistryFull { .. } => &self.rejected_full,
        }
    }
}

/// The scoring and classification engine
pub struct Engine {
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    registry: NodeRegistry,
    calculator: ScoreCalculator,
    classifier: Classifier,
    audit: TransitionLog,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    counters: Counters,
}

impl Engine {
    /// Build an engine from validated settings
    pub fn new(settings: EngineSettings, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self {
            registry: NodeRegistry::new(settings.window.clone(), settings.registry.capacity),
            calculator: ScoreCalculator::new(settings.scoring.clone()),
            classifier: Classifier::new(settings.classifier),
            audit: TransitionLog::new(settings.registry.audit_log_size),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("balancer-engine"),
            counters: Counters::default(),
            settings,
            clock,
        })
    }

    pub fn with_system_clock(settings: EngineSettings) -> Result<Self, ConfigError> {
        Self::new(settings, Arc::new(SystemClock))
    }

    /// Name this engine instance in structured log events
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.logger = StructuredLogger::new(instance);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Validate and apply one sample
    pub fn submit(&self, raw: RawSample) -> Result<IngestReceipt, IngestError> {
        let start = Instant::now();
        let result = self.ingest(&raw);
        self.metrics
            .observe_ingest_latency(start.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_samples_accepted();
                if let Some(transition) = &receipt.transition {
                    self.note_transition(transition);
                }
            }
            Err(err) => {
                self.counters.rejected(err).fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_samples_rejected(err.code());
                self.logger
                    .log_rejection(&raw.node_id, err.code(), &err.to_string());
            }
        }
        result
    }

    /// Apply samples in order; one rejection does not stop the rest
    pub fn submit_batch(&self, samples: Vec<RawSample>) -> Vec<BatchOutcome> {
        samples
            .into_iter()
            .map(|raw| {
                let node_id = raw.node_id.clone();
                match self.submit(raw) {
                    Ok(receipt) => BatchOutcome::Accepted(receipt),
                    Err(err) => BatchOutcome::rejected(node_id, &err),
                }
            })
            .collect()
    }

    fn ingest(&self, raw: &RawSample) -> Result<IngestReceipt, IngestError> {
        validate_sample(raw)?;

        let now = self.clock.now_ms();
        let timestamp = raw.timestamp.unwrap_or(now);
        let sample = Sample::from_raw(raw, timestamp);
        let node_id = &raw.node_id;

        let (mut receipt, created) =
            self.registry
                .upsert(node_id, raw.name.as_deref(), now, |slot| {
                    if let Some(last_accepted) = slot.record.last_sample_at {
                        if timestamp < last_accepted {
                            return Err(IngestError::StaleSample {
                                node_id: node_id.clone(),
                                timestamp,
                                last_accepted,
                            });
                        }
                    }

                    slot.window.push(sample);
                    let scores = self.calculator.compute(&slot.window);
                    let current = slot.record.category;
                    let transition =
                        self.classifier
                            .classify(node_id, current, scores.overall_score, timestamp);

                    let record = &mut slot.record;
                    record.scores = scores;
                    if let Some(t) = &transition {
                        record.category = t.to;
                        // logged under the node lock so per-node order holds
                        self.audit.record(t.clone());
                    }
                    if record.lifecycle == Lifecycle::Init {
                        record.lifecycle = Lifecycle::Active;
                    }
                    record.stale = false;
                    record.last_updated = now;
                    record.last_sample_at = Some(timestamp);
                    record.sample_count += 1;
                    record.usage = self.calculator.usage(&sample);
                    if let Some(name) = &raw.name {
                        record.name = name.clone();
                    }
                    if let Some(container) = &raw.container {
                        record.container = Some(container.clone());
                    }

                    Ok(IngestReceipt {
                        node_id: node_id.clone(),
                        timestamp,
                        scores,
                        category: record.category,
                        created: false,
                        transition,
                    })
                })?;

        receipt.created = created;
        debug!(
            node_id = %node_id,
            overall_score = receipt.scores.overall_score,
            category = %receipt.category,
            "Sample accepted"
        );
        Ok(receipt)
    }

    /// Counters, metrics and log line for a transition already in the audit log
    fn note_transition(&self, transition: &Transition) {
        self.counters.transitions.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_transition(transition.from, transition.to);
        self.logger.log_transition(transition);
    }

    /// Recompute and store a node's scores from its current window
    pub fn recompute(&self, node_id: &str) -> Result<ScoreVector, RegistryError> {
        self.registry
            .with_node(node_id, |slot| {
                let scores = self.calculator.compute(&slot.window);
                slot.record.scores = scores;
                scores
            })
            .ok_or_else(|| RegistryError::UnknownNode(node_id.to_string()))
    }

    /// Pre-create a node in INIT, or refresh its name and container metadata
    pub fn register(&self, request: RegisterNode) -> Result<(NodeRecord, bool), IngestError> {
        if request.node_id.is_empty() {
            return Err(IngestError::invalid("node_id", "must not be empty"));
        }
        let now = self.clock.now_ms();
        let (record, created) = self.registry.register(
            &request.node_id,
            request.name.as_deref(),
            request.container,
            now,
        )?;
        self.logger
            .log_registration(&record.node_id, &record.name, created);
        Ok((record, created))
    }

    /// Move a node to SUNDOWN. Returns the transition, or None if the node
    /// was already decommissioned.
    pub fn decommission(&self, node_id: &str) -> Result<Option<Transition>, RegistryError> {
        let now = self.clock.now_ms();
        let mut transition = None;
        let previous = self.registry.mark_sundown(node_id, now, |previous| {
            transition = self
                .classifier
                .decommission(&node_id.to_string(), previous, now);
            if let Some(t) = &transition {
                self.audit.record(t.clone());
            }
        })?;
        if let Some(t) = &transition {
            self.logger.log_decommission(node_id, previous);
            self.note_transition(t);
        }
        Ok(transition)
    }

    pub fn get(&self, node_id: &str) -> Option<NodeRecord> {
        self.registry.get(node_id)
    }

    /// Records ordered by node id, optionally restricted to one category
    pub fn list(&self, category: Option<UtilizationCategory>) -> Vec<NodeRecord> {
        let mut records = self.registry.list();
        if let Some(category) = category {
            records.retain(|r| r.category == category);
        }
        records
    }

    pub fn snapshot(&self) -> Snapshot {
        let start = Instant::now();
        let snapshot = Snapshot {
            taken_at: self.clock.now_ms(),
            nodes: self.registry.list(),
        };
        self.metrics
            .observe_snapshot_latency(start.elapsed().as_secs_f64());
        snapshot
    }

    /// Most recent transitions, oldest first
    pub fn transitions(&self, node_id: Option<&str>, limit: usize) -> Vec<Transition> {
        self.audit.recent(node_id, limit)
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        let c = &self.counters;
        let samples_rejected = BTreeMap::from([
            ("invalid_value".to_string(), c.rejected_invalid.load(Ordering::Relaxed)),
            ("stale_sample".to_string(), c.rejected_stale.load(Ordering::Relaxed)),
            ("registry_full".to_string(), c.rejected_full.load(Ordering::Relaxed)),
        ]);

        EngineStats {
            nodes_tracked: snapshot.nodes.len(),
            capacity: self.registry.capacity(),
            samples_accepted: c.accepted.load(Ordering::Relaxed),
            samples_rejected,
            transitions: c.transitions.load(Ordering::Relaxed),
            nodes_collected: c.collected.load(Ordering::Relaxed),
            stale_nodes: snapshot.nodes.iter().filter(|r| r.stale).count(),
            nodes_by_category: snapshot.count_by_category(),
        }
    }

    /// Garbage-collect expired SUNDOWN nodes, refresh stale flags and gauges
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let registry_settings = &self.settings.registry;

        let collected = self
            .registry
            .gc_expired(now, duration_ms(registry_settings.sundown_retention()));
        if !collected.is_empty() {
            self.counters
                .collected
                .fetch_add(collected.len() as u64, Ordering::Relaxed);
            self.metrics.add_nodes_collected(collected.len() as u64);
            self.logger.log_gc(&collected);
        }

        let stale = self
            .registry
            .flag_stale(now, duration_ms(registry_settings.silence_timeout()));
        self.logger.log_stale(&stale.newly_stale, &stale.recovered);

        let snapshot = self.snapshot();
        self.metrics.set_node_gauges(
            snapshot.nodes.len(),
            stale.stale_total,
            &snapshot.count_by_category(),
        );

        SweepReport {
            collected,
            newly_stale: stale.newly_stale,
            stale_total: stale.stale_total,
            nodes_tracked: snapshot.nodes.len(),
        }
    }

    /// Reload records from a persisted snapshot
    pub fn restore(&self, snapshot: Snapshot) -> usize {
        self.registry.restore(snapshot.nodes)
    }
}
