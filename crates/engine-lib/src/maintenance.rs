//! Periodic registry maintenance
//!
//! Runs garbage collection of decommissioned nodes, stale flagging and
//! gauge refresh on a fixed interval, and optionally persists a snapshot
//! after each pass.

use crate::engine::{Engine, EngineStats, SweepReport};
use crate::health::{components, HealthRegistry};
use crate::snapshot::SnapshotStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Ingest is reported degraded when more than this share of the samples
/// seen since the previous pass were rejected
const INGEST_REJECTION_RATIO: f64 = 0.5;

/// Fewer samples than this in one interval never degrade ingest
const INGEST_MIN_SAMPLES: u64 = 10;

/// Maintenance loop driving [`Engine::sweep`]
pub struct MaintenanceLoop {
    engine: Arc<Engine>,
    interval: Duration,
    store: Option<Arc<dyn SnapshotStore>>,
    health: HealthRegistry,
    /// (accepted, rejected) totals at the previous pass
    last_totals: (u64, u64),
}

fn totals(stats: &EngineStats) -> (u64, u64) {
    (
        stats.samples_accepted,
        stats.samples_rejected.values().sum(),
    )
}

fn ingest_problem(previous: (u64, u64), current: (u64, u64)) -> Option<String> {
    let accepted = current.0.saturating_sub(previous.0);
    let rejected = current.1.saturating_sub(previous.1);
    let seen = accepted + rejected;
    if seen < INGEST_MIN_SAMPLES {
        return None;
    }
    (rejected as f64 / seen as f64 > INGEST_REJECTION_RATIO)
        .then(|| format!("{} of {} samples rejected since last pass", rejected, seen))
}

fn registry_problem(stats: &EngineStats) -> Option<String> {
    stats
        .capacity
        .filter(|capacity| stats.nodes_tracked >= *capacity)
        .map(|capacity| format!("registry at capacity ({} nodes)", capacity))
}

impl MaintenanceLoop {
    pub fn new(engine: Arc<Engine>, interval: Duration, health: HealthRegistry) -> Self {
        Self {
            engine,
            interval,
            store: None,
            health,
            last_totals: (0, 0),
        }
    }

    /// Persist a snapshot to `store` after every pass and on shutdown
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            persist = self.store.is_some(),
            "Starting maintenance loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down maintenance loop");
                    self.persist().await;
                    break;
                }
            }
        }
    }

    /// One maintenance pass
    pub async fn run_once(&mut self) -> SweepReport {
        let start = Instant::now();
        let report = self.engine.sweep();
        self.health.set_healthy(components::MAINTENANCE).await;

        let stats = self.engine.stats();
        let current = totals(&stats);
        self.health
            .report(components::INGEST, ingest_problem(self.last_totals, current))
            .await;
        self.last_totals = current;
        self.health
            .report(components::REGISTRY, registry_problem(&stats))
            .await;

        debug!(
            collected = report.collected.len(),
            stale = report.stale_total,
            nodes = report.nodes_tracked,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Maintenance pass complete"
        );

        self.persist().await;
        report
    }

    async fn persist(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let snapshot = self.engine.snapshot();

        let result: Result<()> = tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .context("Snapshot task panicked")
            .and_then(|r| r);

        match result {
            Ok(()) => self.health.set_healthy(components::SNAPSHOT_STORE).await,
            Err(e) => {
                warn!(error = %e, "Failed to persist snapshot");
                self.health
                    .set_degraded(components::SNAPSHOT_STORE, format!("{:#}", e))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineSettings;
    use crate::health::ComponentStatus;
    use crate::models::RawSample;
    use crate::snapshot::JsonFileStore;
    use tempfile::tempdir;

    fn sample(node_id: &str) -> RawSample {
        RawSample {
            node_id: node_id.to_string(),
            name: None,
            timestamp: None,
            cpu_load: 0.2,
            memory_used: 1.0,
            memory_total: 4.0,
            network_latency_ms: 10.0,
            network_throughput: 1_000.0,
            heartbeat_success_rate: 1.0,
            container: None,
        }
    }

    #[tokio::test]
    async fn test_run_once_collects_and_persists() {
        let clock = Arc::new(ManualClock::new(0));
        let engine = Arc::new(Engine::new(EngineSettings::default(), clock.clone()).unwrap());
        engine.submit(sample("keep")).unwrap();
        engine.submit(sample("drop")).unwrap();
        engine.decommission("drop").unwrap();
        clock.advance(Duration::from_secs(600));

        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("snapshot.json")));
        let health = HealthRegistry::new();
        health.register_all().await;

        let mut maintenance = MaintenanceLoop::new(engine, Duration::from_secs(1), health.clone())
            .with_store(store.clone());
        let report = maintenance.run_once().await;

        assert_eq!(report.collected, vec!["drop".to_string()]);
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.nodes.len(), 1);
        assert_eq!(saved.nodes[0].node_id, "keep");
        assert_eq!(
            health.status_of(components::SNAPSHOT_STORE).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_failed_persist_degrades_store() {
        let dir = tempdir().unwrap();
        // a directory cannot be replaced by the snapshot file
        let target = dir.path().join("occupied");
        std::fs::create_dir_all(target.join("child")).unwrap();

        let engine =
            Arc::new(Engine::new(EngineSettings::default(), Arc::new(ManualClock::new(0))).unwrap());
        let health = HealthRegistry::new();
        health.register_all().await;

        let mut maintenance = MaintenanceLoop::new(engine, Duration::from_secs(1), health.clone())
            .with_store(Arc::new(JsonFileStore::new(target)));
        maintenance.run_once().await;

        assert_eq!(
            health.status_of(components::SNAPSHOT_STORE).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_full_registry_degrades_registry_component() {
        let mut settings = EngineSettings::default();
        settings.registry.capacity = Some(1);
        let engine = Arc::new(Engine::new(settings, Arc::new(ManualClock::new(0))).unwrap());
        let health = HealthRegistry::new();
        health.register_all().await;
        let mut maintenance =
            MaintenanceLoop::new(Arc::clone(&engine), Duration::from_secs(1), health.clone());

        maintenance.run_once().await;
        assert_eq!(
            health.status_of(components::REGISTRY).await,
            Some(ComponentStatus::Healthy)
        );

        engine.submit(sample("only")).unwrap();
        maintenance.run_once().await;
        assert_eq!(
            health.status_of(components::REGISTRY).await,
            Some(ComponentStatus::Degraded)
        );

    }

    #[tokio::test]
    async fn test_rejection_burst_degrades_ingest_until_next_clean_pass() {
        let engine =
            Arc::new(Engine::new(EngineSettings::default(), Arc::new(ManualClock::new(0))).unwrap());
        let health = HealthRegistry::new();
        health.register_all().await;
        let mut maintenance =
            MaintenanceLoop::new(Arc::clone(&engine), Duration::from_secs(1), health.clone());

        for _ in 0..12 {
            let mut bad = sample("n1");
            bad.cpu_load = -1.0;
            assert!(engine.submit(bad).is_err());
        }
        engine.submit(sample("n1")).unwrap();
        maintenance.run_once().await;
        assert_eq!(
            health.status_of(components::INGEST).await,
            Some(ComponentStatus::Degraded)
        );

        for _ in 0..12 {
            engine.submit(sample("n1")).unwrap();
        }
        maintenance.run_once().await;
        assert_eq!(
            health.status_of(components::INGEST).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[test]
    fn test_ingest_problem_needs_enough_samples() {
        assert!(ingest_problem((0, 0), (0, 5)).is_none());
        assert!(ingest_problem((10, 0), (12, 20)).is_some());
        assert!(ingest_problem((10, 20), (30, 21)).is_none());
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let engine =
            Arc::new(Engine::new(EngineSettings::default(), Arc::new(ManualClock::new(0))).unwrap());
        let (tx, rx) = broadcast::channel(1);
        let maintenance =
            MaintenanceLoop::new(engine, Duration::from_millis(10), HealthRegistry::new());

        let handle = tokio::spawn(maintenance.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
