//! Balancer engine - node scoring and utilization classification service
//!
//! Accepts resource samples from collector agents over HTTP, keeps node
//! scores and categories in memory and serves snapshots to consumers.

use anyhow::Result;
use engine_lib::{
    api::{self, AppState},
    health::{components, HealthRegistry},
    maintenance::MaintenanceLoop,
    observability::EngineMetrics,
    snapshot::{JsonFileStore, SnapshotStore},
    Engine,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting balancer-engine");

    // Load configuration
    let config = config::EngineConfig::load()?;
    info!(
        instance = %config.instance,
        api_port = config.api_port,
        maintenance_interval_secs = config.maintenance_interval_secs,
        snapshot_path = ?config.snapshot_path,
        "Engine configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = EngineMetrics::new();
    let engine =
        Arc::new(Engine::with_system_clock(config.engine.clone())?.with_instance(&config.instance));

    // Restore the last persisted snapshot, if any
    let store: Option<Arc<dyn SnapshotStore>> = config
        .snapshot_path
        .clone()
        .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn SnapshotStore>);
    let mut restored = 0;
    if let Some(store) = &store {
        match store.load() {
            Ok(Some(snapshot)) => restored = engine.restore(snapshot),
            Ok(None) => info!(store = %store.describe(), "No snapshot to restore"),
            Err(e) => {
                warn!(error = %e, "Failed to restore snapshot, starting empty");
                health_registry
                    .set_degraded(components::SNAPSHOT_STORE, format!("{:#}", e))
                    .await;
            }
        }
    }
    engine.logger().log_startup(ENGINE_VERSION, restored);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start maintenance loop
    let mut maintenance = MaintenanceLoop::new(
        Arc::clone(&engine),
        config.maintenance_interval(),
        health_registry.clone(),
    );
    if let Some(store) = store {
        maintenance = maintenance.with_store(store);
    }
    let maintenance_handle = tokio::spawn(maintenance.run(shutdown_tx.subscribe()));

    // Create shared application state
    let app_state = Arc::new(AppState::new(
        Arc::clone(&engine),
        health_registry.clone(),
        metrics,
    ));

    // Mark engine as ready after initialization
    health_registry.set_ready(true).await;

    // Start API server
    let mut api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal or an API failure
    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            "SIGINT received"
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => "API server stopped",
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    "API server failed"
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    "API server task panicked"
                }
            }
        }
    };

    engine.logger().log_shutdown(reason);
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Err(e) = maintenance_handle.await {
        warn!(error = %e, "Maintenance loop did not stop cleanly");
    }
    if !api_handle.is_finished() {
        if let Ok(Err(e)) = api_handle.await {
            warn!(error = %e, "API server did not stop cleanly");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
