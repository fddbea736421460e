//! Node scoring and utilization classification engine
//!
//! This crate provides:
//! - Sample ingest with validation and per-node ordering
//! - Score calculation over bounded sample windows
//! - Hysteresis classification into INIT/LU/MU/HU/SUNDOWN
//! - A concurrent node registry with snapshot views and persistence
//! - HTTP API, health checks and observability

pub mod api;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod ingest;
pub mod maintenance;
pub mod models;
pub mod observability;
pub mod registry;
pub mod scoring;
pub mod snapshot;

pub use engine::{Engine, EngineStats, RegisterNode, SweepReport};
pub use error::{ConfigError, IngestError, RegistryError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
