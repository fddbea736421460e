//! Error types for the scoring engine

use crate::models::NodeId;
use thiserror::Error;

/// Reasons a sample is rejected at ingest. None of them change engine state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("stale sample for node {node_id}: timestamp {timestamp} is older than last accepted {last_accepted}")]
    StaleSample {
        node_id: NodeId,
        timestamp: i64,
        last_accepted: i64,
    },

    #[error("registry is full ({capacity} nodes)")]
    RegistryFull { capacity: usize },
}

impl IngestError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        IngestError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Stable label used for metrics and API error codes
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidValue { .. } => "invalid_value",
            IngestError::StaleSample { .. } => "stale_sample",
            IngestError::RegistryFull { .. } => "registry_full",
        }
    }
}

/// Errors from registry lookups and lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::UnknownNode(_) => "unknown_node",
        }
    }
}

/// Invalid engine settings, reported at startup
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
