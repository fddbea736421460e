//! Sample ingest
//!
//! Validation of raw samples pushed by collector agents and the bounded
//! per-node window they are appended to. Ordering and registry effects are
//! handled by [`crate::engine::Engine::submit`].

mod validate;
mod window;

pub use validate::validate_sample;
pub use window::SampleWindow;

use crate::error::IngestError;
use crate::models::{NodeId, ScoreVector, Transition, UtilizationCategory};
use serde::{Deserialize, Serialize};

/// Acknowledgement for an accepted sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub node_id: NodeId,
    pub timestamp: i64,
    pub scores: ScoreVector,
    pub category: UtilizationCategory,
    /// True when this sample created the node
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

/// Per-sample result of a batch submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Accepted(IngestReceipt),
    Rejected {
        node_id: NodeId,
        code: String,
        error: String,
    },
}

impl BatchOutcome {
    pub fn rejected(node_id: impl Into<NodeId>, err: &IngestError) -> Self {
        BatchOutcome::Rejected {
            node_id: node_id.into(),
            code: err.code().to_string(),
            error: err.to_string(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, BatchOutcome::Accepted(_))
    }
}
