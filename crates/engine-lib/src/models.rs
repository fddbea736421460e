//! Core data models for the scoring engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque node identifier, stable across a node's lifetime
pub type NodeId = String;

/// Raw resource sample pushed by a collector agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub node_id: NodeId,
    /// Display name; defaults to the node id on first sight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unix epoch milliseconds; assigned by the engine when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Load in the same unit as the configured cpu capacity (e.g. cores)
    pub cpu_load: f64,
    pub memory_used: f64,
    pub memory_total: f64,
    pub network_latency_ms: f64,
    /// Bytes per second
    pub network_throughput: f64,
    /// Heartbeat success ratio in [0, 1]
    pub heartbeat_success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMeta>,
}

/// Accepted sample with a concrete timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub cpu_load: f64,
    pub memory_used: f64,
    pub memory_total: f64,
    pub network_latency_ms: f64,
    pub network_throughput: f64,
    pub heartbeat_success_rate: f64,
}

impl Sample {
    pub fn from_raw(raw: &RawSample, timestamp: i64) -> Self {
        Self {
            timestamp,
            cpu_load: raw.cpu_load,
            memory_used: raw.memory_used,
            memory_total: raw.memory_total,
            network_latency_ms: raw.network_latency_ms,
            network_throughput: raw.network_throughput,
            heartbeat_success_rate: raw.heartbeat_success_rate,
        }
    }

    /// Fraction of memory in use, in [0, 1] for validated samples
    pub fn memory_ratio(&self) -> f64 {
        if self.memory_total <= 0.0 {
            return 0.0;
        }
        self.memory_used / self.memory_total
    }
}

/// Normalized per-dimension scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    pub cpu_score: f64,
    pub memory_score: f64,
    pub network_score: f64,
    pub availability_score: f64,
    pub overall_score: f64,
}

impl ScoreVector {
    /// Scores carried by a node that has not reported yet
    pub fn initial() -> Self {
        Self {
            cpu_score: 1.0,
            memory_score: 1.0,
            network_score: 1.0,
            availability_score: 1.0,
            overall_score: 1.0,
        }
    }

    pub fn dimensions(&self) -> [f64; 4] {
        [
            self.cpu_score,
            self.memory_score,
            self.network_score,
            self.availability_score,
        ]
    }
}

impl Default for ScoreVector {
    fn default() -> Self {
        Self::initial()
    }
}

/// Coarse-grained load classification of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UtilizationCategory {
    Init,
    Lu,
    Mu,
    Hu,
    Sundown,
}

impl UtilizationCategory {
    pub const ALL: [UtilizationCategory; 5] = [
        UtilizationCategory::Init,
        UtilizationCategory::Lu,
        UtilizationCategory::Mu,
        UtilizationCategory::Hu,
        UtilizationCategory::Sundown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UtilizationCategory::Init => "INIT",
            UtilizationCategory::Lu => "LU",
            UtilizationCategory::Mu => "MU",
            UtilizationCategory::Hu => "HU",
            UtilizationCategory::Sundown => "SUNDOWN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UtilizationCategory::Sundown)
    }
}

impl fmt::Display for UtilizationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UtilizationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INIT" => Ok(UtilizationCategory::Init),
            "LU" => Ok(UtilizationCategory::Lu),
            "MU" => Ok(UtilizationCategory::Mu),
            "HU" => Ok(UtilizationCategory::Hu),
            "SUNDOWN" => Ok(UtilizationCategory::Sundown),
            other => Err(format!("unknown utilization category: {}", other)),
        }
    }
}

/// Lifecycle of a record inside the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Registered, no sample scored yet
    Init,
    Active,
    /// Decommissioned; removed once the retention window elapses
    Sundown,
}

/// Container lifecycle metadata carried alongside container-backed nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMeta {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    /// container port -> published "host_ip:host_port" bindings
    #[serde(default)]
    pub ports: BTreeMap<String, Vec<String>>,
    /// Unix epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
}

/// Unnormalized usage of the latest accepted sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Percent of configured cpu capacity; may exceed 100
    pub cpu_percent: f64,
    /// Percent of total memory
    pub memory_percent: f64,
}

/// Authoritative view of one node, owned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub name: String,
    pub scores: ScoreVector,
    pub category: UtilizationCategory,
    pub lifecycle: Lifecycle,
    /// Set when no sample arrived within the silence timeout
    #[serde(default)]
    pub stale: bool,
    pub created_at: i64,
    pub last_updated: i64,
    #[serde(default)]
    pub last_sample_at: Option<i64>,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub usage: ResourceUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMeta>,
}

impl NodeRecord {
    /// Fresh record in INIT
    pub fn new(node_id: impl Into<NodeId>, name: Option<String>, now: i64) -> Self {
        let node_id = node_id.into();
        Self {
            name: name.unwrap_or_else(|| node_id.clone()),
            node_id,
            scores: ScoreVector::initial(),
            category: UtilizationCategory::Init,
            lifecycle: Lifecycle::Init,
            stale: false,
            created_at: now,
            last_updated: now,
            last_sample_at: None,
            sample_count: 0,
            usage: ResourceUsage::default(),
            container: None,
        }
    }
}

/// One category change, kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub node_id: NodeId,
    pub from: UtilizationCategory,
    pub to: UtilizationCategory,
    /// Overall score that triggered the change; absent for decommission
    pub triggering_score: Option<f64>,
    pub timestamp: i64,
}
