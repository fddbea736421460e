//! Point-in-time views of the registry
//!
//! A [`Snapshot`] is assembled one record at a time, each copied under its
//! own node lock, so readers never block ingest for the whole registry.
//! Consumers usually want one of the flat views: [`ScoredNodeView`] for the
//! load balancer, [`ContainerNodeView`] for the dashboard.

mod store;

pub use store::{JsonFileStore, SnapshotStore};

use crate::models::{Lifecycle, NodeId, NodeRecord, UtilizationCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered copy of every node record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix epoch milliseconds
    pub taken_at: i64,
    pub nodes: Vec<NodeRecord>,
}

impl Snapshot {
    pub fn scored(&self) -> Vec<ScoredNodeView> {
        self.nodes.iter().map(ScoredNodeView::from).collect()
    }

    pub fn containers(&self) -> Vec<ContainerNodeView> {
        self.nodes
            .iter()
            .map(|record| ContainerNodeView::from_record(record, self.taken_at))
            .collect()
    }

    pub fn count_by_category(&self) -> BTreeMap<UtilizationCategory, usize> {
        let mut counts: BTreeMap<UtilizationCategory, usize> =
            UtilizationCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for record in &self.nodes {
            *counts.entry(record.category).or_default() += 1;
        }
        counts
    }
}

/// Flat score view of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNodeView {
    pub id: NodeId,
    pub name: String,
    pub cpu_score: f64,
    pub memory_score: f64,
    pub network_score: f64,
    pub availability_score: f64,
    pub overall_score: f64,
    pub utilization_category: UtilizationCategory,
}

impl From<&NodeRecord> for ScoredNodeView {
    fn from(record: &NodeRecord) -> Self {
        Self {
            id: record.node_id.clone(),
            name: record.name.clone(),
            cpu_score: record.scores.cpu_score,
            memory_score: record.scores.memory_score,
            network_score: record.scores.network_score,
            availability_score: record.scores.availability_score,
            overall_score: record.scores.overall_score,
            utilization_category: record.category,
        }
    }
}

/// Container-oriented view of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerNodeView {
    pub id: NodeId,
    pub name: String,
    pub image: String,
    pub state: String,
    pub ports: BTreeMap<String, Vec<String>>,
    /// Percent of cpu capacity from the latest sample
    pub cpu_usage: f64,
    /// Percent of total memory from the latest sample
    pub memory_usage: f64,
    pub uptime: String,
}

impl ContainerNodeView {
    pub fn from_record(record: &NodeRecord, now: i64) -> Self {
        let container = record.container.clone().unwrap_or_default();
        let started_at = container.started_at.unwrap_or(record.created_at);
        let state = if container.state.is_empty() {
            lifecycle_state(record.lifecycle).to_string()
        } else {
            container.state
        };

        Self {
            id: record.node_id.clone(),
            name: record.name.clone(),
            image: container.image,
            state,
            ports: container.ports,
            cpu_usage: record.usage.cpu_percent,
            memory_usage: record.usage.memory_percent,
            uptime: format_uptime(now.saturating_sub(started_at)),
        }
    }
}

fn lifecycle_state(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::Init => "created",
        Lifecycle::Active => "running",
        Lifecycle::Sundown => "exited",
    }
}

/// Format milliseconds as `"{h}h {m}m {s}s"`; negative spans count as zero
pub fn format_uptime(elapsed_ms: i64) -> String {
    let duration = chrono::Duration::milliseconds(elapsed_ms.max(0));
    let seconds = duration.num_seconds();
    format!("{}h {}m {}s", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerMeta;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0h 0m 0s");
        assert_eq!(format_uptime(3_723_999), "1h 2m 3s");
        assert_eq!(format_uptime(90_000_000), "25h 0m 0s");
        assert_eq!(format_uptime(-5), "0h 0m 0s");
    }

    #[test]
    fn test_scored_view() {
        let mut record = NodeRecord::new("n1", Some("web-1".into()), 0);
        record.scores.overall_score = 0.42;
        record.category = UtilizationCategory::Mu;
        let view = ScoredNodeView::from(&record);
        assert_eq!(view.id, "n1");
        assert_eq!(view.name, "web-1");
        assert_eq!(view.overall_score, 0.42);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["utilization_category"], "MU");
    }

    #[test]
    fn test_container_view_uses_metadata() {
        let mut record = NodeRecord::new("c1", None, 0);
        record.usage.cpu_percent = 12.5;
        record.container = Some(ContainerMeta {
            image: "nginx:1.25".into(),
            state: "running".into(),
            ports: BTreeMap::from([("80/tcp".to_string(), vec!["0.0.0.0:8080".to_string()])]),
            started_at: Some(1_000),
        });

        let view = ContainerNodeView::from_record(&record, 61_000);
        assert_eq!(view.image, "nginx:1.25");
        assert_eq!(view.state, "running");
        assert_eq!(view.ports["80/tcp"], vec!["0.0.0.0:8080".to_string()]);
        assert_eq!(view.cpu_usage, 12.5);
        assert_eq!(view.uptime, "0h 1m 0s");
    }

    #[test]
    fn test_container_view_falls_back_to_lifecycle() {
        let mut record = NodeRecord::new("n1", None, 0);
        record.lifecycle = Lifecycle::Sundown;
        let view = ContainerNodeView::from_record(&record, 7_200_000);
        assert_eq!(view.state, "exited");
        assert!(view.image.is_empty());
        assert_eq!(view.uptime, "2h 0m 0s");
    }

    #[test]
    fn test_count_by_category_includes_empty_buckets() {
        let mut hu = NodeRecord::new("a", None, 0);
        hu.category = UtilizationCategory::Hu;
        let snapshot = Snapshot {
            taken_at: 0,
            nodes: vec![hu, NodeRecord::new("b", None, 0)],
        };
        let counts = snapshot.count_by_category();
        assert_eq!(counts[&UtilizationCategory::Hu], 1);
        assert_eq!(counts[&UtilizationCategory::Init], 1);
        assert_eq!(counts[&UtilizationCategory::Sundown], 0);
    }
}
