//! Node registry
//!
//! Authoritative in-memory table of nodes. Each node lives behind its own
//! mutex; the map's shard locks are only held long enough to clone a node
//! handle, so work on different nodes never serializes.

use crate::config::WindowSettings;
use crate::error::{IngestError, RegistryError};
use crate::ingest::SampleWindow;
use crate::models::{ContainerMeta, Lifecycle, NodeId, NodeRecord, UtilizationCategory};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Mutable per-node state guarded by the node lock
#[derive(Debug)]
pub struct NodeSlot {
    pub record: NodeRecord,
    pub window: SampleWindow,
    /// Set when the slot is dropped from the map; holders of a stale handle
    /// must look the node up again
    removed: bool,
}

impl NodeSlot {
    fn new(record: NodeRecord, window: &WindowSettings) -> Self {
        Self {
            record,
            window: SampleWindow::new(window),
            removed: false,
        }
    }
}

type SlotHandle = Arc<Mutex<NodeSlot>>;

/// Outcome of a stale-flag sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StaleSweep {
    /// Nodes that became stale during this sweep
    pub newly_stale: Vec<NodeId>,
    /// Nodes that reported again and lost the flag
    pub recovered: Vec<NodeId>,
    /// Stale nodes after the sweep
    pub stale_total: usize,
}

/// Registry of tracked nodes
pub struct NodeRegistry {
    nodes: DashMap<NodeId, SlotHandle>,
    window: WindowSettings,
    capacity: Option<usize>,
    count: AtomicUsize,
}

fn lock(slot: &Mutex<NodeSlot>) -> MutexGuard<'_, NodeSlot> {
    // A poisoned slot still holds plain data; keep serving it
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NodeRegistry {
    pub fn new(window: WindowSettings, capacity: Option<usize>) -> Self {
        Self {
            nodes: DashMap::new(),
            window,
            capacity,
            count: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    fn handle(&self, node_id: &str) -> Option<SlotHandle> {
        self.nodes.get(node_id).map(|r| Arc::clone(r.value()))
    }

    fn handles(&self) -> Vec<SlotHandle> {
        self.nodes.iter().map(|r| Arc::clone(r.value())).collect()
    }

    fn reserve(&self) -> Result<(), IngestError> {
        match self.capacity {
            None => {
                self.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(capacity) => self
                .count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < capacity).then_some(n + 1)
                })
                .map(|_| ())
                .map_err(|_| IngestError::RegistryFull { capacity }),
        }
    }

    fn release(&self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }

    fn get_or_insert(
        &self,
        node_id: &str,
        name: Option<&str>,
        now: i64,
    ) -> Result<(SlotHandle, bool), IngestError> {
        if let Some(slot) = self.handle(node_id) {
            return Ok((slot, false));
        }
        match self.nodes.entry(node_id.to_string()) {
            Entry::Occupied(e) => Ok((Arc::clone(e.get()), false)),
            Entry::Vacant(e) => {
                self.reserve()?;
                let record = NodeRecord::new(node_id, name.map(str::to_string), now);
                let slot = Arc::new(Mutex::new(NodeSlot::new(record, &self.window)));
                e.insert(Arc::clone(&slot));
                debug!(node_id = %node_id, "Node created");
                Ok((slot, true))
            }
        }
    }

    /// Apply `apply` to a node under its lock, creating an INIT record first
    /// if the node is unknown. Returns the closure's value and whether the
    /// node was created. A node created for a failed `apply` is dropped again.
    pub fn upsert<T>(
        &self,
        node_id: &str,
        name: Option<&str>,
        now: i64,
        apply: impl FnOnce(&mut NodeSlot) -> Result<T, IngestError>,
    ) -> Result<(T, bool), IngestError> {
        loop {
            let (slot, created) = self.get_or_insert(node_id, name, now)?;
            let mut guard = lock(&slot);
            if guard.removed {
                continue;
            }
            return match apply(&mut guard) {
                Ok(value) => Ok((value, created)),
                Err(err) => {
                    if created && guard.record.sample_count == 0 {
                        guard.removed = true;
                        drop(guard);
                        if self
                            .nodes
                            .remove_if(node_id, |_, s| Arc::ptr_eq(s, &slot))
                            .is_some()
                        {
                            self.release();
                        }
                    }
                    Err(err)
                }
            };
        }
    }

    /// Run `f` on an existing node under its lock
    pub fn with_node<T>(&self, node_id: &str, f: impl FnOnce(&mut NodeSlot) -> T) -> Option<T> {
        let slot = self.handle(node_id)?;
        let mut guard = lock(&slot);
        if guard.removed {
            return None;
        }
        Some(f(&mut guard))
    }

    pub fn get(&self, node_id: &str) -> Option<NodeRecord> {
        self.with_node(node_id, |slot| slot.record.clone())
    }

    /// Copy of every record, ordered by node id. Each record is copied
    /// under its own lock.
    pub fn list(&self) -> Vec<NodeRecord> {
        let mut records: Vec<NodeRecord> = self
            .handles()
            .iter()
            .filter_map(|slot| {
                let guard = lock(slot);
                (!guard.removed).then(|| guard.record.clone())
            })
            .collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    /// Pre-create an INIT record, or refresh name and container metadata of
    /// an existing node. Returns the record and whether it was created.
    pub fn register(
        &self,
        node_id: &str,
        name: Option<&str>,
        container: Option<ContainerMeta>,
        now: i64,
    ) -> Result<(NodeRecord, bool), IngestError> {
        self.upsert(node_id, name, now, |slot| {
            if let Some(name) = name {
                slot.record.name = name.to_string();
            }
            if container.is_some() {
                slot.record.container = container;
            }
            Ok(slot.record.clone())
        })
    }

    /// Move a node to SUNDOWN, returning its previous category. Already
    /// decommissioned nodes are left untouched. `on_change` runs under the
    /// node lock with the previous category when the node actually moves.
    pub fn mark_sundown(
        &self,
        node_id: &str,
        now: i64,
        on_change: impl FnOnce(UtilizationCategory),
    ) -> Result<UtilizationCategory, RegistryError> {
        self.with_node(node_id, |slot| {
            let previous = slot.record.category;
            if !previous.is_terminal() {
                on_change(previous);
                slot.record.category = UtilizationCategory::Sundown;
                slot.record.lifecycle = Lifecycle::Sundown;
                slot.record.stale = false;
                slot.record.last_updated = now;
            }
            previous
        })
        .ok_or_else(|| RegistryError::UnknownNode(node_id.to_string()))
    }

    /// Remove SUNDOWN nodes whose last update is at least `retention_ms` old
    pub fn gc_expired(&self, now: i64, retention_ms: i64) -> Vec<NodeId> {
        let expired = |record: &NodeRecord| {
            record.category == UtilizationCategory::Sundown
                && now.saturating_sub(record.last_updated) >= retention_ms
        };

        let candidates: Vec<NodeId> = self
            .nodes
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|(_, slot)| expired(&lock(slot).record))
            .map(|(id, _)| id)
            .collect();

        let mut removed = Vec::new();
        for node_id in candidates {
            // Re-check under the node lock; a sample may have arrived since
            let gone = self.nodes.remove_if(&node_id, |_, slot| {
                let mut guard = lock(slot);
                if expired(&guard.record) {
                    guard.removed = true;
                    true
                } else {
                    false
                }
            });
            if gone.is_some() {
                self.release();
                removed.push(node_id);
            }
        }
        removed
    }

    /// Flag nodes that have not reported for `timeout_ms` (measured from
    /// their last sample, or creation if they never reported). SUNDOWN nodes
    /// are never flagged.
    pub fn flag_stale(&self, now: i64, timeout_ms: i64) -> StaleSweep {
        let mut sweep = StaleSweep::default();
        for slot in self.handles() {
            let mut guard = lock(&slot);
            if guard.removed {
                continue;
            }
            let record = &mut guard.record;
            let silent_since = record.last_sample_at.unwrap_or(record.created_at);
            let stale = record.category != UtilizationCategory::Sundown
                && now.saturating_sub(silent_since) >= timeout_ms;

            if stale && !record.stale {
                sweep.newly_stale.push(record.node_id.clone());
            } else if !stale && record.stale {
                sweep.recovered.push(record.node_id.clone());
            }
            record.stale = stale;
            if stale {
                sweep.stale_total += 1;
            }
        }
        sweep.newly_stale.sort();
        sweep.recovered.sort();
        sweep
    }

    /// Reload persisted records. Windows start empty; existing nodes are
    /// replaced. Records beyond the capacity are skipped.
    pub fn restore(&self, records: Vec<NodeRecord>) -> usize {
        let mut restored = 0;
        for record in records {
            if record.node_id.is_empty() {
                continue;
            }
            let node_id = record.node_id.clone();
            match self.nodes.entry(node_id) {
                Entry::Occupied(e) => {
                    let mut guard = lock(e.get());
                    guard.record = record;
                    guard.window = SampleWindow::new(&self.window);
                    restored += 1;
                }
                Entry::Vacant(e) => {
                    if self.reserve().is_err() {
                        continue;
                    }
                    e.insert(Arc::new(Mutex::new(NodeSlot::new(record, &self.window))));
                    restored += 1;
                }
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;

    fn registry(capacity: Option<usize>) -> NodeRegistry {
        NodeRegistry::new(WindowSettings::default(), capacity)
    }

    fn touch(registry: &NodeRegistry, node_id: &str, now: i64) -> bool {
        registry
            .upsert(node_id, None, now, |slot| {
                slot.record.sample_count += 1;
                slot.record.last_sample_at = Some(now);
                slot.record.last_updated = now;
                Ok(())
            })
            .map(|(_, created)| created)
            .unwrap()
    }

    #[test]
    fn test_upsert_creates_init_record() {
        let registry = registry(None);
        assert!(touch(&registry, "n1", 10));
        assert!(!touch(&registry, "n1", 20));

        let record = registry.get("n1").unwrap();
        assert_eq!(record.category, UtilizationCategory::Init);
        assert_eq!(record.created_at, 10);
        assert_eq!(record.sample_count, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let registry = registry(Some(2));
        touch(&registry, "a", 0);
        touch(&registry, "b", 0);
        let err = registry.upsert("c", None, 0, |_| Ok(())).unwrap_err();
        assert_eq!(err, IngestError::RegistryFull { capacity: 2 });
        // existing nodes still accept updates
        assert!(!touch(&registry, "a", 1));
        assert!(!registry.contains("c"));
    }

    #[test]
    fn test_failed_apply_does_not_leave_new_node() {
        let registry = registry(Some(1));
        let result: Result<((), bool), _> = registry.upsert("n1", None, 0, |_| {
            Err(IngestError::invalid("cpu_load", "test"))
        });
        assert!(result.is_err());
        assert!(registry.get("n1").is_none());
        assert_eq!(registry.len(), 0);
        assert!(touch(&registry, "n2", 0));
    }

    #[test]
    fn test_list_is_ordered() {
        let registry = registry(None);
        for id in ["c", "a", "b"] {
            touch(&registry, id, 0);
        }
        let ids: Vec<String> = registry.list().into_iter().map(|r| r.node_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_mark_sundown() {
        let registry = registry(None);
        touch(&registry, "n1", 0);
        assert_eq!(registry.mark_sundown("n1", 50, |_| {}).unwrap(), UtilizationCategory::Init);

        let record = registry.get("n1").unwrap();
        assert_eq!(record.category, UtilizationCategory::Sundown);
        assert_eq!(record.lifecycle, Lifecycle::Sundown);
        assert_eq!(record.last_updated, 50);

        // idempotent, does not reset the retention clock
        assert_eq!(registry.mark_sundown("n1", 90, |_| {}).unwrap(), UtilizationCategory::Sundown);
        assert_eq!(registry.get("n1").unwrap().last_updated, 50);

        assert_eq!(
            registry.mark_sundown("missing", 0, |_| {}),
            Err(RegistryError::UnknownNode("missing".into()))
        );
    }

    #[test]
    fn test_mark_sundown_reports_change_once() {
        let registry = registry(None);
        touch(&registry, "n1", 0);

        let mut seen = Vec::new();
        registry.mark_sundown("n1", 1, |previous| seen.push(previous)).unwrap();
        registry.mark_sundown("n1", 2, |previous| seen.push(previous)).unwrap();
        assert_eq!(seen, vec![UtilizationCategory::Init]);
    }

    #[test]
    fn test_gc_respects_retention() {
        let registry = registry(None);
        touch(&registry, "live", 0);
        touch(&registry, "old", 0);
        registry.mark_sundown("old", 1_000, |_| {}).unwrap();

        assert!(registry.gc_expired(1_500, 600).is_empty());
        assert_eq!(registry.gc_expired(1_600, 600), vec!["old".to_string()]);
        assert!(registry.get("old").is_none());
        assert!(registry.get("live").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_removed_handle_is_not_reused() {
        let registry = registry(None);
        touch(&registry, "n1", 0);
        registry.mark_sundown("n1", 0, |_| {}).unwrap();
        let stale_handle = registry.handle("n1").unwrap();
        registry.gc_expired(10, 1);

        assert!(lock(&stale_handle).removed);
        // a later sample recreates the node from scratch
        assert!(touch(&registry, "n1", 20));
        assert_eq!(registry.get("n1").unwrap().category, UtilizationCategory::Init);
    }

    #[test]
    fn test_flag_stale() {
        let registry = registry(None);
        touch(&registry, "quiet", 0);
        touch(&registry, "busy", 0);
        touch(&registry, "gone", 0);
        registry.mark_sundown("gone", 0, |_| {}).unwrap();
        touch(&registry, "busy", 900);

        let sweep = registry.flag_stale(1_000, 500);
        assert_eq!(sweep.newly_stale, vec!["quiet".to_string()]);
        assert_eq!(sweep.stale_total, 1);
        assert!(registry.get("quiet").unwrap().stale);
        assert!(!registry.get("gone").unwrap().stale);

        touch(&registry, "quiet", 1_100);
        let sweep = registry.flag_stale(1_200, 500);
        assert_eq!(sweep.recovered, vec!["quiet".to_string()]);
        assert_eq!(sweep.stale_total, 0);
    }

    #[test]
    fn test_register_updates_metadata() {
        let registry = registry(None);
        let (record, created) = registry.register("c1", Some("web"), None, 5).unwrap();
        assert!(created);
        assert_eq!(record.name, "web");
        assert_eq!(record.scores.overall_score, 1.0);

        let meta = ContainerMeta {
            image: "nginx:latest".into(),
            ..Default::default()
        };
        let (record, created) = registry.register("c1", None, Some(meta), 6).unwrap();
        assert!(!created);
        assert_eq!(record.name, "web");
        assert_eq!(record.container.unwrap().image, "nginx:latest");
    }

    #[test]
    fn test_restore_respects_capacity() {
        let registry = registry(Some(2));
        let records = vec![
            NodeRecord::new("a", None, 0),
            NodeRecord::new("b", None, 0),
            NodeRecord::new("c", None, 0),
        ];
        assert_eq!(registry.restore(records), 2);
        assert_eq!(registry.len(), 2);

        let mut updated = NodeRecord::new("a", Some("alpha".into()), 0);
        updated.category = UtilizationCategory::Hu;
        assert_eq!(registry.restore(vec![updated]), 1);
        assert_eq!(registry.get("a").unwrap().category, UtilizationCategory::Hu);
    }

    #[test]
    fn test_window_is_kept_per_node() {
        let registry = registry(None);
        registry
            .upsert("n1", None, 0, |slot| {
                slot.window.push(Sample {
                    timestamp: 0,
                    cpu_load: 0.5,
                    memory_used: 1.0,
                    memory_total: 2.0,
                    network_latency_ms: 1.0,
                    network_throughput: 1.0,
                    heartbeat_success_rate: 1.0,
                });
                Ok(())
            })
            .unwrap();
        assert_eq!(registry.with_node("n1", |slot| slot.window.len()), Some(1));
        assert_eq!(registry.with_node("n2", |slot| slot.window.len()), None);
    }
}
