//! Bounded audit log of category transitions

use crate::models::Transition;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// Most recent transitions across all nodes, oldest first
#[derive(Debug)]
pub struct TransitionLog {
    entries: RwLock<VecDeque<Transition>>,
    capacity: usize,
}

impl TransitionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity,
        }
    }

    pub fn record(&self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(transition);
    }

    /// Up to `limit` most recent transitions, optionally for one node
    pub fn recent(&self, node_id: Option<&str>, limit: usize) -> Vec<Transition> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Transition> = entries
            .iter()
            .rev()
            .filter(|t| node_id.map_or(true, |id| t.node_id == id))
            .take(limit)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
