use super::node::{GroupId, NodeId};
use crate::library::TrackList;
use std::collections::HashSet;

/// An ordered cascade of filters.
///
/// `filters` is kept in index order; `filtered_tracks` caches the intersection
/// of the active members (empty means "no narrowing, use the whole library").
#[derive(Debug, Clone)]
pub struct FilterGroup {
    pub id: GroupId,
    pub filters: Vec<NodeId>,
    pub filtered_tracks: TrackList,
    update_count: usize,
    awaiting_update: HashSet<NodeId>,
    expected_updates: usize,
}

impl FilterGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            filters: Vec::new(),
            filtered_tracks: Vec::new(),
            update_count: 0,
            awaiting_update: HashSet::new(),
            expected_updates: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.filters.contains(&node)
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.filters.iter().position(|&id| id == node)
    }

    /// Arm a one-shot completion hook for `node`; `count` is the member count at arm time
    pub fn expect_update(&mut self, node: NodeId, count: usize) {
        self.awaiting_update.insert(node);
        self.expected_updates = count;
    }

    /// Consume `node`'s completion hook.
    ///
    /// Returns true exactly once per batch: when the counter reaches the member
    /// count captured at arm time. The counter resets at that point.
    pub fn complete_update(&mut self, node: NodeId) -> bool {
        if !self.awaiting_update.remove(&node) {
            return false;
        }

        self.update_count += 1;
        if self.update_count == self.expected_updates {
            self.update_count = 0;
            return true;
        }
        false
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }
}
