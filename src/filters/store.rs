use super::group::FilterGroup;
use super::node::{FilterNode, GroupId, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Owns every filter node and group.
///
/// Nodes live in one arena keyed by id; groups and the ungrouped set only hold
/// ids. A node is in exactly one group's member list or in the ungrouped set.
#[derive(Debug, Default)]
pub struct FilterStore {
    nodes: HashMap<NodeId, FilterNode>,
    groups: BTreeMap<GroupId, FilterGroup>,
    ungrouped: BTreeSet<NodeId>,
    next_id: u64,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_node_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    pub fn node(&self, id: NodeId) -> Option<&FilterNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut FilterNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.nodes.values()
    }

    pub fn group(&self, id: &GroupId) -> Option<&FilterGroup> {
        self.groups.get(id)
    }

    pub fn group_mut(&mut self, id: &GroupId) -> Option<&mut FilterGroup> {
        self.groups.get_mut(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &FilterGroup> {
        self.groups.values()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().cloned().collect()
    }

    /// Member ids of a group in index order; empty for unknown groups
    pub fn members(&self, group: &GroupId) -> Vec<NodeId> {
        self.groups
            .get(group)
            .map(|g| g.filters.clone())
            .unwrap_or_default()
    }

    pub fn ungrouped(&self) -> Vec<NodeId> {
        self.ungrouped.iter().copied().collect()
    }

    pub fn is_ungrouped(&self, id: NodeId) -> bool {
        self.ungrouped.contains(&id)
    }

    /// Add a brand new node at the end of `group` (or ungrouped for `None`)
    pub fn add_node(&mut self, mut node: FilterNode, group: Option<GroupId>) -> NodeId {
        let id = node.id();
        node.set_group(group.clone());

        match group {
            None => {
                node.set_index(0);
                self.ungrouped.insert(id);
            }
            Some(group_id) => {
                let group = self
                    .groups
                    .entry(group_id.clone())
                    .or_insert_with(|| FilterGroup::new(group_id));
                node.set_index(group.filters.len());
                group.filters.push(id);
            }
        }

        self.nodes.insert(id, node);
        id
    }

    /// Group whose member list actually holds `node`, whatever the node thinks
    pub fn find_containing_group(&self, node: NodeId) -> Option<GroupId> {
        self.groups
            .values()
            .find(|g| g.contains(node))
            .map(|g| g.id.clone())
    }

    /// Rewrite member indices to 0..n in list order
    pub fn reindex(&mut self, group: &GroupId) {
        let Some(members) = self.groups.get(group).map(|g| g.filters.clone()) else {
            return;
        };

        for (index, id) in members.into_iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_index(index);
            }
        }
    }

    /// Take `node` out of `from` (or the ungrouped set), reindexing and dropping
    /// the group if it ends up empty. Returns false if it wasn't there.
    pub fn detach(&mut self, node: NodeId, from: Option<&GroupId>) -> bool {
        let Some(group_id) = from else {
            return self.ungrouped.remove(&node);
        };

        let Some(group) = self.groups.get_mut(group_id) else {
            return false;
        };
        let Some(position) = group.position(node) else {
            return false;
        };

        group.filters.remove(position);
        if group.filters.is_empty() {
            debug!("Group '{}' is empty, dropping it", group_id);
            self.groups.remove(group_id);
        } else {
            self.reindex(group_id);
        }
        true
    }

    /// Put an existing node into `to` at `index`; out of range (or `None`) appends
    pub fn attach(&mut self, node: NodeId, to: Option<GroupId>, index: Option<usize>) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.set_group(to.clone());
        }

        let Some(group_id) = to else {
            if let Some(n) = self.nodes.get_mut(&node) {
                n.set_index(0);
            }
            self.ungrouped.insert(node);
            return;
        };

        let group = self
            .groups
            .entry(group_id.clone())
            .or_insert_with(|| FilterGroup::new(group_id.clone()));

        match index {
            Some(i) if i <= group.filters.len() => group.filters.insert(i, node),
            _ => group.filters.push(node),
        }
        self.reindex(&group_id);
    }

    /// Remove a node for good. Looks only where the node says it lives.
    pub fn remove_node(&mut self, id: NodeId) -> Option<FilterNode> {
        let group = self.nodes.get(&id)?.group().cloned();

        if !self.detach(id, group.as_ref()) {
            return None;
        }
        self.nodes.remove(&id)
    }

    /// Check the index invariant for every group: indices are exactly 0..n
    pub fn indices_are_dense(&self) -> bool {
        self.groups.values().all(|group| {
            group.filters.iter().enumerate().all(|(expected, id)| {
                self.nodes
                    .get(id)
                    .map_or(false, |n| n.index() == expected && n.group() == Some(&group.id))
            })
        })
    }
}
