//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! A node carries no value; values live in the handle types of the
//! `reactive` module. The node only records identity, kind, freshness and
//! edges, so the graph can be walked without knowing any value types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Identity of a node, unique for the life of the process.
///
/// Ids are handed out in creation order, so comparing two ids tells which
/// node was registered first. The effect queue relies on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A writable cell. Read by others, never reads anything itself.
    Source,
    /// A memoized computation over other nodes.
    Derived,
    /// A side effect. Reads other nodes, is never read.
    Effect,
}

impl NodeKind {
    /// Freshness of a node of this kind before its first evaluation.
    ///
    /// Cells hold a value from the start. Derived cells and effects have
    /// never run.
    fn initial_state(self) -> DirtyState {
        match self {
            NodeKind::Source => DirtyState::Clean,
            NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
        }
    }
}

/// Freshness of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    Clean,
    /// Something further upstream changed. The direct inputs have to be
    /// checked before deciding whether to re-evaluate.
    MaybeDirty,
    /// A direct input changed.
    Dirty,
}

/// Bookkeeping for one node: kind, freshness and edges.
///
/// Both edge sets keep insertion order. For dependencies that is the order
/// of reads during the last evaluation, which is also the order in which
/// they are checked on refresh.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,
    dependencies: IndexSet<NodeId>,
    /// Ids only. A dependent is never kept alive through this set.
    dependents: IndexSet<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Create a node for an id the caller already allocated.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: kind.initial_state(),
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Only a clean node moves to `MaybeDirty`; `Dirty` stays as it is.
    pub fn mark_maybe_dirty(&mut self) {
        if self.is_clean() {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Detach the recorded dependencies, leaving the set empty.
    pub fn take_dependencies(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn node_ids_follow_creation_order() {
        let first = NodeId::new();
        let second = NodeId::new();
        assert!(first < second);
    }

    #[test]
    fn only_cells_start_clean() {
        assert!(Node::new(NodeKind::Source).is_clean());
        assert_eq!(Node::new(NodeKind::Derived).dirty_state(), DirtyState::Dirty);
        assert_eq!(Node::new(NodeKind::Effect).dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn with_id_keeps_the_given_id() {
        let id = NodeId::new();
        let node = Node::with_id(id, NodeKind::Effect);

        assert_eq!(node.id(), id);
        assert_eq!(node.kind(), NodeKind::Effect);
        assert_eq!(id.to_string(), format!("{id}"));
        assert!(id.to_string().starts_with('#'));
    }

    #[test]
    fn dependency_management() {
        let mut node = Node::new(NodeKind::Derived);
        let dep1 = NodeId::new();
        let dep2 = NodeId::new();

        node.add_dependency(dep1);
        node.add_dependency(dep2);
        node.add_dependency(dep1);

        assert_eq!(node.dependencies().len(), 2);
        assert_eq!(node.dependencies().get_index(0), Some(&dep1));

        node.remove_dependency(dep1);
        assert!(!node.dependencies().contains(&dep1));
        assert_eq!(node.dependencies().len(), 1);

        let taken = node.take_dependencies();
        assert_eq!(taken.len(), 1);
        assert!(node.dependencies().is_empty());
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::new(NodeKind::Derived);

        // Start dirty
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        // Maybe dirty never downgrades a definite dirty
        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        node.mark_clean();
        assert_eq!(node.dirty_state(), DirtyState::Clean);

        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::MaybeDirty);

        node.mark_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }
}
