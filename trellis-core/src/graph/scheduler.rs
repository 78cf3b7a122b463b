//! Update Scheduler
//!
//! The scheduler owns every node of the dependency graph and decides which
//! nodes are affected when a value changes.
//!
//! # Algorithm
//!
//! Propagation is push-pull:
//!
//! 1. When a node's value changes, mark its direct dependents as "dirty"
//! 2. Propagate "maybe dirty" to their dependents, recursively
//! 3. Report every effect node that was reached so it can be queued
//! 4. Nothing recomputes here. Derived nodes recompute when read, and a
//!    "maybe dirty" node first checks whether any input actually changed
//!
//! Because a derived node that recomputes to a new value calls back into
//! `mark_changed`, a "maybe dirty" node is upgraded to "dirty" exactly when
//! one of its inputs produced a different value.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{DirtyState, Node, NodeId, NodeKind};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Dirty state of a node, `None` if it is not in the graph.
    pub fn state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&node_id).map(Node::dirty_state)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// This means when `dependency` changes, `dependent` may need to update.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if !self.nodes.contains_key(&dependency) || !self.nodes.contains_key(&dependent) {
            return;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace the recorded dependencies of `node_id` with `dependencies`.
    ///
    /// Dependency sets are recomputed on every evaluation, never
    /// accumulated. Ids that are no longer in the graph are skipped.
    pub fn replace_dependencies<I>(&mut self, node_id: NodeId, dependencies: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.clear_dependencies(node_id);
        for dependency in dependencies {
            if dependency != node_id {
                self.add_edge(dependency, node_id);
            }
        }
    }

    /// Drop every incoming edge of `node_id`, keeping the node itself.
    pub fn clear_dependencies(&mut self, node_id: NodeId) {
        let old = match self.nodes.get_mut(&node_id) {
            Some(node) => node.take_dependencies(),
            None => return,
        };
        for dependency in old {
            if let Some(dep_node) = self.nodes.get_mut(&dependency) {
                dep_node.remove_dependent(node_id);
            }
        }
    }

    /// Mark a node as changed and propagate dirty flags.
    ///
    /// Direct dependents become `Dirty`, everything further downstream
    /// becomes `MaybeDirty`. Returns the effect nodes that were reached, in
    /// the order they were discovered.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut effects = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        let direct: Vec<NodeId> = match self.nodes.get(&source_id) {
            Some(source) => source.dependents().iter().copied().collect(),
            None => return effects,
        };

        for dependent_id in direct {
            if let Some(node) = self.nodes.get_mut(&dependent_id) {
                node.mark_dirty();
            }
            queue.push_back(dependent_id);
        }

        // BFS to propagate maybe-dirty status
        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_maybe_dirty();
                if node.kind() == NodeKind::Effect {
                    effects.push(node_id);
                }

                for dependent_id in node.dependents().iter() {
                    queue.push_back(*dependent_id);
                }
            }
        }

        effects
    }

    pub fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_clean();
        }
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
