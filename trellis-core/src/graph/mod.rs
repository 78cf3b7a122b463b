//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent reactive values (cells) or computations (derived cells, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! When a cell changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. Derived nodes then recompute lazily when read and
//! effects are queued for the next flush.
//!
//! # Design Decisions
//!
//! 1. The graph is an arena indexed by [`NodeId`]. Nodes never own each other;
//!    a cell only knows the ids of the nodes that read it. Ownership of a
//!    derived cell or effect stays with its handle or its scope.
//!
//! 2. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.
//!
//! 3. The graph is value-agnostic. Values live in the typed handles of the
//!    `reactive` module, which reach the graph through the runtime.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
