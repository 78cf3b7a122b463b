//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, derived cells
//! and effects. It owns the dependency graph and the queue of effects waiting
//! for the next flush.
//!
//! # How It Works
//!
//! 1. When a cell, derived cell or effect is created, its node is added to
//!    the graph. Derived cells and effects also register a weak handle so the
//!    runtime can ask them to re-evaluate.
//!
//! 2. When a computation finishes, the dependencies it read replace the ones
//!    recorded for its node.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Marks direct dependents dirty and everything further "maybe dirty"
//!    b. Queues every effect that was reached
//!    c. Recomputes nothing. Derived cells are lazy and recompute on next
//!       access; queued effects run at the next flush
//!
//! # Batch Boundary
//!
//! There is no microtask queue to hang deferred work on, so the batch
//! boundary is explicit. [`flush`] runs queued effects; [`batch`] flushes when
//! its outermost call returns; [`settle`] yields to the async executor before
//! flushing. Writes never run effects by themselves, so any number of writes
//! before a boundary coalesce into a single run per affected effect.
//!
//! # Thread Safety
//!
//! The runtime is thread-local and every handle is `!Send`. Each thread that
//! uses the crate gets its own independent graph.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Weak;

use tracing::{error, trace, warn};

use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{DirtyState, Node, NodeId, NodeKind, UpdateScheduler};

/// A computation the runtime can ask to re-evaluate.
pub trait Reactive {
    /// The graph node of this computation.
    fn node_id(&self) -> NodeId;

    /// Re-evaluate now.
    ///
    /// Returns whether the observable value changed. Effects have no value
    /// and always report `false`.
    fn recompute(&self) -> Result<bool, ReactiveError>;
}

struct RuntimeState {
    graph: UpdateScheduler,
    /// Maps node IDs to weak references to avoid preventing cleanup.
    registry: HashMap<NodeId, Weak<dyn Reactive>>,
    /// Effects waiting for the next flush, in registration order.
    pending: BTreeSet<NodeId>,
    batch_depth: usize,
    flushing: bool,
    config: RuntimeConfig,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: UpdateScheduler::new(),
            registry: HashMap::new(),
            pending: BTreeSet::new(),
            batch_depth: 0,
            flushing: false,
            config: RuntimeConfig::default(),
        }
    }
}

thread_local! {
    static RUNTIME: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());
}

/// The thread-local reactive runtime.
///
/// Borrows of the runtime state never outlive a single call, so user
/// callbacks are always invoked with the runtime unborrowed.
pub struct Runtime;

impl Runtime {
    fn with<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
        RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
    }

    /// Access the runtime from `Drop` impls, where the thread-local may be
    /// gone or already borrowed.
    fn try_with<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> Option<R> {
        RUNTIME
            .try_with(|runtime| runtime.try_borrow_mut().ok().map(|mut state| f(&mut state)))
            .ok()
            .flatten()
    }

    /// Add a node without a re-evaluation handle (cells).
    pub(crate) fn register_node(node: Node) -> NodeId {
        Self::with(|rt| rt.graph.add_node(node))
    }

    /// Add a node together with the computation behind it.
    pub(crate) fn register(node: Node, reactive: Weak<dyn Reactive>) -> NodeId {
        Self::with(|rt| {
            let id = rt.graph.add_node(node);
            rt.registry.insert(id, reactive);
            id
        })
    }

    /// Remove a node, its edges, its registry entry and any queued run.
    pub(crate) fn release(id: NodeId) {
        let released = Self::try_with(|rt| {
            rt.graph.remove_node(id);
            rt.registry.remove(&id);
            rt.pending.remove(&id);
        });
        if released.is_none() {
            trace!(node = %id, "Runtime unavailable while releasing node");
        }
    }

    /// Replace the recorded dependencies of `id` after an evaluation.
    pub(crate) fn commit_dependencies<I>(id: NodeId, dependencies: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        Self::with(|rt| rt.graph.replace_dependencies(id, dependencies));
    }

    /// Propagate a value change of `id` and queue the effects it reaches.
    pub(crate) fn notify_changed(id: NodeId) {
        Self::with(|rt| {
            let effects = rt.graph.mark_changed(id);
            trace!(node = %id, queued = effects.len(), "Value changed");
            rt.pending.extend(effects);
        });
    }

    pub(crate) fn mark_clean(id: NodeId) {
        Self::with(|rt| rt.graph.mark_clean(id));
    }

    pub(crate) fn state(id: NodeId) -> Option<DirtyState> {
        Self::with(|rt| rt.graph.state(id))
    }

    fn dependencies_of(id: NodeId) -> Vec<NodeId> {
        Self::with(|rt| {
            rt.graph
                .get_node(id)
                .map(|node| node.dependencies().iter().copied().collect())
                .unwrap_or_default()
        })
    }

    fn kind(id: NodeId) -> Option<NodeKind> {
        Self::with(|rt| rt.graph.get_node(id).map(Node::kind))
    }

    pub(crate) fn dependency_count(id: NodeId) -> usize {
        Self::with(|rt| {
            rt.graph
                .get_node(id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    pub(crate) fn dependent_count(id: NodeId) -> usize {
        Self::with(|rt| rt.graph.get_node(id).map_or(0, |node| node.dependents().len()))
    }

    /// Bring `id` up to date.
    ///
    /// A `MaybeDirty` node first refreshes the derived nodes it read. If one
    /// of them produced a different value the node was upgraded to `Dirty`
    /// along the way and recomputes; otherwise it is simply marked clean.
    ///
    /// Returns whether the node was re-evaluated.
    pub(crate) fn refresh(id: NodeId) -> Result<bool, ReactiveError> {
        match Self::state(id) {
            None | Some(DirtyState::Clean) => return Ok(false),
            Some(DirtyState::Dirty) => {}
            Some(DirtyState::MaybeDirty) => {
                for dependency in Self::dependencies_of(id) {
                    if Self::kind(dependency) == Some(NodeKind::Derived) {
                        Self::refresh(dependency)?;
                    }
                    if Self::state(id) == Some(DirtyState::Dirty) {
                        break;
                    }
                }

                if Self::state(id) != Some(DirtyState::Dirty) {
                    Self::mark_clean(id);
                    return Ok(false);
                }
            }
        }

        if Self::kind(id) == Some(NodeKind::Effect) {
            // Bring derived inputs up to date first. A derived cell that
            // changes while the effect runs would otherwise queue it again.
            for dependency in Self::dependencies_of(id) {
                if Self::kind(dependency) == Some(NodeKind::Derived) {
                    if let Err(err) = Self::refresh(dependency) {
                        trace!(node = %dependency, error = %err, "Deferred to the effect run");
                    }
                }
            }
        }

        let reactive = Self::with(|rt| rt.registry.get(&id).cloned());
        match reactive.and_then(|weak| weak.upgrade()) {
            Some(reactive) => {
                reactive.recompute()?;
                Ok(true)
            }
            None => {
                Self::mark_clean(id);
                Ok(false)
            }
        }
    }

    /// Number of effects waiting for the next flush.
    pub fn pending_count() -> usize {
        Self::with(|rt| rt.pending.len())
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        Self::with(|rt| rt.graph.node_count())
    }

    pub fn is_batching() -> bool {
        Self::with(|rt| rt.batch_depth > 0)
    }

    pub fn config() -> RuntimeConfig {
        Self::with(|rt| rt.config.clone())
    }

    fn begin_flush() -> Option<usize> {
        Self::with(|rt| {
            if rt.flushing || rt.batch_depth > 0 {
                None
            } else {
                rt.flushing = true;
                Some(rt.config.max_flush_rounds)
            }
        })
    }
}

/// Install `config` for the current thread's runtime.
pub fn configure(config: RuntimeConfig) {
    Runtime::with(|rt| rt.config = config);
}

/// Run every queued effect, in registration order, until the queue is empty.
///
/// Effects that write cells during the flush queue further effects, which
/// run in a following round. Calls made while a flush is already running or
/// inside a [`batch`] do nothing; the outer boundary picks the work up.
///
/// Returns the number of effect runs.
pub fn flush() -> usize {
    let Some(max_rounds) = Runtime::begin_flush() else {
        return 0;
    };

    struct FlushGuard;

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            Runtime::try_with(|rt| rt.flushing = false);
        }
    }

    let _guard = FlushGuard;
    let mut runs = 0;

    for _ in 0..max_rounds {
        let pending = Runtime::with(|rt| std::mem::take(&mut rt.pending));
        if pending.is_empty() {
            return runs;
        }

        for id in pending {
            match Runtime::refresh(id) {
                Ok(true) => runs += 1,
                Ok(false) => {}
                Err(err) => {
                    runs += 1;
                    error!(effect = %id, error = %err, "Effect failed");
                }
            }
        }
    }

    let dropped = Runtime::with(|rt| {
        let dropped = rt.pending.len();
        rt.pending.clear();
        dropped
    });
    if dropped > 0 {
        warn!(
            rounds = max_rounds,
            dropped, "Effect flush did not settle; dropping queued effects"
        );
    }

    runs
}

/// Run `f` as one batch and flush when the outermost batch exits.
///
/// Nested batches only flush once, at the end of the outermost one.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::with(|rt| rt.batch_depth += 1);

    // Use a guard pattern to ensure we exit the batch even on panic
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = Runtime::try_with(|rt| {
                rt.batch_depth = rt.batch_depth.saturating_sub(1);
                rt.batch_depth
            });

            if depth == Some(0) && !std::thread::panicking() {
                flush();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Yield to the async executor once, then flush.
///
/// This is the deferred batch boundary for async callers: every write made
/// before the first `.await` point of the current task is coalesced.
pub async fn settle() -> usize {
    tokio::task::yield_now().await;
    flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;
    use std::rc::Rc;

    struct MockReactive {
        id: NodeId,
        runs: StdCell<usize>,
    }

    impl Reactive for MockReactive {
        fn node_id(&self) -> NodeId {
            self.id
        }

        fn recompute(&self) -> Result<bool, ReactiveError> {
            self.runs.set(self.runs.get() + 1);
            Runtime::mark_clean(self.id);
            Ok(false)
        }
    }

    fn mock_effect() -> Rc<MockReactive> {
        let mock = Rc::new(MockReactive {
            id: NodeId::new(),
            runs: StdCell::new(0),
        });
        let weak: Weak<dyn Reactive> = Rc::downgrade(&mock) as Weak<dyn Reactive>;
        Runtime::register(Node::with_id(mock.node_id(), NodeKind::Effect), weak);
        Runtime::mark_clean(mock.id);
        mock
    }

    #[test]
    fn runtime_registers_and_releases() {
        let before = Runtime::node_count();
        let id = Runtime::register_node(Node::new(NodeKind::Source));
        assert_eq!(Runtime::node_count(), before + 1);

        Runtime::release(id);
        assert_eq!(Runtime::node_count(), before);
    }

    #[test]
    fn changes_queue_effects_until_flush() {
        let source = Runtime::register_node(Node::new(NodeKind::Source));
        let effect = mock_effect();
        Runtime::commit_dependencies(effect.id, [source]);

        Runtime::notify_changed(source);
        Runtime::notify_changed(source);

        assert_eq!(Runtime::pending_count(), 1);
        assert_eq!(effect.runs.get(), 0);

        assert_eq!(flush(), 1);
        assert_eq!(effect.runs.get(), 1);
        assert_eq!(Runtime::pending_count(), 0);

        Runtime::release(effect.id);
        Runtime::release(source);
    }

    #[test]
    fn released_effects_leave_the_queue() {
        let source = Runtime::register_node(Node::new(NodeKind::Source));
        let effect = mock_effect();
        Runtime::commit_dependencies(effect.id, [source]);

        Runtime::notify_changed(source);
        Runtime::release(effect.id);

        assert_eq!(Runtime::pending_count(), 0);
        assert_eq!(flush(), 0);
        assert_eq!(effect.runs.get(), 0);

        Runtime::release(source);
    }

    #[test]
    fn batch_defers_flush_to_outermost_exit() {
        let source = Runtime::register_node(Node::new(NodeKind::Source));
        let effect = mock_effect();
        Runtime::commit_dependencies(effect.id, [source]);

        batch(|| {
            batch(|| Runtime::notify_changed(source));
            assert!(Runtime::is_batching());
            assert_eq!(flush(), 0);
            assert_eq!(effect.runs.get(), 0);
        });

        assert!(!Runtime::is_batching());
        assert_eq!(effect.runs.get(), 1);

        Runtime::release(effect.id);
        Runtime::release(source);
    }

    #[test]
    fn configure_replaces_limits() {
        let original = Runtime::config();
        configure(RuntimeConfig {
            max_flush_rounds: 3,
            ..RuntimeConfig::default()
        });
        assert_eq!(Runtime::config().max_flush_rounds, 3);
        configure(original);
    }
}
