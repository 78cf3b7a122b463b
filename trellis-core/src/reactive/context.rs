//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read,
//! we can record it as a dependency of the current computation.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., evaluating a derived cell or running
//! an effect), we push an entry onto the stack. When the computation
//! completes, we pop it.
//!
//! This design supports nested reactive contexts (e.g., a derived cell that
//! reads from another derived cell), untracked regions, and cycle detection:
//! a node that is already on the stack is being evaluated right now.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Dependencies collected during one evaluation.
pub type Dependencies = SmallVec<[NodeId; 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The node being evaluated. `None` marks an untracked region.
    observer: Option<NodeId>,
    /// Nodes read during this evaluation, deduplicated, in read order.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    observer: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a new tracking context for the given node.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub fn enter(observer: NodeId) -> Self {
        Self::push(Some(observer))
    }

    /// Enter a region in which reads are not recorded.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(observer: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer,
                dependencies: SmallVec::new(),
            });
        });

        Self { observer }
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        Self::current_observer().is_some()
    }

    /// The node whose evaluation is innermost, if reads are being recorded.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
    }

    /// Check whether `node` is anywhere on the evaluation stack.
    pub fn is_evaluating(node: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.observer == Some(node))
        })
    }

    /// Record a read of `node` in the innermost context.
    ///
    /// This is called by cells and derived cells when they are read.
    pub fn track(node: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.observer.is_some()
                    && entry.observer != Some(node)
                    && !entry.dependencies.contains(&node)
                {
                    entry.dependencies.push(node);
                }
            }
        });
    }

    /// Take the dependencies collected in the innermost context.
    pub fn take_dependencies() -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies))
                .unwrap_or_default()
        })
    }

    /// Get a copy of the dependencies collected in the innermost context.
    pub fn dependencies() -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.observer, self.observer,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.observer, entry.observer
                );
            }
        });
    }
}

/// Run `f` without recording any of its reads as dependencies.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
