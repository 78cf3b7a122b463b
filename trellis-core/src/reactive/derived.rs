//! Derived Cell Implementation
//!
//! A Derived cell is a cached value computed from other cells. It
//! re-evaluates only when its dependencies change, and only when read.
//!
//! # How Derived Cells Work
//!
//! 1. On first access, the derived cell runs its computation inside a
//!    tracking context and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, it returns the
//!    cached value without running the computation.
//!
//! 3. When a cell it read changes, it is marked "dirty"; when something
//!    further upstream changes, it is marked "maybe dirty".
//!
//! 4. On next access, a "maybe dirty" cell first brings its own derived
//!    inputs up to date. Only if one of them actually changed does it
//!    recompute. Otherwise it is marked clean and returns the cache.
//!
//! 5. Every evaluation replaces the recorded dependency set, so conditional
//!    reads shrink and grow the set as the computation takes other branches.
//!
//! # Cycles
//!
//! Reading a derived cell while it is being evaluated (directly, or through
//! other derived cells) fails with [`ReactiveError::CyclicDependency`]. Use
//! [`Derived::try_get`] to receive the error as a value. [`Derived::get`]
//! carries it as an unwinding payload up to the nearest enclosing `try_get`,
//! so a cycle detected deep inside nested computations surfaces at the
//! caller that started the evaluation.

use std::cell::{Cell as StdCell, RefCell};
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use crate::error::ReactiveError;
use crate::graph::{DirtyState, Node, NodeId, NodeKind};

/// Evaluation state of a derived cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedState {
    /// The cached value is up-to-date.
    Clean,

    /// Something upstream changed. Need to check.
    MaybeDirty,

    /// The derived cell definitely needs to recompute.
    Dirty,

    /// Detached from the graph; the last value is kept forever.
    Disposed,
}

struct DerivedInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    disposed: StdCell<bool>,
}

impl<T> DerivedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Run the computation and record what it read.
    ///
    /// Returns the fresh value and whether it differs from the cache.
    fn evaluate(&self) -> Result<(T, bool), ReactiveError> {
        if ReactiveContext::is_evaluating(self.id) {
            return Err(ReactiveError::CyclicDependency { node: self.id });
        }

        let (result, dependencies) = {
            let _ctx = ReactiveContext::enter(self.id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| (self.compute)()));
            (result, ReactiveContext::take_dependencies())
        };

        let value = match result {
            Ok(value) => value,
            Err(payload) => match payload.downcast::<ReactiveError>() {
                Ok(err) => return Err(*err),
                Err(payload) => panic::resume_unwind(payload),
            },
        };

        if self.disposed.get() {
            // Disposed while evaluating: keep the graph untouched.
            *self.value.borrow_mut() = Some(value.clone());
            return Ok((value, false));
        }

        Runtime::commit_dependencies(self.id, dependencies);

        let changed = self.value.borrow().as_ref() != Some(&value);
        if changed {
            *self.value.borrow_mut() = Some(value.clone());
        }
        Runtime::mark_clean(self.id);

        trace!(derived = %self.id, changed, "Derived recomputed");
        if changed {
            Runtime::notify_changed(self.id);
        }

        Ok((value, changed))
    }

    fn cached(&self) -> Option<T> {
        self.value.borrow().clone()
    }
}

impl<T> Reactive for DerivedInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn recompute(&self) -> Result<bool, ReactiveError> {
        self.evaluate().map(|(_, changed)| changed)
    }
}

impl<T> Drop for DerivedInner<T> {
    fn drop(&mut self) {
        if !self.disposed.get() {
            Runtime::release(self.id);
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. The `PartialEq` bound is needed to
///   detect when the computed value actually changed (a derived cell might
///   return the same value even if its inputs changed), which keeps
///   downstream nodes clean.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Cell, Derived};
///
/// let count = Cell::new(2);
/// let doubled = Derived::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Derived<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<DerivedInner<T>>,
}

impl<T> Derived<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new derived cell with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new(DerivedInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            disposed: StdCell::new(false),
        });

        let weak: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        Runtime::register(Node::with_id(inner.id, NodeKind::Derived), weak);

        Self { inner }
    }

    /// Get the derived cell's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Unwinds with a [`ReactiveError`] payload if the value depends on
    /// itself. An enclosing [`Derived::try_get`] turns the payload back into
    /// an error; use `try_get` directly at the top of a graph.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic::resume_unwind(Box::new(err)),
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        if self.inner.disposed.get() {
            return match self.inner.cached() {
                Some(value) => Ok(value),
                None => self.inner.evaluate().map(|(value, _)| value),
            };
        }

        if ReactiveContext::is_evaluating(self.inner.id) {
            return Err(ReactiveError::CyclicDependency {
                node: self.inner.id,
            });
        }

        // If we're inside a reactive context, track this cell as a dependency
        ReactiveContext::track(self.inner.id);

        Runtime::refresh(self.inner.id)?;

        match self.inner.cached() {
            Some(value) => Ok(value),
            None => self.inner.evaluate().map(|(value, _)| value),
        }
    }

    /// Get the current evaluation state.
    pub fn state(&self) -> DerivedState {
        if self.inner.disposed.get() {
            return DerivedState::Disposed;
        }
        match Runtime::state(self.inner.id) {
            Some(DirtyState::Clean) => DerivedState::Clean,
            Some(DirtyState::MaybeDirty) => DerivedState::MaybeDirty,
            Some(DirtyState::Dirty) | None => DerivedState::Dirty,
        }
    }

    /// Check if the derived cell has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of nodes read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }

    /// Detach from the graph.
    ///
    /// The last computed value is kept and returned by every later read; the
    /// computation never runs again unless it had never run at all.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        debug!(derived = %self.inner.id, "Derived disposed");
        Runtime::release(self.inner.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T> Clone for Derived<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: Clone + PartialEq + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;
    use std::cell::RefCell as StdRefCell;

    fn counter() -> Rc<StdCell<usize>> {
        Rc::new(StdCell::new(0))
    }

    #[test]
    fn derived_computes_on_first_access() {
        let calls = counter();
        let derived = Derived::new({
            let calls = calls.clone();
            move || {
                calls.set(calls.get() + 1);
                42
            }
        });

        assert!(!derived.has_value());
        assert_eq!(calls.get(), 0);

        assert_eq!(derived.get(), 42);
        assert_eq!(calls.get(), 1);
        assert!(derived.has_value());
    }

    #[test]
    fn derived_caches_value_when_clean() {
        let calls = counter();
        let source = Cell::new(3);
        let derived = Derived::new({
            let (calls, source) = (calls.clone(), source.clone());
            move || {
                calls.set(calls.get() + 1);
                source.get() * 2
            }
        });

        assert_eq!(derived.get(), 6);
        assert_eq!(derived.get(), 6);
        assert_eq!(derived.get(), 6);
        assert_eq!(calls.get(), 1);
        assert_eq!(derived.state(), DerivedState::Clean);
    }

    #[test]
    fn derived_recomputes_after_change() {
        let source = Cell::new(3);
        let derived = Derived::new({
            let source = source.clone();
            move || source.get() * 2
        });

        assert_eq!(derived.get(), 6);
        source.set(5);
        assert_eq!(derived.state(), DerivedState::Dirty);
        assert_eq!(derived.get(), 10);
    }

    #[test]
    fn equal_write_does_not_invalidate() {
        let calls = counter();
        let source = Cell::new(3);
        let derived = Derived::new({
            let (calls, source) = (calls.clone(), source.clone());
            move || {
                calls.set(calls.get() + 1);
                source.get()
            }
        });

        derived.get();
        source.set(3);
        assert_eq!(derived.state(), DerivedState::Clean);
        derived.get();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unchanged_intermediate_keeps_downstream_clean() {
        let source = Cell::new(4);
        let parity = Derived::new({
            let source = source.clone();
            move || source.get() % 2
        });
        let calls = counter();
        let label = Derived::new({
            let (parity, calls) = (parity.clone(), calls.clone());
            move || {
                calls.set(calls.get() + 1);
                if parity.get() == 0 { "even" } else { "odd" }
            }
        });

        assert_eq!(label.get(), "even");
        source.set(6);
        assert_eq!(label.state(), DerivedState::MaybeDirty);
        assert_eq!(label.get(), "even");
        assert_eq!(calls.get(), 1);

        source.set(7);
        assert_eq!(label.get(), "odd");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dependencies_follow_the_branch_taken() {
        let use_a = Cell::new(true);
        let a = Cell::new(1);
        let b = Cell::new(2);
        let derived = Derived::new({
            let (use_a, a, b) = (use_a.clone(), a.clone(), b.clone());
            move || if use_a.get() { a.get() } else { b.get() }
        });

        assert_eq!(derived.get(), 1);
        assert_eq!(derived.dependency_count(), 2);
        assert_eq!(b.dependent_count(), 0);

        use_a.set(false);
        assert_eq!(derived.get(), 2);
        assert_eq!(a.dependent_count(), 0);
        assert_eq!(b.dependent_count(), 1);

        // `a` is no longer read, so writing it leaves the cache alone.
        a.set(100);
        assert_eq!(derived.state(), DerivedState::Clean);
    }

    #[test]
    fn direct_self_read_is_cyclic() {
        let slot: Rc<StdRefCell<Option<Derived<i32>>>> = Rc::new(StdRefCell::new(None));
        let derived = Derived::new({
            let slot = slot.clone();
            move || {
                let this = slot.borrow().clone();
                this.map_or(0, |d| d.get() + 1)
            }
        });
        *slot.borrow_mut() = Some(derived.clone());

        assert_eq!(
            derived.try_get(),
            Err(ReactiveError::CyclicDependency { node: derived.id() })
        );

        // Break the reference cycle so the nodes are released.
        slot.borrow_mut().take();
    }

    #[test]
    fn transitive_self_read_is_cyclic() {
        let slot: Rc<StdRefCell<Option<Derived<i32>>>> = Rc::new(StdRefCell::new(None));
        let middle = Derived::new({
            let slot = slot.clone();
            move || {
                let first = slot.borrow().clone();
                first.map_or(0, |d| d.get() * 2)
            }
        });
        let first = Derived::new({
            let middle = middle.clone();
            move || middle.get() + 1
        });
        *slot.borrow_mut() = Some(first.clone());

        assert!(matches!(
            first.try_get(),
            Err(ReactiveError::CyclicDependency { .. })
        ));
        // Still failing on retry, never looping.
        assert!(first.try_get().is_err());

        slot.borrow_mut().take();
    }

    #[test]
    fn disposed_derived_keeps_last_value() {
        let source = Cell::new(1);
        let derived = Derived::new({
            let source = source.clone();
            move || source.get() + 1
        });

        assert_eq!(derived.get(), 2);
        derived.dispose();
        derived.dispose();

        source.set(10);
        assert_eq!(derived.state(), DerivedState::Disposed);
        assert_eq!(derived.get(), 2);
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    fn derived_clone_shares_state() {
        let derived1 = Derived::new(|| 42);
        assert_eq!(derived1.get(), 42);

        let derived2 = derived1.clone();

        assert_eq!(derived1.id(), derived2.id());
        assert!(derived2.has_value());
        assert_eq!(derived2.get(), 42);
    }
}
