//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Cells Work
//!
//! 1. When a cell is read within a reactive context (derived cell/effect),
//!    the read is recorded as a dependency of that context.
//!
//! 2. When a cell's value changes, all dependents are invalidated: derived
//!    cells become dirty and effects are queued for the next flush.
//!
//! 3. Nothing recomputes inside `set`.
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - A unique node ID (8 bytes)
//! - The value, shared behind `Rc<RefCell<_>>` by every clone of the handle
//!
//! Dependents are recorded as ids in the runtime's graph, never as owning
//! references.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use crate::graph::{Node, NodeId, NodeKind};

struct CellInner<T> {
    id: NodeId,
    value: RefCell<T>,
}

impl<T> Drop for CellInner<T> {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

/// A reactive cell holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the cell. `PartialEq` decides whether
///   a write is a change.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Cell;
///
/// let count = Cell::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (invalidates dependents)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    inner: Rc<CellInner<T>>,
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        let id = Runtime::register_node(Node::with_id(NodeId::new(), NodeKind::Source));
        Self {
            inner: Rc::new(CellInner {
                id,
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the cell's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the cell as a
    /// dependency of the running computation.
    pub fn get(&self) -> T {
        ReactiveContext::track(self.inner.id);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value (tracked) without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ReactiveContext::track(self.inner.id);
        f(&self.inner.value.borrow())
    }

    /// Set a new value.
    ///
    /// A value equal to the current one is ignored. Otherwise dependents are
    /// invalidated and dependent effects are queued for the next flush.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }

        trace!(cell = %self.inner.id, "Cell updated");
        Runtime::notify_changed(self.inner.id);
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.borrow();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Get the number of computations that read this cell on their last run.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Cells compare by identity, not by value.
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
