//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. It re-runs at the
//!    next flush (see [`flush`](super::flush)), once, no matter how many
//!    writes happened before the flush.
//!
//! 3. Every run replaces the recorded dependencies with the ones read during
//!    that run.
//!
//! 4. A run that writes a cell it read queues itself again. The follow-up
//!    run happens in the next flush round, up to
//!    [`RuntimeConfig::max_flush_rounds`](crate::RuntimeConfig::max_flush_rounds).
//!
//! # Ownership
//!
//! Every effect belongs to a [`Scope`]. The scope holds the effect; the
//! graph only knows its id. Disposing the scope, or the effect itself, stops
//! it permanently, even when a run is already queued.
//!
//! # Differences from Derived
//!
//! - Derived cells return a value; effects do not.
//! - Derived cells are lazy (compute on access); effects run at each flush.
//! - Derived cells cache results; effects just run their side effect.

use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use super::scope::{Scope, ScopeInner};
use crate::error::ReactiveError;
use crate::graph::{Node, NodeId, NodeKind};

pub(crate) struct EffectInner {
    id: NodeId,
    run: Box<dyn Fn()>,
    disposed: StdCell<bool>,
    run_count: StdCell<usize>,
    scope: RefCell<Weak<ScopeInner>>,
}

impl EffectInner {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Run the effect function inside a tracking context.
    fn execute(&self) -> Result<(), ReactiveError> {
        if self.disposed.get() {
            return Ok(());
        }

        // Cleared before the run so that writes made by the run itself can
        // queue it again.
        Runtime::mark_clean(self.id);

        let (result, dependencies) = {
            let _ctx = ReactiveContext::enter(self.id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| (self.run)()));
            (result, ReactiveContext::take_dependencies())
        };

        self.run_count.set(self.run_count.get() + 1);

        // The effect may have disposed itself while running.
        if !self.disposed.get() {
            Runtime::commit_dependencies(self.id, dependencies);
        }

        match result {
            Ok(()) => Ok(()),
            Err(payload) => match payload.downcast::<ReactiveError>() {
                Ok(err) => Err(*err),
                Err(payload) => panic::resume_unwind(payload),
            },
        }
    }

    /// Stop the effect and remove it from the graph and the queue.
    ///
    /// Does not touch the owning scope's list; see [`Effect::dispose`].
    pub(crate) fn dispose_detached(&self) {
        if self.disposed.replace(true) {
            return;
        }
        Runtime::release(self.id);
    }
}

impl Reactive for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn recompute(&self) -> Result<bool, ReactiveError> {
        self.execute().map(|()| false)
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if !self.disposed.get() {
            Runtime::release(self.id);
        }
    }
}

/// A side-effecting computation that re-runs when dependencies change.
///
/// The handle doubles as the effect's disposer.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{flush, Cell, Effect};
///
/// let count = Cell::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);
/// flush(); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect owned by the thread's default scope.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::new_in(&Scope::default_scope(), run)
    }

    /// Create a new effect owned by `scope`.
    ///
    /// An effect created in a disposed scope never runs.
    pub fn new_in<F>(scope: &Scope, run: F) -> Self
    where
        F: Fn() + 'static,
    {
        let inner = Rc::new(EffectInner {
            id: NodeId::new(),
            run: Box::new(run),
            disposed: StdCell::new(false),
            run_count: StdCell::new(0),
            scope: RefCell::new(Weak::new()),
        });

        if scope.is_disposed() {
            warn!(effect = %inner.id, scope = %scope.id(), "Effect created in a disposed scope; it will never run");
            inner.disposed.set(true);
            return Self { inner };
        }

        let weak: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        Runtime::register(Node::with_id(inner.id, NodeKind::Effect), weak);
        *inner.scope.borrow_mut() = scope.downgrade();
        scope.adopt(inner.clone());

        // Run immediately to establish dependencies
        if let Err(err) = inner.execute() {
            error!(effect = %inner.id, error = %err, "Effect failed on first run");
        }

        Self { inner }
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose of the effect.
    ///
    /// Removes it from its scope, the graph and any pending flush. Calling
    /// this more than once is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.get() {
            return;
        }
        debug!(effect = %self.inner.id, "Effect disposed");
        self.inner.dispose_detached();

        let scope = self.inner.scope.borrow().upgrade();
        if let Some(scope) = scope {
            scope.release(self.inner.id);
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies recorded on the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
