//! Scopes
//!
//! A Scope is a disposal boundary. It owns the effects created in it, any
//! child scopes, and cleanup callbacks registered with
//! [`Scope::on_dispose`]. Disposing the scope tears all of them down at once,
//! so a construct built from several effects needs a single handle to clean
//! up after itself.
//!
//! Every thread has a default scope that owns effects created without an
//! explicit one. It lives as long as the thread unless it is torn down with
//! [`reset_default_scope`].

use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::effect::EffectInner;
use crate::graph::NodeId;

type Cleanup = Box<dyn FnOnce()>;

thread_local! {
    static DEFAULT_SCOPE: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

pub(crate) struct ScopeInner {
    id: NodeId,
    disposed: StdCell<bool>,
    effects: RefCell<Vec<Rc<EffectInner>>>,
    children: RefCell<Vec<Scope>>,
    cleanups: RefCell<Vec<Cleanup>>,
    parent: Weak<ScopeInner>,
}

impl ScopeInner {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        let effects: Vec<_> = self.effects.borrow_mut().drain(..).collect();
        let children: Vec<_> = self.children.borrow_mut().drain(..).collect();
        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();

        debug!(
            scope = %self.id,
            effects = effects.len(),
            children = children.len(),
            cleanups = cleanups.len(),
            "Disposing scope"
        );

        for effect in effects {
            effect.dispose_detached();
        }

        for child in children {
            child.dispose();
        }

        // Cleanups run in reverse registration order for proper nesting
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }

        if let Some(parent) = self.parent.upgrade() {
            parent
                .children
                .borrow_mut()
                .retain(|child| child.inner.id != self.id);
        }
    }

    /// Forget an effect that disposed itself.
    pub(crate) fn release(&self, effect: NodeId) {
        self.effects
            .borrow_mut()
            .retain(|owned| owned.id() != effect);
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A disposal boundary owning effects, child scopes and cleanups.
///
/// Handles are cheap to clone and share one scope. When the last handle is
/// dropped the scope is disposed.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{flush, Cell, Effect, Scope};
///
/// let scope = Scope::new();
/// let count = Cell::new(0);
///
/// let effect = Effect::new_in(&scope, {
///     let count = count.clone();
///     move || println!("Count: {}", count.get())
/// });
///
/// scope.dispose();
/// count.set(1);
/// flush(); // Prints nothing
/// assert!(effect.is_disposed());
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// Create a new, detached scope.
    pub fn new() -> Self {
        Self::with_parent(Weak::new())
    }

    fn with_parent(parent: Weak<ScopeInner>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                id: NodeId::new(),
                disposed: StdCell::new(false),
                effects: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                cleanups: RefCell::new(Vec::new()),
                parent,
            }),
        }
    }

    /// The thread's default scope.
    pub fn default_scope() -> Self {
        DEFAULT_SCOPE.with(|slot| slot.borrow_mut().get_or_insert_with(Scope::new).clone())
    }

    /// Create a scope that is disposed together with this one.
    ///
    /// The child of a disposed scope is returned already disposed.
    pub fn child(&self) -> Scope {
        let child = Self::with_parent(Rc::downgrade(&self.inner));
        if self.is_disposed() {
            child.inner.disposed.set(true);
        } else {
            self.inner.children.borrow_mut().push(child.clone());
        }
        child
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose every owned effect, child scope and cleanup.
    ///
    /// Effects stop immediately, including runs already queued for the next
    /// flush. Calling this more than once is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Register a cleanup to run when the scope is disposed.
    ///
    /// On an already disposed scope the cleanup runs immediately.
    pub fn on_dispose(&self, cleanup: impl FnOnce() + 'static) {
        if self.is_disposed() {
            cleanup();
            return;
        }
        self.inner.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    /// Number of live effects owned directly by this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    pub(crate) fn adopt(&self, effect: Rc<EffectInner>) {
        self.inner.effects.borrow_mut().push(effect);
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner> {
        Rc::downgrade(&self.inner)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("effects", &self.effect_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Dispose the thread's default scope and install a fresh one.
///
/// Effects created without an explicit scope stop. Later effects without an
/// explicit scope go to the new default.
pub fn reset_default_scope() {
    let previous = DEFAULT_SCOPE.with(|slot| slot.borrow_mut().take());
    if let Some(previous) = previous {
        previous.dispose();
    }
}
