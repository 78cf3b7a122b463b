//! Reactive Primitives
//!
//! This module implements the core reactive system: cells, derived cells,
//! effects and scopes. These primitives form the foundation of Trellis'
//! fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for mutable state. When a cell's value is read
//! within a tracking context (such as a derived cell or effect), the read is
//! recorded. When the cell's value changes, every computation that read it
//! is invalidated.
//!
//! ## Derived Cells
//!
//! A Derived cell is a value that caches its result. It re-evaluates only
//! when one of its dependencies changed, and only when it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Re-runs happen at batch boundaries ([`flush`],
//! [`batch`], [`settle`]), never inside a write.
//!
//! ## Scopes
//!
//! A Scope owns effects and cleanups and tears them down together.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a cell is read, we check if there is an active
//! tracking context and, if so, record the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod cell;
mod context;
mod derived;
mod effect;
mod runtime;
mod scope;

pub use cell::Cell;
pub use context::{untrack, ReactiveContext};
pub use derived::{Derived, DerivedState};
pub use effect::Effect;
pub use runtime::{batch, configure, flush, settle, Reactive, Runtime};
pub use scope::{reset_default_scope, Scope};
