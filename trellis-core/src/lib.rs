//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive data layer.
//! It implements:
//!
//! - Reactive primitives (cells, derived cells, effects, scopes)
//! - A push-pull dependency graph with lazy recomputation
//! - Collection pipelines (filter, sort, group, map, affix) over JSON values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, dependency tracking and batching
//! - `graph`: Dependency graph and dirty-state propagation
//! - `pipeline`: Reactive collection pipelines built on the primitives
//! - `interop`: Path resolution and template evaluation used by pipelines
//! - `config`: Runtime limits
//!
//! The runtime is thread-local. Handles are cheap to clone and `!Send`.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell as Counter;
//! use std::rc::Rc;
//!
//! use trellis_core::{create_cell, create_derived, create_effect, create_scope};
//! use trellis_core::reactive::flush;
//!
//! let count = create_cell(1);
//! let doubled = create_derived({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let scope = create_scope();
//! let seen = Rc::new(Counter::new(0));
//! create_effect(
//!     {
//!         let (doubled, seen) = (doubled.clone(), seen.clone());
//!         move || seen.set(doubled.get())
//!     },
//!     Some(&scope),
//! );
//! assert_eq!(seen.get(), 2);
//!
//! // Writes are coalesced until the next flush.
//! count.set(5);
//! count.set(6);
//! flush();
//! assert_eq!(seen.get(), 12);
//!
//! scope.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod interop;
pub mod pipeline;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{PipelineError, ReactiveError};

use pipeline::{Context, Pipeline, PipelineSpec};
use reactive::{Cell, Derived, Effect, Scope};

/// Create a writable cell holding `value`.
pub fn create_cell<T>(value: T) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    Cell::new(value)
}

/// Create a lazily evaluated, memoized value.
pub fn create_derived<T, F>(compute: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Derived::new(compute)
}

/// Create an effect in `scope`, or in the thread's default scope.
///
/// The effect runs once immediately. The returned handle disposes it.
pub fn create_effect<F>(run: F, scope: Option<&Scope>) -> Effect
where
    F: Fn() + 'static,
{
    match scope {
        Some(scope) => Effect::new_in(scope, run),
        None => Effect::new(run),
    }
}

/// Create a root scope, independent of the thread's default scope.
///
/// Effects created in it stop when it is disposed.
pub fn create_scope() -> Scope {
    Scope::new()
}

/// Build a pipeline from `spec`, resolving path sources against `context`.
pub fn create_pipeline(spec: PipelineSpec, context: Context, key: impl Into<String>) -> Pipeline {
    Pipeline::new(spec, context, key)
}
