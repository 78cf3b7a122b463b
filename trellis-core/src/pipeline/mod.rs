//! Collection Pipelines
//!
//! A pipeline turns a source collection into one reactive output by running
//! a fixed sequence of stages:
//!
//! 1. **Filter**: keep items for which every [`FilterRule`] holds.
//! 2. **Sort**: stable ordering by the [`SortRule`]s, left to right.
//! 3. **Group**: optional partition by key into `{"key", "items"}` records.
//! 4. **Map**: transform elements with a [`MapSpec`].
//! 5. **Affix**: surround the result with prepend and append entries.
//!
//! Items are [`serde_json::Value`]s. Paths and templates go through the
//! [`interop`](crate::interop) collaborators.
//!
//! # Failures
//!
//! Pipelines degrade instead of failing. An unresolvable source is treated as
//! empty, a failing filter operand excludes its item, and a failing sort,
//! group or map callback empties the output for that pass. Each case is
//! logged with `tracing`. Only a cyclic read is reported as an error, through
//! [`Pipeline::try_get`].

mod instance;
mod source;
mod spec;
mod stages;
mod value;

pub use instance::Pipeline;
pub use spec::{
    Accessor, Affix, CollectionFn, Context, FilterOp, FilterRule, ItemFn, MapSpec, PipelineSpec,
    SortDirection, SortRule, Source, UnknownOperator,
};
pub use value::{group_key, natural_cmp, total_cmp, values_equal};
