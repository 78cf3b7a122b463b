//! Pipeline Instance
//!
//! A [`Pipeline`] wraps one derived value holding the output of all five
//! stages, plus a private [`Scope`] that owns everything the pipeline keeps
//! alive. Reading the pipeline pulls the derived value; a change to any cell
//! read by the source, an operand or a computed affix invalidates it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn, Level};

use super::source::SourceResolver;
use super::spec::{Context, PipelineSpec};
use super::stages;
use crate::error::{CallbackError, PipelineError};
use crate::interop::Collaborators;
use crate::reactive::{Cell, Derived, Effect, Runtime, Scope};

/// Everything one pass needs. Shared with the derived computation.
struct Stages {
    key: String,
    spec: PipelineSpec,
    context: Context,
    collaborators: Collaborators,
    writable: Rc<RefCell<Option<Cell<Value>>>>,
}

impl Stages {
    #[tracing::instrument(level = Level::DEBUG, skip_all, fields(pipeline = %self.key))]
    fn run(&self) -> Vec<Value> {
        let max_depth = Runtime::config().max_source_depth;
        let resolver = SourceResolver::new(&self.context, self.collaborators.resolver.as_ref(), max_depth);

        let items = match resolver.resolve(&self.spec.items) {
            Ok(resolved) => {
                *self.writable.borrow_mut() = resolved.writable;
                resolved.items
            }
            Err(err) => {
                warn!(error = %err, "Unable to resolve pipeline source; using an empty one");
                *self.writable.borrow_mut() = None;
                Vec::new()
            }
        };

        let filtered = stages::filter(items, &self.spec.filters, self.collaborators.resolver.as_ref());

        match self.shape(filtered) {
            Ok(mapped) => stages::affix(self.spec.prepend.as_ref(), mapped, self.spec.append.as_ref()),
            Err(err) => {
                warn!(error = %err, "Pipeline callback failed; output is empty for this pass");
                Vec::new()
            }
        }
    }

    /// Sort, group and map.
    fn shape(&self, items: Vec<Value>) -> Result<Vec<Value>, CallbackError> {
        let resolver = self.collaborators.resolver.as_ref();
        let sorted = stages::sort(items, &self.spec.sort, resolver)?;
        let grouped = match &self.spec.group_by {
            Some(key) => stages::group(sorted, key, resolver)?,
            None => sorted,
        };
        stages::map(grouped, &self.spec.map, &self.collaborators)
    }
}

struct PipelineInner {
    key: String,
    output: Derived<Vec<Value>>,
    scope: Scope,
    writable: Rc<RefCell<Option<Cell<Value>>>>,
    mutable_fields: Vec<String>,
}

/// A reactive collection built from a [`PipelineSpec`].
///
/// Handles are cheap to clone and share one output.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trellis_core::pipeline::{
///     Accessor, Context, FilterOp, FilterRule, MapSpec, Pipeline, PipelineSpec, SortRule, Source,
/// };
/// use trellis_core::reactive::Cell;
///
/// let people = Cell::new(json!([
///     { "name": "Cara", "age": 30 },
///     { "name": "Bob", "age": 25 },
///     { "name": "Alice", "age": 30 },
/// ]));
///
/// let spec = PipelineSpec::new(Source::Cell(people.clone()))
///     .filter(FilterRule::path("age", FilterOp::Ge, 30))
///     .sort(SortRule::asc(Accessor::path("name")))
///     .map(MapSpec::fields([("n", Accessor::path("name"))]));
/// let pipeline = Pipeline::new(spec, Context::new(), "adults");
///
/// assert_eq!(pipeline.get(), vec![json!({ "n": "Alice" }), json!({ "n": "Cara" })]);
///
/// pipeline.set(vec![json!({ "name": "Dan", "age": 41 })]).unwrap();
/// assert_eq!(pipeline.get(), vec![json!({ "n": "Dan" })]);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    inner: Rc<PipelineInner>,
}

impl Pipeline {
    pub fn new(spec: PipelineSpec, context: Context, key: impl Into<String>) -> Self {
        Self::with_collaborators(spec, context, key, Collaborators::default())
    }

    /// Build a pipeline that resolves paths and renders templates through
    /// `collaborators`.
    pub fn with_collaborators(
        spec: PipelineSpec,
        context: Context,
        key: impl Into<String>,
        collaborators: Collaborators,
    ) -> Self {
        let key = key.into();
        let writable = Rc::new(RefCell::new(None));
        let mutable_fields = spec.map.mutable_fields();

        let stages = Stages {
            key: key.clone(),
            spec,
            context,
            collaborators,
            writable: Rc::clone(&writable),
        };
        let output = Derived::new(move || stages.run());

        let scope = Scope::new();
        scope.on_dispose({
            let output = output.clone();
            let writable = Rc::clone(&writable);
            move || {
                output.dispose();
                writable.borrow_mut().take();
            }
        });

        debug!(pipeline = %key, derived = %output.id(), "Pipeline created");

        Self {
            inner: Rc::new(PipelineInner {
                key,
                output,
                scope,
                writable,
                mutable_fields,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The current output, recomputed when stale.
    ///
    /// # Panics
    ///
    /// Unwinds like [`Derived::get`] when the pipeline reads itself.
    pub fn get(&self) -> Vec<Value> {
        self.inner.output.get()
    }

    pub fn try_get(&self) -> Result<Vec<Value>, PipelineError> {
        Ok(self.inner.output.try_get()?)
    }

    /// Write `items` through to the cell the source was read from.
    ///
    /// Only a source that resolves directly to a cell is writable; the
    /// pipeline's own configuration never changes.
    pub fn set(&self, items: Vec<Value>) -> Result<(), PipelineError> {
        if self.is_disposed() {
            return Err(PipelineError::Disposed {
                key: self.inner.key.clone(),
            });
        }

        // The source may resolve to a different cell since the last read.
        self.try_get()?;

        let cell = self.inner.writable.borrow().clone();
        match cell {
            Some(cell) => {
                cell.set(Value::Array(items));
                Ok(())
            }
            None => Err(PipelineError::ReadOnlySource {
                key: self.inner.key.clone(),
            }),
        }
    }

    /// Mapped field names whose value is computed per element by a
    /// callback. Literal and path fields depend on nothing but the element
    /// and are not included; see [`MapSpec::mutable_fields`].
    pub fn mutable_fields(&self) -> &[String] {
        &self.inner.mutable_fields
    }

    /// Run `f` with the output now and after every change, until the
    /// pipeline is disposed.
    pub fn watch(&self, f: impl Fn(&[Value]) + 'static) -> Effect {
        let output = self.inner.output.clone();
        Effect::new_in(&self.inner.scope, move || f(output.get().as_slice()))
    }

    /// The scope that owns the pipeline's effects and subscriptions.
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Tear down the pipeline's scope. The last output stays readable.
    /// Idempotent.
    pub fn dispose(&self) {
        if !self.inner.scope.is_disposed() {
            debug!(pipeline = %self.inner.key, "Pipeline disposed");
        }
        self.inner.scope.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.scope.is_disposed()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("key", &self.inner.key)
            .field("output", &self.inner.output)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::pipeline::{Accessor, Affix, FilterOp, FilterRule, MapSpec, SortRule, Source};
    use crate::reactive::flush;
    use serde_json::json;
    use std::cell::Cell as StdCell;

    fn people() -> Value {
        json!([
            { "name": "Alice", "age": 30 },
            { "name": "Bob", "age": 25 },
            { "name": "Cara", "age": 30 },
        ])
    }

    #[test]
    fn filter_sort_map() {
        let spec = PipelineSpec::new(Source::literal(people()))
            .filter(FilterRule::path("age", FilterOp::Ge, 30))
            .sort(SortRule::asc(Accessor::path("name")))
            .map(MapSpec::fields([("n", Accessor::path("name"))]));
        let pipeline = Pipeline::new(spec, Context::new(), "adults");

        assert_eq!(pipeline.get(), vec![json!({ "n": "Alice" }), json!({ "n": "Cara" })]);
    }

    #[test]
    fn group_and_count() {
        let spec = PipelineSpec::new(Source::literal(people()))
            .group_by(Accessor::path("age"))
            .map(MapSpec::fields([
                ("key", Accessor::path("key")),
                ("count", Accessor::path("items.length")),
            ]));
        let pipeline = Pipeline::new(spec, Context::new(), "by-age");

        assert_eq!(
            pipeline.get(),
            vec![json!({ "key": 30, "count": 2 }), json!({ "key": 25, "count": 1 })]
        );
    }

    #[test]
    fn affixes_stay_at_the_ends() {
        let spec = PipelineSpec::new(Source::literal(people()))
            .filter(FilterRule::path("age", FilterOp::Eq, 30))
            .sort(SortRule::desc(Accessor::path("name")))
            .map(MapSpec::fields([("n", Accessor::path("name"))]))
            .prepend(vec![json!({ "n": "HEADER" })])
            .append(vec![json!({ "n": "FOOTER" })]);
        let pipeline = Pipeline::new(spec, Context::new(), "framed");

        assert_eq!(
            pipeline.get(),
            vec![
                json!({ "n": "HEADER" }),
                json!({ "n": "Cara" }),
                json!({ "n": "Alice" }),
                json!({ "n": "FOOTER" }),
            ]
        );
    }

    #[test]
    fn cell_changes_invalidate_the_output() {
        let items = Cell::new(people());
        let spec = PipelineSpec::new(Source::Cell(items.clone()))
            .map(MapSpec::template("{{name}}"));
        let pipeline = Pipeline::new(spec, Context::new(), "names");

        assert_eq!(pipeline.get().len(), 3);
        items.set(json!([{ "name": "Zed" }]));
        assert_eq!(pipeline.get(), vec![json!("Zed")]);
    }

    #[test]
    fn computed_affixes_are_tracked() {
        let title = Cell::new(json!("Draft"));
        let spec = PipelineSpec::new(Source::literal(json!([1]))).prepend(Affix::computed({
            let title = title.clone();
            move || vec![title.get()]
        }));
        let pipeline = Pipeline::new(spec, Context::new(), "titled");

        assert_eq!(pipeline.get(), vec![json!("Draft"), json!(1)]);
        title.set(json!("Final"));
        assert_eq!(pipeline.get(), vec![json!("Final"), json!(1)]);
    }

    #[test]
    fn map_failure_empties_the_pass_and_recovers() {
        let items = Cell::new(json!([{ "name": "Alice" }, { "name": null }]));
        let spec = PipelineSpec::new(Source::Cell(items.clone())).map(MapSpec::fields([(
            "upper",
            Accessor::func(|item| {
                item["name"]
                    .as_str()
                    .map(|name| Value::from(name.to_uppercase()))
                    .ok_or_else(|| "name is not a string".into())
            }),
        )]))
        .append(vec![json!("FOOTER")]);
        let pipeline = Pipeline::new(spec, Context::new(), "upper");

        assert!(pipeline.get().is_empty());

        items.set(json!([{ "name": "Alice" }]));
        assert_eq!(pipeline.get(), vec![json!({ "upper": "ALICE" }), json!("FOOTER")]);
    }

    #[test]
    fn set_writes_through_to_the_source_cell() {
        let items = Cell::new(people());
        let pipeline = Pipeline::new(
            PipelineSpec::new(Source::Cell(items.clone())),
            Context::new(),
            "people",
        );

        pipeline.set(vec![json!({ "name": "Dan" })]).unwrap();
        assert_eq!(items.get(), json!([{ "name": "Dan" }]));
        assert_eq!(pipeline.get(), vec![json!({ "name": "Dan" })]);
    }

    #[test]
    fn set_follows_a_switched_function_source() {
        let a = Cell::new(json!([1]));
        let b = Cell::new(json!([2]));
        let use_b = Cell::new(false);
        let source = Source::function({
            let (a, b, use_b) = (a.clone(), b.clone(), use_b.clone());
            move || {
                if use_b.get() {
                    Source::Cell(b.clone())
                } else {
                    Source::Cell(a.clone())
                }
            }
        });
        let pipeline = Pipeline::new(PipelineSpec::new(source), Context::new(), "switch");
        assert_eq!(pipeline.get(), vec![json!(1)]);

        use_b.set(true);
        pipeline.set(vec![json!(99)]).unwrap();

        assert_eq!(a.get_untracked(), json!([1]));
        assert_eq!(b.get_untracked(), json!([99]));
        assert_eq!(pipeline.get(), vec![json!(99)]);
    }

    #[test]
    fn set_on_literal_source_is_rejected() {
        let pipeline = Pipeline::new(PipelineSpec::new(Source::literal(people())), Context::new(), "fixed");

        assert_eq!(
            pipeline.set(Vec::new()),
            Err(PipelineError::ReadOnlySource { key: "fixed".into() })
        );
    }

    #[test]
    fn mutable_fields_lists_callback_fields() {
        let spec = PipelineSpec::new(Source::literal(people())).map(MapSpec::fields([
            ("n", Accessor::path("name")),
            ("label", Accessor::func(|item| Ok(item["name"].clone()))),
            ("kind", Accessor::literal("person")),
        ]));
        let pipeline = Pipeline::new(spec, Context::new(), "fields");

        assert_eq!(pipeline.mutable_fields(), ["label".to_string()]);
    }

    #[test]
    fn dispose_is_idempotent_and_freezes_output() {
        let items = Cell::new(people());
        let pipeline = Pipeline::new(
            PipelineSpec::new(Source::Cell(items.clone())),
            Context::new(),
            "frozen",
        );
        assert_eq!(pipeline.get().len(), 3);

        pipeline.dispose();
        pipeline.dispose();

        assert!(pipeline.is_disposed());
        assert_eq!(items.dependent_count(), 0);
        items.set(json!([]));
        assert_eq!(pipeline.get().len(), 3);
        assert_eq!(
            pipeline.set(Vec::new()),
            Err(PipelineError::Disposed { key: "frozen".into() })
        );
    }

    #[test]
    fn watchers_stop_after_dispose() {
        let items = Cell::new(json!([1]));
        let pipeline = Pipeline::new(
            PipelineSpec::new(Source::Cell(items.clone())),
            Context::new(),
            "watched",
        );
        let seen = Rc::new(StdCell::new(0usize));
        let effect = pipeline.watch({
            let seen = seen.clone();
            move |items| seen.set(items.len())
        });
        assert_eq!(seen.get(), 1);

        items.set(json!([1, 2]));
        flush();
        assert_eq!(seen.get(), 2);

        pipeline.dispose();
        assert!(effect.is_disposed());
        items.set(json!([1, 2, 3]));
        flush();
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn pipelines_chain() {
        let items = Cell::new(people());
        let adults = Pipeline::new(
            PipelineSpec::new(Source::Cell(items.clone())).filter(FilterRule::path("age", FilterOp::Ge, 30)),
            Context::new(),
            "adults",
        );
        let names = Pipeline::new(
            PipelineSpec::new(Source::Pipeline(adults.clone())).map(MapSpec::template("{{name}}")),
            Context::new(),
            "adult-names",
        );

        assert_eq!(names.get(), vec![json!("Alice"), json!("Cara")]);
        items.set(json!([{ "name": "Eve", "age": 50 }]));
        assert_eq!(names.get(), vec![json!("Eve")]);
    }

    #[test]
    fn self_reading_pipeline_is_cyclic() {
        let slot: Rc<RefCell<Option<Pipeline>>> = Rc::new(RefCell::new(None));
        let spec = PipelineSpec::new(Source::function({
            let slot = slot.clone();
            move || match slot.borrow().clone() {
                Some(pipeline) => Source::Pipeline(pipeline),
                None => Source::literal(json!([])),
            }
        }));
        let pipeline = Pipeline::new(spec, Context::new(), "loop");
        *slot.borrow_mut() = Some(pipeline.clone());

        assert!(matches!(
            pipeline.try_get(),
            Err(PipelineError::Reactive(ReactiveError::CyclicDependency { .. }))
        ));

        slot.borrow_mut().take();
    }
}
