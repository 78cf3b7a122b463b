//! Source resolution.
//!
//! Turns a [`Source`] into the items a pipeline pass works on. Cells and
//! derived values are read with `get`, so when resolution runs inside the
//! pipeline's own evaluation their changes invalidate the pipeline.

use serde_json::Value;
use tracing::warn;

use super::spec::{Context, Source};
use crate::error::{PathError, SourceError};
use crate::interop::PathResolver;
use crate::reactive::Cell;

/// The outcome of resolving a source for one pass.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub items: Vec<Value>,
    /// The cell the items were read from, when they came straight from one.
    pub writable: Option<Cell<Value>>,
}

pub(crate) struct SourceResolver<'a> {
    context: &'a Context,
    resolver: &'a dyn PathResolver,
    max_depth: usize,
}

impl<'a> SourceResolver<'a> {
    pub fn new(context: &'a Context, resolver: &'a dyn PathResolver, max_depth: usize) -> Self {
        Self {
            context,
            resolver,
            max_depth,
        }
    }

    /// Resolve `source` into items.
    ///
    /// A value that is not an array is logged and treated as empty.
    pub fn resolve(&self, source: &Source) -> Result<Resolved, SourceError> {
        let (value, writable) = self.resolve_value(source, 0)?;
        match value {
            Value::Array(items) => Ok(Resolved { items, writable }),
            other => {
                warn!(
                    source = ?source,
                    kind = kind_of(&other),
                    "Pipeline source is not a collection; using an empty one"
                );
                Ok(Resolved {
                    items: Vec::new(),
                    writable,
                })
            }
        }
    }

    fn resolve_value(
        &self,
        source: &Source,
        depth: usize,
    ) -> Result<(Value, Option<Cell<Value>>), SourceError> {
        if depth > self.max_depth {
            return Err(SourceError::TooDeep { depth });
        }

        match source {
            Source::Literal(value) => Ok((value.clone(), None)),
            Source::Cell(cell) => Ok((cell.get(), Some(cell.clone()))),
            Source::Derived(derived) => Ok((derived.get(), None)),
            Source::Pipeline(pipeline) => Ok((Value::Array(pipeline.get()), None)),
            Source::Function(f) => self.resolve_value(&f(), depth + 1),
            Source::Path(path) => self.resolve_path(path, depth),
        }
    }

    fn resolve_path(
        &self,
        path: &str,
        depth: usize,
    ) -> Result<(Value, Option<Cell<Value>>), SourceError> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let entry = self.context.get(head).ok_or_else(|| PathError::Missing {
            path: path.to_string(),
            segment: head.to_string(),
        })?;
        let (value, writable) = self.resolve_value(entry, depth + 1)?;

        match rest {
            None => Ok((value, writable)),
            Some(rest) => Ok((self.resolver.resolve(&value, rest)?, None)),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::DottedPathResolver;
    use crate::reactive::Derived;
    use serde_json::json;

    fn resolve(source: &Source, context: &Context) -> Result<Resolved, SourceError> {
        SourceResolver::new(context, &DottedPathResolver, 4).resolve(source)
    }

    #[test]
    fn literal_and_derived_are_read_only() {
        let context = Context::new();

        let literal = resolve(&Source::literal(json!([1, 2])), &context).unwrap();
        assert_eq!(literal.items, vec![json!(1), json!(2)]);
        assert!(literal.writable.is_none());

        let derived = Derived::new(|| json!([3]));
        let resolved = resolve(&Source::Derived(derived), &context).unwrap();
        assert_eq!(resolved.items, vec![json!(3)]);
        assert!(resolved.writable.is_none());
    }

    #[test]
    fn cells_are_writable() {
        let cell = Cell::new(json!(["a"]));
        let resolved = resolve(&Source::Cell(cell.clone()), &Context::new()).unwrap();

        assert_eq!(resolved.items, vec![json!("a")]);
        assert_eq!(resolved.writable.map(|c| c.id()), Some(cell.id()));
    }

    #[test]
    fn functions_resolve_to_their_result() {
        let cell = Cell::new(json!([1]));
        let source = Source::function({
            let cell = cell.clone();
            move || Source::Cell(cell.clone())
        });

        let resolved = resolve(&source, &Context::new()).unwrap();
        assert_eq!(resolved.items, vec![json!(1)]);
        assert!(resolved.writable.is_some());
    }

    #[test]
    fn paths_resolve_against_the_context() {
        let people = Cell::new(json!([{ "name": "Alice" }]));
        let context = Context::from_value(json!({ "data": { "rows": [1, 2, 3] } }))
            .with("people", people.clone());

        let nested = resolve(&Source::path("data.rows"), &context).unwrap();
        assert_eq!(nested.items.len(), 3);
        assert!(nested.writable.is_none());

        let whole = resolve(&Source::path("people"), &context).unwrap();
        assert_eq!(whole.writable.map(|c| c.id()), Some(people.id()));
    }

    #[test]
    fn unknown_entries_fail() {
        assert!(matches!(
            resolve(&Source::path("missing.rows"), &Context::new()),
            Err(SourceError::Path(PathError::Missing { .. }))
        ));
    }

    #[test]
    fn non_collections_become_empty() {
        let resolved = resolve(&Source::literal(json!({ "a": 1 })), &Context::new()).unwrap();
        assert!(resolved.items.is_empty());
    }

    #[test]
    fn nesting_is_bounded() {
        fn endless() -> Source {
            Source::function(endless)
        }

        assert!(matches!(
            resolve(&endless(), &Context::new()),
            Err(SourceError::TooDeep { .. })
        ));
    }
}
