//! Pipeline Description
//!
//! The types a caller uses to describe a pipeline: where the items come
//! from, and the filter, sort, group, map and affix stages applied to them.
//! A [`PipelineSpec`] is consumed when the pipeline is built; the mapping
//! form in particular is fixed at that point.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use super::instance::Pipeline;
use super::value::{natural_cmp, values_equal};
use crate::error::CallbackError;
use crate::interop::PathResolver;
use crate::reactive::{Cell, Derived};

/// A per-item callback.
pub type ItemFn = Rc<dyn Fn(&Value) -> Result<Value, CallbackError>>;

/// A callback over the whole post-group sequence.
pub type CollectionFn = Rc<dyn Fn(&[Value]) -> Result<Vec<Value>, CallbackError>>;

/// Where a pipeline's items come from.
#[derive(Clone)]
pub enum Source {
    /// A fixed value, resolved once per recomputation.
    Literal(Value),
    /// A writable cell. The pipeline can write through to it.
    Cell(Cell<Value>),
    /// A derived value.
    Derived(Derived<Value>),
    /// Another pipeline's output.
    Pipeline(Pipeline),
    /// A function returning another source, resolved in turn.
    Function(Rc<dyn Fn() -> Source>),
    /// A dotted path resolved against the pipeline's [`Context`].
    Path(String),
}

impl Source {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn function(f: impl Fn() -> Source + 'static) -> Self {
        Self::Function(Rc::new(f))
    }
}

impl From<Cell<Value>> for Source {
    fn from(cell: Cell<Value>) -> Self {
        Self::Cell(cell)
    }
}

impl From<Derived<Value>> for Source {
    fn from(derived: Derived<Value>) -> Self {
        Self::Derived(derived)
    }
}

impl From<Pipeline> for Source {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(pipeline)
    }
}

impl From<Vec<Value>> for Source {
    fn from(items: Vec<Value>) -> Self {
        Self::Literal(Value::Array(items))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Cell(cell) => f.debug_tuple("Cell").field(&cell.id()).finish(),
            Self::Derived(derived) => f.debug_tuple("Derived").field(&derived.id()).finish(),
            Self::Pipeline(pipeline) => f.debug_tuple("Pipeline").field(&pipeline.key()).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// Named sources that `Source::Path` resolves against.
///
/// The first path segment selects an entry; the remaining segments are
/// resolved inside the entry's value.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: IndexMap<String, Source>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap each top-level field of a JSON object as a literal entry.
    ///
    /// Anything but an object gives an empty context.
    pub fn from_value(value: Value) -> Self {
        let entries = match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(name, value)| (name, Source::Literal(value)))
                .collect(),
            _ => IndexMap::new(),
        };
        Self { entries }
    }

    /// Add or replace an entry.
    pub fn with(mut self, name: impl Into<String>, source: impl Into<Source>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<Source>) {
        self.entries.insert(name.into(), source.into());
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.entries.get(name)
    }
}

/// How a value is read from an item.
///
/// Used for filter operands, sort and group keys, and mapped fields.
#[derive(Clone)]
pub enum Accessor {
    /// The same value for every item.
    Literal(Value),
    /// A dotted path into the item. Missing paths read as `null`.
    Path(String),
    /// A callback invoked with the item.
    Func(ItemFn),
}

impl Accessor {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn func(f: impl Fn(&Value) -> Result<Value, CallbackError> + 'static) -> Self {
        Self::Func(Rc::new(f))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Self::Func(_))
    }

    /// Read this accessor's value for `item`.
    pub fn read(&self, item: &Value, resolver: &dyn PathResolver) -> Result<Value, CallbackError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Path(path) => Ok(resolver.resolve(item, path).unwrap_or(Value::Null)),
            Self::Func(f) => f(item),
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Comparison applied by a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    StartsWith,
    EndsWith,
    /// Substring for strings, membership for arrays.
    Contains,
}

impl FilterOp {
    /// Apply the operator. Incomparable operands never match, except for
    /// `Ne`, which holds whenever `Eq` does not.
    pub fn apply(self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};

        match self {
            Self::Eq => values_equal(left, right),
            Self::Ne => !values_equal(left, right),
            Self::Lt => natural_cmp(left, right) == Some(Less),
            Self::Le => matches!(natural_cmp(left, right), Some(Less | Equal)),
            Self::Gt => natural_cmp(left, right) == Some(Greater),
            Self::Ge => matches!(natural_cmp(left, right), Some(Greater | Equal)),
            Self::StartsWith => match (left, right) {
                (Value::String(left), Value::String(right)) => left.starts_with(right.as_str()),
                _ => false,
            },
            Self::EndsWith => match (left, right) {
                (Value::String(left), Value::String(right)) => left.ends_with(right.as_str()),
                _ => false,
            },
            Self::Contains => match (left, right) {
                (Value::String(left), Value::String(right)) => left.contains(right.as_str()),
                (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown operator. operator: '{0}'")]
pub struct UnknownOperator(pub String);

impl FromStr for FilterOp {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" | "eq" => Self::Eq,
            "!=" | "ne" => Self::Ne,
            "<" | "lt" => Self::Lt,
            "<=" | "le" => Self::Le,
            ">" | "gt" => Self::Gt,
            ">=" | "ge" => Self::Ge,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "contains" => Self::Contains,
            other => return Err(UnknownOperator(other.to_string())),
        })
    }
}

/// One filter condition. An item survives when every rule matches.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub left: Accessor,
    pub op: FilterOp,
    pub right: Accessor,
}

impl FilterRule {
    pub fn new(left: Accessor, op: FilterOp, right: Accessor) -> Self {
        Self { left, op, right }
    }

    /// Compare the value at `path` with a literal.
    pub fn path(path: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self::new(Accessor::path(path), op, Accessor::literal(value))
    }

    pub fn matches(&self, item: &Value, resolver: &dyn PathResolver) -> Result<bool, CallbackError> {
        let left = self.left.read(item, resolver)?;
        let right = self.right.read(item, resolver)?;
        Ok(self.op.apply(&left, &right))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// One sort key. Ties fall through to the next rule.
#[derive(Debug, Clone)]
pub struct SortRule {
    pub key: Accessor,
    pub direction: SortDirection,
}

impl SortRule {
    pub fn asc(key: Accessor) -> Self {
        Self {
            key,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(key: Accessor) -> Self {
        Self {
            key,
            direction: SortDirection::Descending,
        }
    }
}

/// How each surviving element becomes an output value.
#[derive(Clone, Default)]
pub enum MapSpec {
    /// Elements pass through unchanged.
    #[default]
    Identity,
    /// Each element renders a template through the expression evaluator.
    Template(String),
    /// Each element becomes an object with these fields, in order.
    Fields(IndexMap<String, Accessor>),
    /// Every element maps to the same value.
    Constant(Value),
    /// One callback transforms the whole sequence.
    Collection(CollectionFn),
}

impl MapSpec {
    pub fn template(template: impl Into<String>) -> Self {
        Self::Template(template.into())
    }

    pub fn fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Accessor)>,
        K: Into<String>,
    {
        Self::Fields(
            fields
                .into_iter()
                .map(|(name, accessor)| (name.into(), accessor))
                .collect(),
        )
    }

    pub fn collection(
        f: impl Fn(&[Value]) -> Result<Vec<Value>, CallbackError> + 'static,
    ) -> Self {
        Self::Collection(Rc::new(f))
    }

    /// Names of mapped fields computed per element by a callback.
    ///
    /// A path field reads only the element it is applied to, so its value is
    /// fixed once the element is mapped and it counts as a one-time field.
    /// A callback may read cells or other outside state, so its field can
    /// change while the element stays the same. Literal fields never change.
    pub fn mutable_fields(&self) -> Vec<String> {
        match self {
            Self::Fields(fields) => fields
                .iter()
                .filter(|(_, accessor)| accessor.is_func())
                .map(|(name, _)| name.clone())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for MapSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Collection(_) => f.write_str("Collection(..)"),
        }
    }
}

/// Entries placed before or after the mapped sequence.
#[derive(Clone)]
pub enum Affix {
    Static(Vec<Value>),
    /// Evaluated on every recomputation; reads are tracked.
    Computed(Rc<dyn Fn() -> Vec<Value>>),
}

impl Affix {
    pub fn computed(f: impl Fn() -> Vec<Value> + 'static) -> Self {
        Self::Computed(Rc::new(f))
    }

    pub fn resolve(&self) -> Vec<Value> {
        match self {
            Self::Static(items) => items.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl From<Vec<Value>> for Affix {
    fn from(items: Vec<Value>) -> Self {
        Self::Static(items)
    }
}

impl fmt::Debug for Affix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(items) => f.debug_tuple("Static").field(items).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A complete pipeline description.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub items: Source,
    pub filters: Vec<FilterRule>,
    pub sort: Vec<SortRule>,
    pub group_by: Option<Accessor>,
    pub map: MapSpec,
    pub prepend: Option<Affix>,
    pub append: Option<Affix>,
}

impl PipelineSpec {
    pub fn new(items: impl Into<Source>) -> Self {
        Self {
            items: items.into(),
            filters: Vec::new(),
            sort: Vec::new(),
            group_by: None,
            map: MapSpec::Identity,
            prepend: None,
            append: None,
        }
    }

    pub fn filter(mut self, rule: FilterRule) -> Self {
        self.filters.push(rule);
        self
    }

    pub fn sort(mut self, rule: SortRule) -> Self {
        self.sort.push(rule);
        self
    }

    pub fn group_by(mut self, key: Accessor) -> Self {
        self.group_by = Some(key);
        self
    }

    pub fn map(mut self, map: MapSpec) -> Self {
        self.map = map;
        self
    }

    pub fn prepend(mut self, affix: impl Into<Affix>) -> Self {
        self.prepend = Some(affix.into());
        self
    }

    pub fn append(mut self, affix: impl Into<Affix>) -> Self {
        self.append = Some(affix.into());
        self
    }
}
