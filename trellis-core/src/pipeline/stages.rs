//! The five pipeline stages.
//!
//! Each stage is a plain function over owned items. The pipeline runs them in
//! a fixed order: filter, sort, group, map, affix.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::spec::{Accessor, Affix, FilterRule, MapSpec, SortDirection, SortRule};
use super::value::{group_key, total_cmp};
use crate::error::CallbackError;
use crate::interop::{Collaborators, PathResolver};

/// Keep the items that satisfy every rule.
///
/// An item whose rule evaluation fails is dropped. Failures are reported in
/// a single warning per call.
pub(crate) fn filter(
    items: Vec<Value>,
    rules: &[FilterRule],
    resolver: &dyn PathResolver,
) -> Vec<Value> {
    if rules.is_empty() {
        return items;
    }

    let mut failures = 0usize;
    let mut first_failure: Option<CallbackError> = None;

    let kept = items
        .into_iter()
        .filter(|item| {
            for rule in rules {
                match rule.matches(item, resolver) {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(err) => {
                        failures += 1;
                        if first_failure.is_none() {
                            first_failure = Some(err);
                        }
                        return false;
                    }
                }
            }
            true
        })
        .collect();

    if let Some(err) = first_failure {
        warn!(failures, error = %err, "Filter rule failed; items excluded");
    }

    kept
}

/// Stable multi-key sort. Keys are read once per item.
pub(crate) fn sort(
    items: Vec<Value>,
    rules: &[SortRule],
    resolver: &dyn PathResolver,
) -> Result<Vec<Value>, CallbackError> {
    if rules.is_empty() || items.len() < 2 {
        return Ok(items);
    }

    let mut keyed = items
        .into_iter()
        .map(|item| -> Result<_, CallbackError> {
            let keys = rules
                .iter()
                .map(|rule| rule.key.read(&item, resolver))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((keys, item))
        })
        .collect::<Result<Vec<_>, _>>()?;

    keyed.sort_by(|(a, _), (b, _)| compare_keys(rules, a, b));

    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

fn compare_keys(rules: &[SortRule], a: &[Value], b: &[Value]) -> Ordering {
    rules
        .iter()
        .zip(a.iter().zip(b))
        .map(|(rule, (a, b))| match rule.direction {
            SortDirection::Ascending => total_cmp(a, b),
            SortDirection::Descending => total_cmp(b, a),
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Partition items by key, in order of first appearance.
///
/// Each group becomes `{"key": key, "items": [..]}`.
pub(crate) fn group(
    items: Vec<Value>,
    key: &Accessor,
    resolver: &dyn PathResolver,
) -> Result<Vec<Value>, CallbackError> {
    let mut groups: IndexMap<String, (Value, Vec<Value>)> = IndexMap::new();

    for item in items {
        let value = key.read(&item, resolver)?;
        groups
            .entry(group_key(&value))
            .or_insert_with(|| (value, Vec::new()))
            .1
            .push(item);
    }

    Ok(groups
        .into_values()
        .map(|(key, items)| json!({ "key": key, "items": items }))
        .collect())
}

/// Transform the elements with the mapping form.
///
/// The first failing callback aborts the whole stage.
pub(crate) fn map(
    items: Vec<Value>,
    spec: &MapSpec,
    collaborators: &Collaborators,
) -> Result<Vec<Value>, CallbackError> {
    match spec {
        MapSpec::Identity => Ok(items),
        MapSpec::Template(template) => items
            .iter()
            .map(|item| -> Result<Value, CallbackError> {
                let rendered = collaborators.evaluator.evaluate(template, item)?;
                Ok(Value::String(rendered))
            })
            .collect(),
        MapSpec::Fields(fields) => items
            .iter()
            .map(|item| -> Result<Value, CallbackError> {
                let mut object = Map::with_capacity(fields.len());
                for (name, accessor) in fields {
                    let value = accessor.read(item, collaborators.resolver.as_ref())?;
                    object.insert(name.clone(), value);
                }
                Ok(Value::Object(object))
            })
            .collect(),
        MapSpec::Constant(value) => Ok(vec![value.clone(); items.len()]),
        MapSpec::Collection(f) => f(&items),
    }
}

/// Place the affix entries around the mapped sequence.
pub(crate) fn affix(
    prepend: Option<&Affix>,
    mapped: Vec<Value>,
    append: Option<&Affix>,
) -> Vec<Value> {
    if prepend.is_none() && append.is_none() {
        return mapped;
    }

    let mut output = prepend.map(Affix::resolve).unwrap_or_default();
    output.extend(mapped);
    if let Some(append) = append {
        output.extend(append.resolve());
    }
    output
}
