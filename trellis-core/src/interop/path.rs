//! Dotted property paths over JSON values.

use serde_json::Value;

use crate::error::PathError;

/// Resolves a dotted property path against a context value.
pub trait PathResolver {
    fn resolve(&self, context: &Value, path: &str) -> Result<Value, PathError>;
}

/// The default resolver.
///
/// Segments are separated by `.`. Objects are indexed by key, arrays by
/// position, and `length` reads the length of arrays and strings. An empty
/// path resolves to the context itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DottedPathResolver;

impl PathResolver for DottedPathResolver {
    fn resolve(&self, context: &Value, path: &str) -> Result<Value, PathError> {
        if path.is_empty() {
            return Ok(context.clone());
        }

        let segments: Vec<&str> = path.split('.').collect();
        let mut current = context;

        for (index, segment) in segments.iter().copied().enumerate() {
            let is_last = index + 1 == segments.len();
            let missing = || PathError::Missing {
                path: path.to_string(),
                segment: segment.to_string(),
            };
            let not_traversable = || PathError::NotTraversable {
                path: path.to_string(),
                segment: segment.to_string(),
            };

            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(missing)?,
                Value::Array(items) if segment == "length" => {
                    return if is_last {
                        Ok(Value::from(items.len()))
                    } else {
                        Err(not_traversable())
                    };
                }
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|position| items.get(position))
                    .ok_or_else(missing)?,
                Value::String(text) if segment == "length" => {
                    return if is_last {
                        Ok(Value::from(text.chars().count()))
                    } else {
                        Err(not_traversable())
                    };
                }
                _ => return Err(not_traversable()),
            };
        }

        Ok(current.clone())
    }
}
