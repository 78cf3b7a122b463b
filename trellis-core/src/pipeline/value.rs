//! Natural ordering and equality of JSON values.
//!
//! Numbers compare numerically regardless of representation, so `30` and
//! `30.0` are equal. Filters use the partial order: values of different
//! types are incomparable and every ordering test on them fails. Sorting
//! needs a total order and ranks types as
//! `null < bool < number < string < array < object`; arrays and objects are
//! equal among themselves, so a stable sort keeps their input order.

use std::cmp::Ordering;

use serde_json::Value;

/// Natural order of two values of the same type.
pub fn natural_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality with numeric normalization.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => natural_cmp(a, b) == Some(Ordering::Equal),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
        }
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used by the sort stage.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    natural_cmp(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

/// A string that identifies a value for grouping.
///
/// Values that compare equal map to the same key, so `30` and `30.0` land
/// in one group.
pub fn group_key(value: &Value) -> String {
    match value {
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(int), _) => int.to_string(),
            (None, Some(float)) if float.fract() == 0.0 && float.abs() < 9.0e15 => {
                format!("{}", float as i64)
            }
            _ => number.to_string(),
        },
        other => other.to_string(),
    }
}
