use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::{CrudError, Result};
use crate::model::OrderBy;

/// Equality used by `where` conditions. Numbers compare by value, so `42`
/// matches `42.0`.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Whether `item` satisfies every `where` pair. A condition on a field the
/// item does not have is a contract violation.
pub(crate) fn matches_where(item: &Map<String, Value>, where_: &Map<String, Value>) -> Result<bool> {
    for (field, expected) in where_ {
        let actual = item.get(field).ok_or_else(|| {
            CrudError::contract(format!("search condition names unknown field {}", field))
        })?;
        if !values_equal(actual, expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Total order over JSON values. `null` (and a missing field) sorts after
/// every other value, so it comes last ascending and first descending.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => type_rank(left)
            .cmp(&type_rank(right))
            .then_with(|| left.to_string().cmp(&right.to_string())),
    }
}

/// Compare two items key by key.
pub(crate) fn compare_by(
    left: &Map<String, Value>,
    right: &Map<String, Value>,
    order_by: &[OrderBy],
) -> Ordering {
    for key in order_by {
        let a = left.get(&key.field).unwrap_or(&Value::Null);
        let b = right.get(&key.field).unwrap_or(&Value::Null);
        let ordering = compare_values(a, b);
        let ordering = if key.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
