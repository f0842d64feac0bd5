//! Evaluation of Mongo-style filters and sorts over JSON documents

use crate::core::model::parse_date;
use crate::core::query::{SortDirection, SortSpec};
use serde_json::Value;
use std::cmp::Ordering;

/// Look up a dotted path; arrays along the way yield every element's value
pub fn lookup(doc: &Value, path: &str) -> Vec<Value> {
    let mut current = vec![doc.clone()];
    for segment in path.split('.') {
        current = current
            .into_iter()
            .flat_map(|value| match value {
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| item.get(segment).cloned())
                    .collect::<Vec<_>>(),
                Value::Object(mut map) => map.remove(segment).into_iter().collect(),
                _ => Vec::new(),
            })
            .collect();
    }
    current
}

/// Does `doc` satisfy `filter`?
pub fn matches(doc: &Value, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return true;
    };
    conditions.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition
            .as_array()
            .is_some_and(|subs| subs.iter().all(|sub| matches(doc, sub))),
        "$or" => condition
            .as_array()
            .is_some_and(|subs| subs.iter().any(|sub| matches(doc, sub))),
        path => matches_condition(&lookup(doc, path), condition),
    })
}

fn is_operator_object(condition: &Value) -> bool {
    condition
        .as_object()
        .is_some_and(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
}

fn matches_condition(values: &[Value], condition: &Value) -> bool {
    if !is_operator_object(condition) {
        return equals_any(values, condition);
    }
    let Some(ops) = condition.as_object() else {
        return false;
    };
    ops.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => equals_any(values, operand),
        "$ne" => !equals_any(values, operand),
        "$in" => operand
            .as_array()
            .is_some_and(|options| options.iter().any(|o| equals_any(values, o))),
        "$nin" => operand
            .as_array()
            .is_some_and(|options| !options.iter().any(|o| equals_any(values, o))),
        "$exists" => operand.as_bool().unwrap_or(true) == values.iter().any(|v| !v.is_null()),
        "$gt" => compare_any(values, operand, |o| o == Ordering::Greater),
        "$gte" => compare_any(values, operand, |o| o != Ordering::Less),
        "$lt" => compare_any(values, operand, |o| o == Ordering::Less),
        "$lte" => compare_any(values, operand, |o| o != Ordering::Greater),
        _ => false,
    })
}

/// Equality with array-contains semantics; a missing field equals null
fn equals_any(values: &[Value], expected: &Value) -> bool {
    if values.is_empty() {
        return expected.is_null();
    }
    values.iter().any(|value| match value {
        Value::Array(items) if !expected.is_array() => items.iter().any(|i| scalar_eq(i, expected)),
        other => scalar_eq(other, expected),
    })
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) if x != y => {
            matches!((parse_date(x), parse_date(y)), (Some(dx), Some(dy)) if dx == dy)
        }
        _ => a == b,
    }
}

fn compare_any(values: &[Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    values.iter().any(|value| match value {
        Value::Array(items) => items
            .iter()
            .any(|i| compare_scalars(i, operand).is_some_and(&accept)),
        other => compare_scalars(other, operand).is_some_and(&accept),
    })
}

fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_date(x), parse_date(y)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting: nulls first, then by type, then by value
///
/// Strings that parse as dates sort chronologically ahead of all other
/// strings, which sort lexicographically.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => compare_strings(x, y),
        (Some(x), Some(y)) => {
            compare_scalars(x, y).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_strings(x: &str, y: &str) -> Ordering {
    match (parse_date(x), parse_date(y)) {
        (Some(dx), Some(dy)) => dx.cmp(&dy).then_with(|| x.cmp(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => x.cmp(y),
    }
}

/// Sort documents in place by a sort spec
pub fn sort_documents(docs: &mut [Value], sort: &SortSpec) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, direction) in &sort.0 {
            let left = lookup(a, field);
            let right = lookup(b, field);
            let ordering = compare_values(left.first(), right.first());
            let ordering = match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
