//! Predicates over JSON documents.
//!
//! Field names are dotted paths (`album.id`). A field holding JSON `null` is
//! treated the same as a missing field.

use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Eq(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    Exists(String),
    Absent(String),
    /// Some element of the array at `array` has `field` equal to `value`.
    AnyEq {
        array: String,
        field: String,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn exists(field: &str) -> Self {
        Filter::Exists(field.to_string())
    }

    pub fn absent(field: &str) -> Self {
        Filter::Absent(field.to_string())
    }

    pub fn any_eq(array: &str, field: &str, value: impl Into<Value>) -> Self {
        Filter::AnyEq {
            array: array.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            Filter::All => other,
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Evaluates the predicate in memory.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => {
                lookup(doc, field).map_or(false, |v| compare(v, value) == Some(Ordering::Equal))
            }
            Filter::Lt(field, value) => {
                lookup(doc, field).map_or(false, |v| compare(v, value) == Some(Ordering::Less))
            }
            Filter::Lte(field, value) => lookup(doc, field).map_or(false, |v| {
                matches!(compare(v, value), Some(Ordering::Less | Ordering::Equal))
            }),
            Filter::Gte(field, value) => lookup(doc, field).map_or(false, |v| {
                matches!(compare(v, value), Some(Ordering::Greater | Ordering::Equal))
            }),
            Filter::In(field, values) => lookup(doc, field).map_or(false, |v| {
                values.iter().any(|candidate| compare(v, candidate) == Some(Ordering::Equal))
            }),
            Filter::Exists(field) => lookup(doc, field).is_some(),
            Filter::Absent(field) => lookup(doc, field).is_none(),
            Filter::AnyEq { array, field, value } => lookup(doc, array)
                .and_then(Value::as_array)
                .map_or(false, |items| {
                    items.iter().any(|item| {
                        lookup(item, field)
                            .map_or(false, |v| compare(v, value) == Some(Ordering::Equal))
                    })
                }),
            Filter::And(parts) => parts.iter().all(|p| p.matches(doc)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(doc)),
        }
    }
}

/// Resolves a dotted path, skipping `null`.
pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

/// Orders values of the same JSON type; mixed types do not compare.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
