//! Single-or-many data payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data passed to `create`, and its result.
///
/// The result of `create` mirrors the input: one record in, one record out;
/// a list in, a list out. Serializes untagged (an object or an array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Many(Vec<Value>),
    One(Value),
}

impl Payload {
    /// Wraps a JSON value, treating arrays as [`Payload::Many`].
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Many(items),
            other => Self::One(other),
        }
    }

    #[must_use]
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Many(items) => items.len(),
            Self::One(_) => 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The records, whatever the shape.
    #[must_use]
    pub fn records(&self) -> &[Value] {
        match self {
            Self::Many(items) => items,
            Self::One(item) => std::slice::from_ref(item),
        }
    }

    /// Rebuilds a payload of the same shape as `self` from `records`.
    ///
    /// A `One` shape with no records yields `Value::Null`.
    #[must_use]
    pub fn reshape(&self, records: Vec<Value>) -> Self {
        match self {
            Self::Many(_) => Self::Many(records),
            Self::One(_) => Self::One(records.into_iter().next().unwrap_or(Value::Null)),
        }
    }

    /// Converts into a plain JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Many(items) => Value::Array(items),
            Self::One(item) => item,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Vec<Value>> for Payload {
    fn from(items: Vec<Value>) -> Self {
        Self::Many(items)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn shape_follows_input() {
        let one = Payload::from(json!({ "a": 1 }));
        assert!(!one.is_many());
        assert_eq!(one.len(), 1);
        assert_eq!(one.records(), &[json!({ "a": 1 })]);

        let many = Payload::from(json!([{ "a": 1 }, { "a": 2 }]));
        assert!(many.is_many());
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn reshape_keeps_cardinality() {
        let one = Payload::One(json!({}));
        assert_eq!(one.reshape(vec![json!({ "id": 1 })]), Payload::One(json!({ "id": 1 })));

        let many = Payload::Many(vec![json!({}), json!({})]);
        let out = many.reshape(vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        assert_eq!(out.into_value(), json!([{ "id": 1 }, { "id": 2 }]));
    }

    #[test]
    fn untagged_wire_form() {
        let p: Payload = serde_json::from_value(json!([{ "x": 1 }])).unwrap();
        assert!(p.is_many());
        let p: Payload = serde_json::from_value(json!({ "x": 1 })).unwrap();
        assert_eq!(p, Payload::One(json!({ "x": 1 })));
    }
}
