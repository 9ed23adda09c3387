//! Resource identifiers.
//!
//! Services address single resources by an [`Id`], which is either an integer
//! or a string. Operations that support bulk semantics (`update`, `patch`,
//! `remove`) take an `Option<Id>`, where `None` selects every resource
//! matching the call's query.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a single resource within a service.
///
/// Serializes untagged, so `Id::Int(1)` is the JSON number `1` and
/// `Id::Str("a")` is the JSON string `"a"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Integer identifier (e.g. an auto-increment key).
    Int(i64),
    /// String identifier (e.g. a UUID or slug).
    Str(String),
}

impl Id {
    /// Reads an identifier out of a JSON value.
    ///
    /// Returns `None` for anything that is not an integer or a string. Floats
    /// with no fractional part are accepted as integers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Int).or_else(|| {
                n.as_f64().and_then(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let int = f as i64;
                    #[allow(clippy::cast_precision_loss)]
                    let exact = (int as f64 - f).abs() < f64::EPSILON;
                    exact.then_some(Self::Int(int))
                })
            }),
            _ => None,
        }
    }

    /// Parses an identifier that arrived as text (for example a path segment).
    ///
    /// Text that is a valid `i64` becomes [`Id::Int`]; anything else stays a string.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        text.parse::<i64>()
            .map_or_else(|_| Self::Str(text.to_string()), Self::Int)
    }

    /// Converts the identifier into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Id {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
