//! Service method vocabulary and capability sets.
//!
//! Every service exposes some subset of six methods. The subset is carried
//! explicitly as a [`Methods`] bitmask and checked before dispatch, so an
//! absent method is distinguishable from one that is present but failing.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// One of the six service methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// List resources matching a query.
    Find,
    /// Fetch a single resource by id.
    Get,
    /// Create one or many resources.
    Create,
    /// Replace a resource (or a query-selected set) entirely.
    Update,
    /// Merge into a resource (or a query-selected set).
    Patch,
    /// Delete a resource (or a query-selected set).
    Remove,
}

impl Method {
    /// All methods in canonical order.
    pub const ALL: [Method; 6] = [
        Method::Find,
        Method::Get,
        Method::Create,
        Method::Update,
        Method::Patch,
        Method::Remove,
    ];

    /// Lowercase method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Remove => "remove",
        }
    }

    /// Whether a successful call mutates the backing resource.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Patch | Self::Remove)
    }

    /// Name of the event emitted after a successful call, if any.
    ///
    /// `find` and `get` never emit.
    #[must_use]
    pub const fn event_name(self) -> Option<&'static str> {
        match self {
            Self::Create => Some("created"),
            Self::Update => Some("updated"),
            Self::Patch => Some("patched"),
            Self::Remove => Some("removed"),
            Self::Find | Self::Get => None,
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ServiceError::BadRequest(format!("unknown service method `{s}`")))
    }
}

// ---------------------------------------------------------------------------
// Methods (capability set)
// ---------------------------------------------------------------------------

/// Set of methods a service implements.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Methods(u8);

impl Methods {
    /// No methods.
    pub const NONE: Methods = Methods(0);

    /// All six methods.
    pub const ALL: Methods = Methods(0b11_1111);

    /// `find` and `get` only.
    pub const READ: Methods = Methods::NONE.with(Method::Find).with(Method::Get);

    /// Returns this set with `method` added.
    #[must_use]
    pub const fn with(self, method: Method) -> Self {
        Self(self.0 | method.bit())
    }

    /// Returns this set with `method` removed.
    #[must_use]
    pub const fn without(self, method: Method) -> Self {
        Self(self.0 & !method.bit())
    }

    /// Whether `method` is in the set.
    #[must_use]
    pub const fn contains(self, method: Method) -> bool {
        self.0 & method.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates the contained methods in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Method> {
        Method::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<Method> for Methods {
    fn from(method: Method) -> Self {
        Methods::NONE.with(method)
    }
}

impl FromIterator<Method> for Methods {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        iter.into_iter().fold(Methods::NONE, Methods::with)
    }
}

impl BitOr for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Self) -> Self::Output {
        Methods(self.0 | rhs.0)
    }
}

impl BitOr<Method> for Methods {
    type Output = Methods;

    fn bitor(self, rhs: Method) -> Self::Output {
        self.with(rhs)
    }
}

impl Serialize for Methods {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Methods {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let methods = Vec::<Method>::deserialize(deserializer)?;
        Ok(methods.into_iter().collect())
    }
}
