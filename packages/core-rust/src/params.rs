//! Per-call parameters.
//!
//! [`Params`] travels with every service call. Its `query` is an open
//! key-value map whose shape is defined by the caller and the service; the
//! core only recognizes the control keys documented in [`crate::query`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServiceError, ServiceResult};

/// Open query map (field criteria plus `$`-prefixed control keys).
pub type Query = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Pagination policy
// ---------------------------------------------------------------------------

/// Pagination configuration: default page size and an upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaginateConfig {
    /// Page size used when the query carries no `$limit`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<usize>,
    /// Largest page size a caller may request.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max: Option<usize>,
}

impl PaginateConfig {
    #[must_use]
    pub fn new(default: usize, max: usize) -> Self {
        Self {
            default: Some(default),
            max: Some(max),
        }
    }

    /// Whether this configuration turns pagination on.
    ///
    /// Pagination is active only when a default page size is set.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.default.is_some()
    }
}

/// Per-call pagination choice.
///
/// On the wire this is `false` (disabled), `true` (service default), or a
/// [`PaginateConfig`] object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "PaginateRepr", into = "PaginateRepr")]
pub enum Paginate {
    /// Use whatever the service is configured with.
    #[default]
    ServiceDefault,
    /// Return a bare list for this call.
    Disabled,
    /// Override the service configuration for this call.
    Config(PaginateConfig),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PaginateRepr {
    Flag(bool),
    Config(PaginateConfig),
}

impl From<PaginateRepr> for Paginate {
    fn from(repr: PaginateRepr) -> Self {
        match repr {
            PaginateRepr::Flag(false) => Self::Disabled,
            PaginateRepr::Flag(true) => Self::ServiceDefault,
            PaginateRepr::Config(config) => Self::Config(config),
        }
    }
}

impl From<Paginate> for PaginateRepr {
    fn from(paginate: Paginate) -> Self {
        match paginate {
            Paginate::ServiceDefault => Self::Flag(true),
            Paginate::Disabled => Self::Flag(false),
            Paginate::Config(config) => Self::Config(config),
        }
    }
}

impl Paginate {
    /// Resolves the effective configuration for a call.
    ///
    /// Returns `None` when the call should produce a bare list.
    #[must_use]
    pub fn resolve(self, service_default: Option<PaginateConfig>) -> Option<PaginateConfig> {
        match self {
            Self::Disabled => None,
            Self::ServiceDefault => service_default.filter(PaginateConfig::is_enabled),
            Self::Config(config) => Some(config).filter(PaginateConfig::is_enabled),
        }
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Parameters accompanying every service call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Caller-supplied criteria and control keys.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub query: Query,
    /// Pagination choice for this call.
    pub paginate: Paginate,
    /// Name of the transport that originated the call; `None` for internal calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Params {
    /// Empty params: no criteria, service-default pagination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds params from a JSON query value.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::BadRequest` if `query` is neither an object nor null.
    pub fn from_query(query: Value) -> ServiceResult<Self> {
        match query {
            Value::Object(map) => Ok(Self {
                query: map,
                ..Self::default()
            }),
            Value::Null => Ok(Self::default()),
            other => Err(ServiceError::BadRequest(format!(
                "query must be an object, got {other}"
            ))),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_paginate(mut self, paginate: Paginate) -> Self {
        self.paginate = paginate;
        self
    }

    /// Disables pagination for this call.
    #[must_use]
    pub fn without_pagination(self) -> Self {
        self.with_paginate(Paginate::Disabled)
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}
