//! Call and response types carried through the dispatch pipeline.

use serde::Serialize;
use serde_json::Value;
use tern_core::{FindResult, Id, Method, Params, Payload, ServiceError, ServiceResult};

// ---------------------------------------------------------------------------
// ServiceCall
// ---------------------------------------------------------------------------

/// One invocation of a service method, with its arguments.
///
/// `get` requires an id; `update`, `patch` and `remove` take `None` to act
/// on every record matching the query.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCall {
    Find {
        params: Params,
    },
    Get {
        id: Id,
        params: Params,
    },
    Create {
        data: Payload,
        params: Params,
    },
    Update {
        id: Option<Id>,
        data: Value,
        params: Params,
    },
    Patch {
        id: Option<Id>,
        data: Value,
        params: Params,
    },
    Remove {
        id: Option<Id>,
        params: Params,
    },
}

impl ServiceCall {
    /// Assembles a call from loosely typed parts, as a transport receives them.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::BadRequest` when `get` has no id, or when
    /// `create`, `update` or `patch` have no data.
    pub fn from_parts(
        method: Method,
        id: Option<Id>,
        data: Option<Value>,
        params: Params,
    ) -> ServiceResult<Self> {
        let require_data = |data: Option<Value>| {
            data.ok_or_else(|| ServiceError::BadRequest(format!("`{method}` requires data")))
        };
        Ok(match method {
            Method::Find => Self::Find { params },
            Method::Get => Self::Get {
                id: id.ok_or_else(|| ServiceError::BadRequest("`get` requires an id".to_string()))?,
                params,
            },
            Method::Create => Self::Create {
                data: Payload::from_value(require_data(data)?),
                params,
            },
            Method::Update => Self::Update {
                id,
                data: require_data(data)?,
                params,
            },
            Method::Patch => Self::Patch {
                id,
                data: require_data(data)?,
                params,
            },
            Method::Remove => Self::Remove { id, params },
        })
    }

    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::Find { .. } => Method::Find,
            Self::Get { .. } => Method::Get,
            Self::Create { .. } => Method::Create,
            Self::Update { .. } => Method::Update,
            Self::Patch { .. } => Method::Patch,
            Self::Remove { .. } => Method::Remove,
        }
    }

    /// Target id of an id-addressed call; `None` for `find`, `create` and
    /// bulk calls.
    #[must_use]
    pub fn id(&self) -> Option<&Id> {
        match self {
            Self::Get { id, .. } => Some(id),
            Self::Update { id, .. } | Self::Patch { id, .. } | Self::Remove { id, .. } => {
                id.as_ref()
            }
            Self::Find { .. } | Self::Create { .. } => None,
        }
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        match self {
            Self::Find { params }
            | Self::Get { params, .. }
            | Self::Create { params, .. }
            | Self::Update { params, .. }
            | Self::Patch { params, .. }
            | Self::Remove { params, .. } => params,
        }
    }

    pub fn params_mut(&mut self) -> &mut Params {
        match self {
            Self::Find { params }
            | Self::Get { params, .. }
            | Self::Create { params, .. }
            | Self::Update { params, .. }
            | Self::Patch { params, .. }
            | Self::Remove { params, .. } => params,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceResponse
// ---------------------------------------------------------------------------

/// Successful result of a [`ServiceCall`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceResponse {
    /// Result of `find`.
    Found(FindResult),
    /// Result of `create`, shaped like its input.
    Created(Payload),
    /// Result of `get`, `update`, `patch` or `remove`.
    Record(Value),
}

impl ServiceResponse {
    /// Number of records carried. A bulk `update`, `patch` or `remove`
    /// counts its array elements.
    #[must_use]
    pub fn record_count(&self) -> usize {
        match self {
            Self::Found(found) => found.data().len(),
            Self::Created(payload) => payload.len(),
            Self::Record(Value::Array(items)) => items.len(),
            Self::Record(_) => 1,
        }
    }

    /// Converts into the plain JSON value a transport would send.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Found(FindResult::List(items)) => Value::Array(items),
            Self::Found(FindResult::Page(page)) => {
                serde_json::to_value(page).unwrap_or(Value::Null)
            }
            Self::Created(payload) => payload.into_value(),
            Self::Record(value) => value,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceRequest
// ---------------------------------------------------------------------------

/// Context carried with every routed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub call_id: u64,
    /// Location of the target service.
    pub location: String,
    pub call_timeout_ms: u64,
}

impl CallContext {
    #[must_use]
    pub fn new(call_id: u64, location: impl Into<String>, call_timeout_ms: u64) -> Self {
        Self {
            call_id,
            location: location.into(),
            call_timeout_ms,
        }
    }
}

/// A call addressed to a location, as handed to the router.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub ctx: CallContext,
    pub call: ServiceCall,
}
