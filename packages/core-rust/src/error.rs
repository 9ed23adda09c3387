//! Error taxonomy shared by services, the registry and the dispatch pipeline.

use serde_json::{json, Value};

use crate::method::Method;

/// Errors surfaced by service calls.
///
/// Services report failures by returning one of these; the registry and the
/// dispatch pipeline pass them through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Unknown location or unknown resource id.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed data or query.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Policy denial raised by a collaborator.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Duplicate registration or conflicting write.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The service does not implement the requested method.
    #[error("method `{method}` is not supported by service `{location}`")]
    MethodNotAllowed { location: String, method: Method },
    /// The call did not settle within its deadline.
    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// Any other failure, typically from a backing store.
    #[error("general error: {0}")]
    General(#[from] anyhow::Error),
}

/// Result alias for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Shorthand for a `NotFound` naming the missing thing.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("no record found for {what}"))
    }

    /// Conventional status code a transport can translate this error to.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Timeout { .. } => 408,
            Self::Conflict(_) => 409,
            Self::General(_) => 500,
        }
    }

    /// Stable class name of the error.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::BadRequest(_) => "BadRequest",
            Self::Forbidden(_) => "Forbidden",
            Self::Conflict(_) => "Conflict",
            Self::MethodNotAllowed { .. } => "MethodNotAllowed",
            Self::Timeout { .. } => "Timeout",
            Self::General(_) => "GeneralError",
        }
    }

    /// JSON representation: `{ name, message, code }`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name(),
            "message": self.to_string(),
            "code": self.code(),
        })
    }
}
