use serde::{Deserialize, Serialize};
use tern_core::PaginateConfig;

/// Application-level configuration for the call pipeline.
///
/// Controls the default call deadline and the pagination default handed to
/// built-in services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name used in logs.
    pub name: String,
    /// Deadline for calls in milliseconds, unless the service's `timeout_ms`
    /// option sets its own.
    pub default_call_timeout_ms: u64,
    /// Pagination for services that do not configure their own.
    pub paginate: Option<PaginateConfig>,
}

impl ServerConfig {
    /// Parses a configuration from JSON; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is malformed or a field has the wrong type.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "tern".to_string(),
            default_call_timeout_ms: 30_000,
            paginate: None,
        }
    }
}
