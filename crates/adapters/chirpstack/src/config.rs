//! ChirpStack connection configuration.

use std::fmt;

use serde::Deserialize;

/// Configuration for the ChirpStack REST API.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ChirpstackConfig {
    /// Base URL of the REST API (e.g. `http://chirpstack:8090`).
    pub server: String,
    /// API key sent as bearer token.
    pub api_key: String,
    /// Tenant name; ignored when only one tenant exists.
    pub tenant: String,
    /// Application name; ignored when only one application exists.
    pub application: String,
    /// Explicit application id, bypassing name resolution.
    pub application_id: Option<String>,
    /// Page size used when listing.
    pub page_limit: u32,
}

impl Default for ChirpstackConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8090".to_string(),
            api_key: String::new(),
            tenant: String::new(),
            application: String::new(),
            application_id: None,
            page_limit: 100,
        }
    }
}

impl fmt::Debug for ChirpstackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChirpstackConfig")
            .field("server", &self.server)
            .field("api_key", &"<redacted>")
            .field("tenant", &self.tenant)
            .field("application", &self.application)
            .field("application_id", &self.application_id)
            .field("page_limit", &self.page_limit)
            .finish()
    }
}
