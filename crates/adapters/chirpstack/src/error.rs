//! ChirpStack adapter error types.

use chirpbridge_domain::error::{BridgeError, ValidationError};

/// Errors talking to the ChirpStack API.
#[derive(Debug, thiserror::Error)]
pub enum ChirpstackError {
    /// The configured server is not a valid base URL.
    #[error("invalid ChirpStack server URL")]
    InvalidUrl(#[source] url::ParseError),

    /// The API key was rejected or cannot be sent as a header.
    #[error("invalid API key")]
    InvalidApiKey,

    /// The HTTP request could not be completed.
    #[error("HTTP request failed")]
    Http(#[source] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("ChirpStack API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("failed to decode ChirpStack response")]
    Decode(#[source] serde_json::Error),

    #[error("no tenants available")]
    NoTenants,

    #[error("tenant {0:?} not found")]
    TenantNotFound(String),

    #[error("no applications available")]
    NoApplications,

    #[error("application {0:?} not found")]
    ApplicationNotFound(String),

    /// A domain-level error.
    #[error("domain error")]
    Domain(#[source] BridgeError),
}

impl ChirpstackError {
    /// Convert into a [`BridgeError::Registry`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> BridgeError {
        match self {
            Self::Domain(err) => err,
            other => BridgeError::Registry(Box::new(other)),
        }
    }
}

impl From<ChirpstackError> for BridgeError {
    fn from(err: ChirpstackError) -> Self {
        err.into_domain()
    }
}

impl From<reqwest::Error> for ChirpstackError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Why a device profile's codec did not yield a discovery schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("function getHaDeviceInfo not found")]
    MissingFunction,

    #[error("return statement not found after getHaDeviceInfo")]
    MissingReturn,

    #[error("opening brace not found after return")]
    MissingBrace,

    /// The extracted literal is not valid JSON once normalised.
    #[error("schema is not valid JSON")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        json: String,
    },

    /// The JSON does not describe a discovery schema.
    #[error("schema has an unexpected structure")]
    Structure(#[source] serde_json::Error),

    #[error("schema declares no entities")]
    MissingEntities,

    #[error("invalid device record")]
    Record(#[from] ValidationError),
}
