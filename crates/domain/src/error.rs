//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`BridgeError`]
//! at port boundaries.

use std::error::Error as StdError;

/// Boxed error coming out of an adapter.
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// Top-level error crossing port boundaries.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The device registry (network-server API) failed.
    #[error("device registry error")]
    Registry(#[source] BoxedError),

    /// The MQTT transport failed.
    #[error("transport error")]
    Transport(#[source] BoxedError),
}

/// Domain invariant violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A device was built without a `dev_eui`.
    #[error("device EUI must not be empty")]
    EmptyDevEui,

    /// An entity was built without an identifier.
    #[error("entity id must not be empty")]
    EmptyEntityId,

    /// Two entities of the same device share an identifier.
    #[error("duplicate entity id {0}")]
    DuplicateEntityId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_wrap_validation_error() {
        let err: BridgeError = ValidationError::EmptyDevEui.into();
        assert!(matches!(err, BridgeError::Validation(ValidationError::EmptyDevEui)));
        assert_eq!(err.to_string(), "validation error");
    }

    #[test]
    fn should_display_duplicate_entity() {
        let err = ValidationError::DuplicateEntityId("temp".to_string());
        assert_eq!(err.to_string(), "duplicate entity id temp");
    }

    #[test]
    fn should_expose_source_of_registry_error() {
        let inner = std::io::Error::other("unreachable");
        let err = BridgeError::Registry(Box::new(inner));
        assert_eq!(err.to_string(), "device registry error");
        assert!(err.source().is_some());
    }
}
