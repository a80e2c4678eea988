//! # chirpbridge-adapter-chirpstack
//!
//! ChirpStack adapter — the device registry side of the bridge.
//!
//! ## Responsibilities
//! - Talk to the ChirpStack v4 REST API ([`client::RestClient`])
//! - Resolve the configured tenant and application to an application id
//! - Extract the discovery schema declared by each device profile's codec
//!   ([`codec`])
//! - Implement the `DeviceRegistry` port defined in `chirpbridge-app::ports`
//!
//! ## Dependency rule
//! Depends on `chirpbridge-app` (for port traits) and `chirpbridge-domain`.
//! The `app` and `domain` crates must never reference this adapter.

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod registry;

pub use client::RestClient;
pub use config::ChirpstackConfig;
pub use error::{ChirpstackError, SchemaError};
pub use registry::{ChirpstackRegistry, resolve_application_id};
