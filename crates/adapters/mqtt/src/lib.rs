//! # chirpbridge-adapter-mqtt
//!
//! MQTT adapter — connects the bridge to the broker via
//! [rumqttc](https://docs.rs/rumqttc).
//!
//! ## Responsibilities
//! - Implement the `MqttTransport` port defined in `chirpbridge-app::ports`
//! - Register the retained offline last will on the bridge status topic
//! - Drive the rumqttc event loop, forwarding inbound publishes and
//!   (re)connections to the task owning the bridge
//!
//! ## Dependency rule
//! Depends on `chirpbridge-app` (for port traits) and `chirpbridge-domain`.
//! The `app` and `domain` crates must never reference this adapter.

pub mod config;
pub mod connection;
pub mod error;
pub mod transport;

pub use config::MqttConfig;
pub use connection::{ConnectionEvent, MqttConnection, Will, connect};
pub use error::MqttError;
pub use transport::RumqttTransport;
