//! # chirpbridge-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceRegistry` — devices and entity schemas from the network server
//!   - `MqttTransport` — publish/subscribe on the broker
//! - Lay out the MQTT **topics** of a bridge instance
//! - Resolve entity schemas into **discovery messages** (`DiscoveryPublisher`)
//! - Run the **bridge state machine**: discovery cycles, config
//!   acknowledgement, stale config retraction, the retained value cache
//! - Expose **statistics** to readers on other tasks
//!
//! ## Dependency rule
//! Depends on `chirpbridge-domain` only (plus `tokio::sync`/`tokio::time`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bridge;
pub mod discovery;
pub mod ports;
pub mod statistics;
pub mod topics;
