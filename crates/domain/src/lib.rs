//! # chirpbridge-domain
//!
//! Pure domain model for the ChirpStack → MQTT discovery bridge.
//!
//! ## Responsibilities
//! - Foundational types: error conventions, timestamps
//! - Define **Devices** (LoRaWAN end devices discovered from the network server)
//! - Define **Entity schemas** (one discovery entity per device measurement)
//! - Define the **device-class vocabularies** used to infer integration kinds
//! - Define the **value filter tree** and the filtered payload merge
//! - Define the **statistics** snapshot exposed to the host
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod device;
pub mod device_class;
pub mod entity;
pub mod statistics;
pub mod value_filter;
