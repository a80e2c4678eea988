//! Device record — a LoRaWAN end device and the entities it exposes.
//!
//! Records are rebuilt from the network server on every discovery cycle and
//! never mutated afterwards.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::entity::{DeviceBlock, EntitySchema};
use crate::error::ValidationError;

/// A device discovered in the network server's application.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Device EUI, unique within the application.
    pub dev_eui: String,
    /// Name registered on the network server (may be empty).
    pub name: String,
    /// LoRaWAN MAC version of the device profile (e.g. `LORAWAN 1.0.3`).
    pub mac_version: Option<String>,
    /// Base `device` block declared by the profile schema.
    pub device: DeviceBlock,
    /// Entities, in declaration order.
    pub entities: Vec<EntitySchema>,
    /// Human-readable measurement names keyed by entity id.
    pub measurement_names: BTreeMap<String, String>,
    /// Last known values to restore on startup (e.g. `batteryLevel`).
    pub previous_values: Map<String, Value>,
}

impl DeviceRecord {
    /// Start building a new record.
    #[must_use]
    pub fn builder() -> DeviceRecordBuilder {
        DeviceRecordBuilder::default()
    }

    /// Name shown for the device: the registered name, or `0x<dev_eui>`.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("0x{}", self.dev_eui)
        } else {
            self.name.clone()
        }
    }

    /// Measurement name for an entity, if the profile declared a non-empty one.
    #[must_use]
    pub fn measurement_name(&self, entity_id: &str) -> Option<&str> {
        self.measurement_names
            .get(entity_id)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Check the record's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the EUI or an entity id is empty, or
    /// when two entities share an id.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dev_eui.trim().is_empty() {
            return Err(ValidationError::EmptyDevEui);
        }
        let mut seen = HashSet::with_capacity(self.entities.len());
        for entity in &self.entities {
            if entity.entity_id.trim().is_empty() {
                return Err(ValidationError::EmptyEntityId);
            }
            if !seen.insert(entity.entity_id.as_str()) {
                return Err(ValidationError::DuplicateEntityId(entity.entity_id.clone()));
            }
        }
        Ok(())
    }
}

/// Builder for [`DeviceRecord`].
#[derive(Debug, Default)]
pub struct DeviceRecordBuilder {
    dev_eui: String,
    name: String,
    mac_version: Option<String>,
    device: DeviceBlock,
    entities: Vec<EntitySchema>,
    measurement_names: BTreeMap<String, String>,
    previous_values: Map<String, Value>,
}

impl DeviceRecordBuilder {
    #[must_use]
    pub fn dev_eui(mut self, dev_eui: impl Into<String>) -> Self {
        self.dev_eui = dev_eui.into();
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn mac_version(mut self, mac_version: impl Into<String>) -> Self {
        self.mac_version = Some(mac_version.into());
        self
    }

    #[must_use]
    pub fn device(mut self, device: DeviceBlock) -> Self {
        self.device = device;
        self
    }

    #[must_use]
    pub fn entity(mut self, entity: EntitySchema) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn entities(mut self, entities: impl IntoIterator<Item = EntitySchema>) -> Self {
        self.entities.extend(entities);
        self
    }

    #[must_use]
    pub fn measurement_name(mut self, entity_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.measurement_names.insert(entity_id.into(), name.into());
        self
    }

    #[must_use]
    pub fn previous_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.previous_values.insert(field.into(), value.into());
        self
    }

    /// Finish the record.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the record breaks an invariant
    /// (see [`DeviceRecord::validate`]).
    pub fn build(self) -> Result<DeviceRecord, ValidationError> {
        let record = DeviceRecord {
            dev_eui: self.dev_eui,
            name: self.name,
            mac_version: self.mac_version,
            device: self.device,
            entities: self.entities,
            measurement_names: self.measurement_names,
            previous_values: self.previous_values,
        };
        record.validate()?;
        Ok(record)
    }
}
