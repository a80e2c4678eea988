//! Entity schema — one discovery entity exposed for a device.
//!
//! Schemas come from untrusted codec text, so the configuration mapping keeps
//! every field it was given: the handful the bridge inspects are typed, the
//! rest travel through untouched in [`EntityConfig::extra`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::device_class;

/// Placeholder removing a key from the resolved discovery payload.
pub const NONE_PLACEHOLDER: &str = "{None}";
/// Placeholder replaced by the device's command topic.
pub const COMMAND_TOPIC_PLACEHOLDER: &str = "{command_topic}";
/// Placeholder replaced by the entity's status topic.
pub const STATUS_TOPIC_PLACEHOLDER: &str = "{status_topic}";
/// Token replaced by the device EUI wherever it appears in a string value.
pub const DEV_EUI_PLACEHOLDER: &str = "{dev_eui}";

/// MQTT discovery integration kind (the second topic segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Integration {
    Sensor,
    BinarySensor,
    Humidifier,
    Button,
    /// Any other kind named explicitly by a schema (`switch`, `number`, …).
    Other(String),
}

impl Integration {
    /// Topic segment for this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
            Self::Humidifier => "humidifier",
            Self::Button => "button",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Integration {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sensor" => Self::Sensor,
            "binary_sensor" => Self::BinarySensor,
            "humidifier" => Self::Humidifier,
            "button" => Self::Button,
            _ => Self::Other(value),
        }
    }
}

impl From<Integration> for String {
    fn from(value: Integration) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MQTT discovery configuration of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Pass-through fields the bridge does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityConfig {
    /// Flatten the configuration into a JSON object (typed fields first).
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        insert_some(&mut map, "device_class", self.device_class.as_ref());
        insert_some(&mut map, "state_topic", self.state_topic.as_ref());
        insert_some(&mut map, "command_topic", self.command_topic.as_ref());
        insert_some(&mut map, "value_template", self.value_template.as_ref());
        insert_some(&mut map, "unique_id", self.unique_id.as_ref());
        insert_some(&mut map, "object_id", self.object_id.as_ref());
        insert_some(&mut map, "name", self.name.as_ref());
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// Set a pass-through field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// The `device` block of a discovery payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceBlock {
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub identifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceBlock {
    /// Flatten the block into a JSON object.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if !self.identifiers.is_empty() {
            map.insert(
                "identifiers".to_string(),
                Value::from(self.identifiers.clone()),
            );
        }
        insert_some(&mut map, "name", self.name.as_ref());
        insert_some(&mut map, "manufacturer", self.manufacturer.as_ref());
        insert_some(&mut map, "model", self.model.as_ref());
        insert_some(&mut map, "sw_version", self.sw_version.as_ref());
        insert_some(&mut map, "via_device", self.via_device.as_ref());
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

fn insert_some(map: &mut Map<String, Value>, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value.clone()));
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(single) => vec![single],
        OneOrMany::Many(list) => list,
    })
}

/// One entity declared by a device profile.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    /// Identifier, unique within the device.
    pub entity_id: String,
    /// Explicit integration override.
    pub integration: Option<Integration>,
    /// Event suffix of the status topic (defaults to `up`).
    pub data_event: Option<String>,
    pub config: EntityConfig,
}

impl EntitySchema {
    /// Create a schema with no integration override and the default data event.
    pub fn new(entity_id: impl Into<String>, config: EntityConfig) -> Self {
        Self {
            entity_id: entity_id.into(),
            integration: None,
            data_event: None,
            config,
        }
    }

    /// Force the integration kind instead of inferring it from the device class.
    #[must_use]
    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = Some(integration);
        self
    }

    /// Publish state on `event/<data_event>` instead of `event/up`.
    #[must_use]
    pub fn with_data_event(mut self, data_event: impl Into<String>) -> Self {
        self.data_event = Some(data_event.into());
        self
    }

    /// The template used when the schema does not declare one.
    #[must_use]
    pub fn default_value_template(entity_id: &str) -> String {
        format!("{{{{ value_json.object.{entity_id} }}}}")
    }

    /// Fill in [`EntityConfig::value_template`] when absent or empty.
    #[must_use]
    pub fn with_default_value_template(mut self) -> Self {
        if self.config.value_template.as_deref().is_none_or(str::is_empty) {
            self.config.value_template = Some(Self::default_value_template(&self.entity_id));
        }
        self
    }

    /// Event suffix of the status topic.
    #[must_use]
    pub fn data_event(&self) -> &str {
        self.data_event
            .as_deref()
            .filter(|event| !event.is_empty())
            .unwrap_or("up")
    }

    /// Resolve the integration kind.
    ///
    /// An explicit override wins. Otherwise the device class is looked up in
    /// the known vocabularies. The second element says why the `sensor`
    /// fallback was used, if it was.
    #[must_use]
    pub fn resolve_integration(&self) -> (Integration, Option<IntegrationFallback>) {
        if let Some(integration) = &self.integration {
            return (integration.clone(), None);
        }
        match self.config.device_class.as_deref() {
            Some(class) => match device_class::infer_integration(class) {
                Some(integration) => (integration, None),
                None => (
                    Integration::Sensor,
                    Some(IntegrationFallback::UnknownDeviceClass(class.to_string())),
                ),
            },
            None => (Integration::Sensor, Some(IntegrationFallback::NoDeviceClass)),
        }
    }
}

/// Why the integration kind fell back to `sensor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationFallback {
    NoDeviceClass,
    UnknownDeviceClass(String),
}
