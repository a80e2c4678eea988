//! Discovery publisher — resolves an entity schema into a discovery message.
//!
//! Pure computation: the [`Bridge`](crate::bridge::Bridge) does the
//! publishing.

use chirpbridge_domain::device::DeviceRecord;
use chirpbridge_domain::entity::{
    COMMAND_TOPIC_PLACEHOLDER, DEV_EUI_PLACEHOLDER, DeviceBlock, EntityConfig, EntitySchema,
    Integration, IntegrationFallback, NONE_PLACEHOLDER, STATUS_TOPIC_PLACEHOLDER,
};
use chirpbridge_domain::error::ValidationError;
use chirpbridge_domain::time::{self, Timestamp};
use serde_json::{Map, Value, json};

use crate::topics::TopicLayout;

/// Manufacturer stamped on bridge-generated blocks.
pub const BRIDGE_VENDOR: &str = "ChirpStack";
/// Model of the bridge's own device.
pub const BRIDGE_MODEL: &str = "LoRaWAN Bridge";
/// Display name of the bridge's own device.
pub const BRIDGE_NAME: &str = "Chirp2MQTT Bridge";
pub const BRIDGE_STATE_ID: &str = "bridge_state";
pub const BRIDGE_STATE_NAME: &str = "State";
pub const BRIDGE_RESTART_ID: &str = "bridge_restart";
pub const BRIDGE_RESTART_NAME: &str = "Reload devices";

const STATE_TEMPLATE: &str = "{{ value_json.state }}";

/// Lower-case `value` and replace blanks with underscores.
#[must_use]
pub fn lower_no_blanks(value: &str) -> String {
    value.to_lowercase().replace(' ', "_")
}

/// A resolved discovery message.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    /// `<prefix>/<integration>/<dev_eui>/<entity_id>/config`
    pub topic: String,
    pub integration: Integration,
    pub payload: Map<String, Value>,
    /// Topic the entity reads its state from.
    pub status_topic: String,
    /// Downlink topic of the device.
    pub command_topic: String,
}

impl DiscoveryMessage {
    /// Serialised payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        Value::Object(self.payload.clone()).to_string().into_bytes()
    }
}

/// Builds discovery messages for one bridge instance.
#[derive(Debug, Clone)]
pub struct DiscoveryPublisher {
    topics: TopicLayout,
    bridge_unique_id: String,
    bridge_identifier: String,
}

impl DiscoveryPublisher {
    pub fn new(topics: TopicLayout, bridge_unique_id: impl Into<String>) -> Self {
        let bridge_unique_id = bridge_unique_id.into();
        let bridge_identifier =
            lower_no_blanks(&format!("{BRIDGE_VENDOR} {BRIDGE_MODEL} {bridge_unique_id}"));
        Self {
            topics,
            bridge_unique_id,
            bridge_identifier,
        }
    }

    #[must_use]
    pub fn topics(&self) -> &TopicLayout {
        &self.topics
    }

    /// Identifier of the bridge device; other devices name it as `via_device`.
    #[must_use]
    pub fn bridge_identifier(&self) -> &str {
        &self.bridge_identifier
    }

    /// The bridge's own device: a connectivity sensor and a restart button.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyDevEui`] when the bridge unique id is
    /// empty.
    pub fn bridge_device(&self) -> Result<DeviceRecord, ValidationError> {
        let uid = &self.bridge_unique_id;
        let state = EntitySchema::new(
            BRIDGE_STATE_ID,
            EntityConfig {
                device_class: Some("connectivity".to_string()),
                state_topic: Some(self.topics.bridge_status()),
                value_template: Some(STATE_TEMPLATE.to_string()),
                object_id: Some(lower_no_blanks(&format!(
                    "{BRIDGE_VENDOR} {BRIDGE_MODEL} {BRIDGE_STATE_NAME}"
                ))),
                unique_id: Some(lower_no_blanks(&format!(
                    "{BRIDGE_MODEL} {uid} {BRIDGE_STATE_NAME} {BRIDGE_VENDOR}"
                ))),
                ..EntityConfig::default()
            }
            .with_extra("entity_category", "diagnostic")
            .with_extra("payload_on", "online")
            .with_extra("payload_off", "offline"),
        );
        let restart = EntitySchema::new(
            BRIDGE_RESTART_ID,
            EntityConfig {
                device_class: Some("restart".to_string()),
                state_topic: Some(NONE_PLACEHOLDER.to_string()),
                command_topic: Some(self.topics.bridge_restart()),
                object_id: Some(lower_no_blanks(&format!(
                    "{BRIDGE_VENDOR} {BRIDGE_MODEL} {BRIDGE_RESTART_ID}"
                ))),
                unique_id: Some(lower_no_blanks(&format!(
                    "{BRIDGE_MODEL} {uid} {BRIDGE_RESTART_NAME} {BRIDGE_VENDOR}"
                ))),
                ..EntityConfig::default()
            }
            .with_extra("availability_mode", "all")
            .with_extra("payload_press", ""),
        )
        .with_integration(Integration::Button);

        DeviceRecord::builder()
            .dev_eui(uid.clone())
            .name(BRIDGE_NAME)
            .device(DeviceBlock {
                identifiers: vec![self.bridge_identifier.clone()],
                manufacturer: Some(BRIDGE_VENDOR.to_string()),
                model: Some(BRIDGE_MODEL.to_string()),
                ..DeviceBlock::default()
            })
            .entity(state)
            .entity(restart)
            .measurement_name(BRIDGE_STATE_ID, BRIDGE_STATE_NAME)
            .measurement_name(BRIDGE_RESTART_ID, BRIDGE_RESTART_NAME)
            .build()
    }

    /// Resolve the discovery message of `entity` on `device`.
    ///
    /// `init_time` is the start of the active discovery cycle, if any; the
    /// payload's `time_stamp` is one second past it, or now.
    #[must_use]
    pub fn entity_message(
        &self,
        device: &DeviceRecord,
        entity: &EntitySchema,
        init_time: Option<Timestamp>,
    ) -> DiscoveryMessage {
        let dev_eui = device.dev_eui.as_str();
        let entity_id = entity.entity_id.as_str();

        let (integration, fallback) = entity.resolve_integration();
        match fallback {
            Some(IntegrationFallback::NoDeviceClass) => tracing::warn!(
                dev_eui,
                entity_id,
                "no device class and no integration set, using sensor"
            ),
            Some(IntegrationFallback::UnknownDeviceClass(class)) => tracing::warn!(
                dev_eui,
                entity_id,
                device_class = %class,
                "could not infer integration from device class, using sensor"
            ),
            None => {}
        }

        let topic = self.topics.discovery(&integration, dev_eui, entity_id);
        let status_topic = self.topics.device_event(dev_eui, entity.data_event());
        let command_topic = self.topics.device_command(dev_eui);

        let mut payload = entity.config.to_map();
        payload.insert(
            "device".to_string(),
            Value::Object(self.device_block(device)),
        );
        if device.device.identifiers.is_empty() {
            payload.insert(
                "availability".to_string(),
                json!([{ "topic": self.topics.bridge_status(), "value_template": STATE_TEMPLATE }]),
            );
        }
        payload.insert(
            "origin".to_string(),
            json!({ "name": BRIDGE_VENDOR, "sw_version": env!("CARGO_PKG_VERSION") }),
        );

        if is_blank(payload.get("state_topic")) {
            payload.insert("state_topic".to_string(), Value::from(status_topic.clone()));
        }
        if is_blank(payload.get("name")) {
            let name = device.measurement_name(entity_id).unwrap_or(entity_id);
            payload.insert("name".to_string(), Value::from(name));
        }
        if is_blank(payload.get("unique_id")) {
            payload.insert(
                "unique_id".to_string(),
                Value::from(lower_no_blanks(&format!(
                    "{BRIDGE_VENDOR}_{dev_eui}_{entity_id}"
                ))),
            );
        }
        if is_blank(payload.get("object_id")) {
            payload.insert(
                "object_id".to_string(),
                Value::from(lower_no_blanks(&format!("{dev_eui}_{entity_id}"))),
            );
        }

        resolve_placeholders(&mut payload, dev_eui, &status_topic, &command_topic);

        payload.insert("enabled_by_default".to_string(), Value::Bool(true));
        let stamp = init_time.map_or_else(
            || time::epoch_seconds(time::now()),
            |init| time::epoch_seconds(init) + 1.0,
        );
        payload.insert("time_stamp".to_string(), Value::from(stamp));

        DiscoveryMessage {
            topic,
            integration,
            payload,
            status_topic,
            command_topic,
        }
    }

    fn device_block(&self, device: &DeviceRecord) -> Map<String, Value> {
        let mut block = device.device.clone();
        block.name = Some(device.display_name());
        if block.sw_version.is_none() {
            block.sw_version.clone_from(&device.mac_version);
        }
        if block.identifiers.is_empty() {
            block.identifiers = vec![lower_no_blanks(&format!(
                "{BRIDGE_VENDOR}_{}",
                device.dev_eui
            ))];
            block.via_device = Some(self.bridge_identifier.clone());
        }
        block.to_map()
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}

/// Substitute placeholders in top-level string values.
fn resolve_placeholders(
    payload: &mut Map<String, Value>,
    dev_eui: &str,
    status_topic: &str,
    command_topic: &str,
) {
    payload.retain(|_, value| value.as_str() != Some(NONE_PLACEHOLDER));
    for value in payload.values_mut() {
        let Value::String(text) = value else {
            continue;
        };
        if text == COMMAND_TOPIC_PLACEHOLDER {
            *text = command_topic.to_string();
        } else if text == STATUS_TOPIC_PLACEHOLDER {
            *text = status_topic.to_string();
        } else if text.contains(DEV_EUI_PLACEHOLDER) {
            *text = text.replace(DEV_EUI_PLACEHOLDER, dev_eui);
        }
    }
}
