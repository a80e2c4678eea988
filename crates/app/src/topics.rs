//! MQTT topic layout of one bridge instance.

use chirpbridge_domain::entity::Integration;

/// Uplink (live data) event name.
pub const UPLINK_EVENT: &str = "up";
/// Retained value snapshot event name.
pub const SNAPSHOT_EVENT: &str = "cur";

/// Topic builder for a discovery prefix and a network-server application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLayout {
    discovery_prefix: String,
    application_id: String,
}

/// What an inbound topic refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind<'a> {
    /// Hub presence announcement (`<prefix>/status`).
    HubStatus,
    /// The bridge's own status topic.
    BridgeStatus,
    /// Restart trigger.
    BridgeRestart,
    /// A discovery config under the prefix.
    Config,
    /// Retained value snapshot of a device.
    Snapshot { dev_eui: &'a str },
    /// Live uplink of a device.
    Uplink { dev_eui: &'a str },
    Other,
}

impl TopicLayout {
    pub fn new(discovery_prefix: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            discovery_prefix: discovery_prefix.into(),
            application_id: application_id.into(),
        }
    }

    #[must_use]
    pub fn bridge_status(&self) -> String {
        format!("application/{}/bridge/status", self.application_id)
    }

    #[must_use]
    pub fn bridge_restart(&self) -> String {
        format!("application/{}/bridge/restart", self.application_id)
    }

    #[must_use]
    pub fn hub_status(&self) -> String {
        format!("{}/status", self.discovery_prefix)
    }

    /// Wildcard matching every device's live uplinks.
    #[must_use]
    pub fn uplink_wildcard(&self) -> String {
        self.device_event("+", UPLINK_EVENT)
    }

    /// Wildcard matching every device's retained snapshot.
    #[must_use]
    pub fn snapshot_wildcard(&self) -> String {
        self.device_event("+", SNAPSHOT_EVENT)
    }

    /// Wildcard matching every discovery config under the prefix.
    #[must_use]
    pub fn config_wildcard(&self) -> String {
        format!("{}/+/+/+/config", self.discovery_prefix)
    }

    #[must_use]
    pub fn device_event(&self, dev_eui: &str, event: &str) -> String {
        format!(
            "application/{}/device/{dev_eui}/event/{event}",
            self.application_id
        )
    }

    #[must_use]
    pub fn device_command(&self, dev_eui: &str) -> String {
        format!(
            "application/{}/device/{dev_eui}/command/down",
            self.application_id
        )
    }

    #[must_use]
    pub fn discovery(&self, integration: &Integration, dev_eui: &str, entity_id: &str) -> String {
        format!(
            "{}/{integration}/{dev_eui}/{entity_id}/config",
            self.discovery_prefix
        )
    }

    /// Classify an inbound topic.
    ///
    /// Device events are recognised by their last segment; the device EUI is
    /// the third segment from the end.
    #[must_use]
    pub fn classify<'a>(&self, topic: &'a str) -> TopicKind<'a> {
        if topic == self.hub_status() {
            return TopicKind::HubStatus;
        }
        if topic == self.bridge_status() {
            return TopicKind::BridgeStatus;
        }
        if topic == self.bridge_restart() {
            return TopicKind::BridgeRestart;
        }
        let segments: Vec<&str> = topic.split('/').collect();
        let dev_eui = segments
            .len()
            .checked_sub(3)
            .and_then(|index| segments.get(index))
            .copied();
        match (segments.last().copied(), dev_eui) {
            (Some("config"), _) => TopicKind::Config,
            (Some(SNAPSHOT_EVENT), Some(dev_eui)) => TopicKind::Snapshot { dev_eui },
            (Some(UPLINK_EVENT), Some(dev_eui)) => TopicKind::Uplink { dev_eui },
            _ => TopicKind::Other,
        }
    }
}

/// Replace the last segment of a device event topic.
#[must_use]
pub fn with_event(topic: &str, event: &str) -> String {
    match topic.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{event}"),
        None => event.to_string(),
    }
}
