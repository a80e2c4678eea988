//! Bridge state machine — discovery cycles, config acknowledgement and the
//! retained value cache.
//!
//! A [`Bridge`] owns all of its mutable state and is driven by one task:
//! the transport adapter feeds inbound messages to
//! [`handle_message`](Bridge::handle_message) serially. Readers observe the
//! counters through a [`StatisticsReporter`].
//!
//! Each (re)start publishes the discovery config of every entity with a
//! `time_stamp` one second past the cycle's `init_time`. The hub echoes the
//! configs back on the config wildcard; once as many fresh echoes as
//! published configs have been seen, configs left over from earlier cycles
//! are retracted and the bridge announces itself online.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::watch;

use chirpbridge_domain::error::BridgeError;
use chirpbridge_domain::statistics::{BridgeState, Statistics};
use chirpbridge_domain::time::{self, Timestamp};
use chirpbridge_domain::value_filter::ValueFilterTree;

use crate::discovery::{BRIDGE_RESTART_ID, DiscoveryMessage, DiscoveryPublisher};
use crate::ports::{DeviceRegistry, InboundMessage, MqttTransport};
use crate::statistics::StatisticsReporter;
use crate::topics::{SNAPSHOT_EVENT, TopicKind, UPLINK_EVENT, with_event};

const TIME_STAMP: &str = "time_stamp";
const HUB_ONLINE: &[u8] = b"online";

/// Tunables of a bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Pause before the replay window opens, letting the hub finish
    /// subscribing.
    pub start_delay: Duration,
    /// Maximum age of the replay window.
    pub restore_age: Duration,
    /// Log full payloads at debug level.
    pub debug_payload: bool,
}

/// Payload announcing the bridge online.
#[must_use]
pub fn online_payload() -> Vec<u8> {
    json!({ "state": "online" }).to_string().into_bytes()
}

/// Payload announcing the bridge offline (also used as MQTT last will).
#[must_use]
pub fn offline_payload() -> Vec<u8> {
    json!({ "state": "offline" }).to_string().into_bytes()
}

#[derive(Debug, Default)]
struct Cycle {
    init_time: Option<Timestamp>,
    open_time: Option<Timestamp>,
    filter: ValueFilterTree,
    /// Per-device merged values; an empty object means nothing cached yet.
    value_cache: BTreeMap<String, Value>,
    current_topics: BTreeSet<String>,
    old_topics: BTreeSet<String>,
    acked: usize,
    restore_queue: Vec<(String, Vec<u8>)>,
    subscribed: bool,
    replay_subscribed: bool,
}

/// One bridge instance.
pub struct Bridge<R, T> {
    registry: R,
    transport: T,
    publisher: DiscoveryPublisher,
    settings: BridgeSettings,
    cycle: Cycle,
    statistics: watch::Sender<Statistics>,
}

impl<R, T> Bridge<R, T>
where
    R: DeviceRegistry,
    T: MqttTransport,
{
    pub fn new(
        registry: R,
        transport: T,
        publisher: DiscoveryPublisher,
        settings: BridgeSettings,
    ) -> Self {
        let (statistics, _) = watch::channel(Statistics::default());
        Self {
            registry,
            transport,
            publisher,
            settings,
            cycle: Cycle::default(),
            statistics,
        }
    }

    /// Handle for reading statistics from other tasks.
    #[must_use]
    pub fn reporter(&self) -> StatisticsReporter {
        StatisticsReporter::new(self.statistics.subscribe())
    }

    #[must_use]
    pub fn publisher(&self) -> &DiscoveryPublisher {
        &self.publisher
    }

    /// Run a discovery cycle.
    ///
    /// Devices are fetched before anything is published, so a registry
    /// failure leaves the broker untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Registry`] when the device list cannot be
    /// fetched and [`BridgeError::Transport`] when a publish or subscribe
    /// fails.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        let devices = self.registry.current_devices().await?;
        self.set_state(BridgeState::Discovering);
        let bridge = self.publisher.bridge_device()?;

        let init_time = time::now();
        self.cycle.init_time = Some(init_time);

        for entity in &bridge.entities {
            let message = self
                .publisher
                .entity_message(&bridge, entity, Some(init_time));
            self.publish_discovery(&message, entity.entity_id != BRIDGE_RESTART_ID)
                .await?;
        }

        if !self.cycle.subscribed {
            self.subscribe_base_topics().await?;
            self.cycle.subscribed = true;
        }

        let mut filter = ValueFilterTree::new();
        let mut value_cache = BTreeMap::new();
        let mut current_topics = BTreeSet::new();
        let mut restore_queue = Vec::new();
        let mut queued = BTreeSet::new();
        let mut sensors = 0;

        for device in &devices {
            value_cache.insert(device.dev_eui.clone(), Value::Object(Map::new()));
            filter.extend(&ValueFilterTree::from_templates(
                device
                    .entities
                    .iter()
                    .filter_map(|entity| entity.config.value_template.as_deref()),
            ));
            for entity in &device.entities {
                let message = self
                    .publisher
                    .entity_message(device, entity, Some(init_time));
                let template = entity.config.value_template.as_deref().unwrap_or_default();
                self.publish_discovery(&message, true).await?;
                for (field, value) in &device.previous_values {
                    if template.contains(field.as_str())
                        && queued.insert((message.status_topic.clone(), field.clone()))
                    {
                        restore_queue.push((
                            message.status_topic.clone(),
                            restore_payload(field, value),
                        ));
                    }
                }
                current_topics.insert(message.topic);
                sensors += 1;
            }
        }

        if filter.is_empty() {
            tracing::debug!("no value templates, uplinks will not be cached");
        }
        let old_topics = std::mem::take(&mut self.cycle.current_topics);
        self.cycle.old_topics.extend(old_topics);
        self.cycle.current_topics = current_topics;
        self.cycle.filter = filter;
        self.cycle.value_cache = value_cache;
        self.cycle.restore_queue = restore_queue;
        self.cycle.acked = 0;

        tracing::info!(
            restore_requests = self.cycle.restore_queue.len(),
            devices = devices.len(),
            sensors,
            "bridge (re)start completed"
        );
        self.statistics.send_modify(|stats| {
            stats.devices = devices.len();
            stats.sensors = sensors;
            stats.state = BridgeState::AwaitingConfigAcks;
        });
        Ok(())
    }

    /// Handle one inbound message.
    ///
    /// Unknown topics and malformed payloads are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error when a restart fails or the transport rejects a
    /// publish.
    pub async fn handle_message(&mut self, message: &InboundMessage) -> Result<(), BridgeError> {
        self.statistics
            .send_modify(|stats| stats.last_update = Some(time::now()));

        match self.publisher.topics().classify(&message.topic) {
            TopicKind::HubStatus => {
                if message.payload == HUB_ONLINE {
                    tracing::info!(retain = message.retain, "hub online, re-registering devices");
                    self.start().await?;
                }
            }
            TopicKind::BridgeStatus => self.open_replay_window().await?,
            TopicKind::BridgeRestart => {
                tracing::info!(retain = message.retain, "restart requested, re-registering devices");
                self.start().await?;
            }
            TopicKind::Config => {
                if let Some(payload) = self.parse_payload(message) {
                    self.record_config(&message.topic, &payload);
                }
            }
            TopicKind::Snapshot { dev_eui } => {
                if let Some(payload) = self.parse_payload(message) {
                    self.handle_snapshot(dev_eui, &message.topic, &payload)
                        .await?;
                }
            }
            TopicKind::Uplink { dev_eui } => {
                if let Some(payload) = self.parse_payload(message) {
                    self.handle_uplink(dev_eui, &message.topic, &payload).await?;
                }
            }
            TopicKind::Other => {}
        }

        self.finish_cycle_if_acked().await
    }

    /// Re-issue subscriptions and run a fresh cycle after a broker reconnect.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn reconnected(&mut self) -> Result<(), BridgeError> {
        tracing::info!("broker connection re-established");
        self.cycle.subscribed = false;
        self.cycle.replay_subscribed = false;
        self.start().await
    }

    /// Announce the bridge offline.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the publish fails.
    pub async fn close(&mut self) -> Result<(), BridgeError> {
        self.transport
            .publish(&self.publisher.topics().bridge_status(), offline_payload(), true)
            .await?;
        self.set_state(BridgeState::Init);
        tracing::info!("bridge closed");
        Ok(())
    }

    async fn subscribe_base_topics(&self) -> Result<(), BridgeError> {
        let topics = self.publisher.topics();
        for topic in [
            topics.bridge_status(),
            topics.bridge_restart(),
            topics.hub_status(),
            topics.uplink_wildcard(),
            topics.config_wildcard(),
        ] {
            self.transport.subscribe(&topic).await?;
            tracing::debug!(%topic, "subscribed");
        }
        Ok(())
    }

    async fn publish_discovery(
        &self,
        message: &DiscoveryMessage,
        retain: bool,
    ) -> Result<(), BridgeError> {
        self.transport
            .publish(&message.topic, message.to_bytes(), retain)
            .await?;
        tracing::info!(topic = %message.topic, "discovery config published");
        if self.settings.debug_payload {
            tracing::debug!(topic = %message.topic, payload = ?message.payload, "discovery payload");
        }
        Ok(())
    }

    async fn open_replay_window(&mut self) -> Result<(), BridgeError> {
        tracing::info!("bridge status received");
        if !self.settings.start_delay.is_zero() {
            tokio::time::sleep(self.settings.start_delay).await;
        }
        self.cycle.open_time = Some(time::now());
        let topic = self.publisher.topics().snapshot_wildcard();
        self.transport.subscribe(&topic).await?;
        self.cycle.replay_subscribed = true;
        tracing::info!(%topic, "subscribed to retained values");

        for (topic, payload) in std::mem::take(&mut self.cycle.restore_queue) {
            self.transport.publish(&topic, payload, false).await?;
            tracing::info!(%topic, "previous value restored");
        }
        Ok(())
    }

    fn record_config(&mut self, topic: &str, payload: &Value) {
        let via_device = payload
            .get("device")
            .and_then(|device| device.get("via_device"))
            .and_then(Value::as_str);
        if via_device != Some(self.publisher.bridge_identifier()) {
            return;
        }
        self.cycle.old_topics.insert(topic.to_string());
        let fresh = match (
            payload.get(TIME_STAMP).and_then(time::parse_epoch_seconds),
            self.cycle.init_time,
        ) {
            (Some(stamp), Some(init)) => stamp > time::epoch_seconds(init),
            _ => false,
        };
        if fresh {
            self.cycle.acked += 1;
            tracing::debug!(
                %topic,
                acked = self.cycle.acked,
                expected = self.cycle.current_topics.len(),
                "discovery config acknowledged"
            );
        }
    }

    async fn handle_snapshot(
        &mut self,
        dev_eui: &str,
        topic: &str,
        payload: &Value,
    ) -> Result<(), BridgeError> {
        tracing::debug!(%topic, "retained values received");
        if self.settings.debug_payload {
            tracing::debug!(%topic, ?payload, "retained values payload");
        }

        let stale = match (
            payload.get(TIME_STAMP).and_then(time::parse_epoch_seconds),
            self.cycle.init_time,
        ) {
            (Some(stamp), Some(init)) => stamp < time::epoch_seconds(init),
            _ => false,
        };
        if stale {
            match self.cycle.value_cache.get(dev_eui) {
                None => {
                    self.transport.publish(topic, Vec::new(), true).await?;
                    tracing::info!(%topic, "retained values of unknown device removed");
                }
                Some(cached) if is_empty_entry(cached) => {
                    let merged = self.cycle.filter.merge(None, payload);
                    self.cycle
                        .value_cache
                        .insert(dev_eui.to_string(), merged.clone());
                    self.publish_cache_record(topic, UPLINK_EVENT, merged, false)
                        .await?;
                }
                Some(_) => {}
            }
        }

        let pending = self
            .cycle
            .value_cache
            .values()
            .filter(|cached| is_empty_entry(cached))
            .count();
        let expired = self.cycle.open_time.is_some_and(|open| {
            (time::now() - open)
                .to_std()
                .is_ok_and(|age| age > self.settings.restore_age)
        });
        if self.cycle.replay_subscribed && (pending == 0 || expired) {
            let wildcard = self.publisher.topics().snapshot_wildcard();
            self.transport.unsubscribe(&wildcard).await?;
            self.cycle.replay_subscribed = false;
            tracing::info!(topic = %wildcard, pending, expired, "unsubscribed from retained values");
        }
        Ok(())
    }

    async fn handle_uplink(
        &mut self,
        dev_eui: &str,
        topic: &str,
        payload: &Value,
    ) -> Result<(), BridgeError> {
        if payload.get(TIME_STAMP).is_some_and(|stamp| !stamp.is_null()) {
            return Ok(());
        }
        let Some(cached) = self.cycle.value_cache.get(dev_eui) else {
            return Ok(());
        };
        let merged = self.cycle.filter.merge(Some(cached), payload);
        self.cycle
            .value_cache
            .insert(dev_eui.to_string(), merged.clone());
        self.publish_cache_record(topic, SNAPSHOT_EVENT, merged, true)
            .await
    }

    async fn publish_cache_record(
        &self,
        topic: &str,
        event: &str,
        merged: Value,
        retain: bool,
    ) -> Result<(), BridgeError> {
        let topic = with_event(topic, event);
        let mut record = match merged {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        record.insert(
            TIME_STAMP.to_string(),
            Value::from(time::epoch_seconds(time::now())),
        );
        let record = Value::Object(record);
        if self.settings.debug_payload {
            tracing::debug!(%topic, payload = %record, "cached values published");
        }
        self.transport
            .publish(&topic, record.to_string().into_bytes(), retain)
            .await?;
        tracing::debug!(%topic, "cached values published");
        Ok(())
    }

    async fn finish_cycle_if_acked(&mut self) -> Result<(), BridgeError> {
        let expected = self.cycle.current_topics.len();
        if expected == 0 || self.cycle.acked < expected {
            return Ok(());
        }
        tracing::debug!(
            acked = self.cycle.acked,
            expected,
            "all discovery configs acknowledged"
        );
        let disappeared: Vec<String> = self
            .cycle
            .old_topics
            .difference(&self.cycle.current_topics)
            .cloned()
            .collect();
        for topic in &disappeared {
            self.transport.publish(topic, Vec::new(), true).await?;
            tracing::info!(%topic, "retained discovery config removed");
        }
        self.cycle.old_topics = self.cycle.current_topics.clone();
        self.cycle.acked = 0;

        self.transport
            .publish(&self.publisher.topics().bridge_status(), online_payload(), true)
            .await?;
        self.set_state(BridgeState::Online);
        tracing::info!("bridge online");
        Ok(())
    }

    fn parse_payload(&self, message: &InboundMessage) -> Option<Value> {
        if message.payload.is_empty() {
            return None;
        }
        match serde_json::from_slice(&message.payload) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(topic = %message.topic, %error, "ignoring malformed payload");
                None
            }
        }
    }

    fn set_state(&self, state: BridgeState) {
        self.statistics.send_modify(|stats| stats.state = state);
    }
}

fn is_empty_entry(cached: &Value) -> bool {
    cached.as_object().is_none_or(Map::is_empty)
}

fn restore_payload(field: &str, value: &Value) -> Vec<u8> {
    let mut payload = Map::new();
    payload.insert(field.to_string(), value.clone());
    payload.insert(
        TIME_STAMP.to_string(),
        Value::from(time::epoch_seconds(time::now())),
    );
    Value::Object(payload).to_string().into_bytes()
}
