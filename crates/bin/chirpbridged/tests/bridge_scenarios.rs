//! End-to-end scenarios for the full bridge stack.
//!
//! Each test wires the real bridge to the real ChirpStack registry, backed by
//! an in-memory ChirpStack API and a recording MQTT transport. Broker echoes
//! are simulated by feeding published messages back as inbound messages.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use chirpbridge_adapter_chirpstack::ChirpstackRegistry;
use chirpbridge_adapter_chirpstack::api::{
    ChirpstackApi, Device, DeviceListItem, DeviceProfile, DeviceStatus, Measurement,
};
use chirpbridge_adapter_chirpstack::error::ChirpstackError;
use chirpbridge_app::bridge::{Bridge, BridgeSettings};
use chirpbridge_app::discovery::DiscoveryPublisher;
use chirpbridge_app::ports::{InboundMessage, MqttTransport};
use chirpbridge_app::topics::TopicLayout;
use chirpbridge_domain::entity::Integration;
use chirpbridge_domain::error::BridgeError;
use chirpbridge_domain::statistics::BridgeState;

const APP: &str = "app-1";
const PREFIX: &str = "homeassistant";

const GOOD_CODEC: &str = r"
function decodeUplink(input) {
  return { data: { counter: input.bytes[0] } };
}

function getHaDeviceInfo() {
  return {
    device: { manufacturer: 'Acme', model: 'TH-1' },
    entities: {
      // battery from the device status
      battery: {
        entity_conf: {
          device_class: 'battery',
          unit_of_measurement: '%',
          value_template: '{{ value_json.batteryLevel }}',
        },
      },
      counter: { entity_conf: { device_class: 'temperature' } },
      /* radio quality */
      rssi: {
        entity_conf: {
          device_class: 'signal_strength',
          value_template: '{{ value_json.rxInfo[0].rssi | int }}',
        },
      },
    },
  };
}
";

const BAD_COMMENT_CODEC: &str = r"
function getHaDeviceInfo() {
  return {
    entities: {
      / not a comment
      counter: { entity_conf: { device_class: 'temperature' } },
    },
  };
}
";

const NO_RETURN_CODEC: &str = r"
function getHaDeviceInfo() {
  var info = { entities: { counter: { entity_conf: {} } } };
}
";

const NO_FUNCTION_CODEC: &str = r"
function decodeUplink(input) {
  return { data: {} };
}
";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeChirpstack {
    devices: Mutex<Vec<(DeviceListItem, bool)>>,
    profiles: Mutex<BTreeMap<String, DeviceProfile>>,
}

impl FakeChirpstack {
    fn add_profile(&self, id: &str, script: &str) {
        self.profiles.lock().unwrap().insert(
            id.to_string(),
            DeviceProfile {
                name: format!("profile-{id}"),
                mac_version: "LORAWAN_1_0_3".to_string(),
                payload_codec_script: script.to_string(),
                measurements: BTreeMap::from([(
                    "counter".to_string(),
                    Measurement {
                        name: "Counter".to_string(),
                    },
                )]),
            },
        );
    }

    fn add_device(&self, dev_eui: &str, profile_id: &str, disabled: bool) {
        self.devices.lock().unwrap().push((
            DeviceListItem {
                dev_eui: dev_eui.to_string(),
                name: format!("Device {dev_eui}"),
                device_profile_id: profile_id.to_string(),
                device_status: Some(DeviceStatus {
                    external_power_source: false,
                    battery_level: 93.0,
                }),
            },
            disabled,
        ));
    }

    fn remove_device(&self, dev_eui: &str) {
        self.devices
            .lock()
            .unwrap()
            .retain(|(item, _)| item.dev_eui != dev_eui);
    }
}

fn not_found() -> ChirpstackError {
    ChirpstackError::Api {
        status: 404,
        message: "object does not exist".to_string(),
    }
}

impl ChirpstackApi for FakeChirpstack {
    async fn list_tenants(&self) -> Result<BTreeMap<String, String>, ChirpstackError> {
        Ok(BTreeMap::from([("Home".to_string(), "t1".to_string())]))
    }

    async fn list_applications(
        &self,
        _tenant_id: &str,
    ) -> Result<BTreeMap<String, String>, ChirpstackError> {
        Ok(BTreeMap::from([("Sensors".to_string(), APP.to_string())]))
    }

    async fn list_devices(
        &self,
        _application_id: &str,
    ) -> Result<Vec<DeviceListItem>, ChirpstackError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|(item, _)| item.clone())
            .collect())
    }

    async fn get_device(&self, dev_eui: &str) -> Result<Device, ChirpstackError> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|(item, _)| item.dev_eui == dev_eui)
            .map(|(item, disabled)| Device {
                dev_eui: item.dev_eui.clone(),
                name: item.name.clone(),
                is_disabled: *disabled,
            })
            .ok_or_else(not_found)
    }

    async fn get_device_profile(&self, profile_id: &str) -> Result<DeviceProfile, ChirpstackError> {
        self.profiles
            .lock()
            .unwrap()
            .get(profile_id)
            .cloned()
            .ok_or_else(not_found)
    }
}

#[derive(Debug, Clone)]
struct Published {
    topic: String,
    payload: Vec<u8>,
    retain: bool,
}

impl Published {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

#[derive(Default)]
struct RecordingTransport {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    unsubscriptions: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn take(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }
}

impl MqttTransport for RecordingTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        async { Ok(()) }
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        async { Ok(()) }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.unsubscriptions.lock().unwrap().push(topic.to_string());
        async { Ok(()) }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

type TestBridge = Bridge<ChirpstackRegistry<Arc<FakeChirpstack>>, Arc<RecordingTransport>>;

struct Harness {
    bridge: TestBridge,
    chirpstack: Arc<FakeChirpstack>,
    transport: Arc<RecordingTransport>,
}

fn topics() -> TopicLayout {
    TopicLayout::new(PREFIX, APP)
}

fn harness() -> Harness {
    let chirpstack = Arc::new(FakeChirpstack::default());
    let transport = Arc::new(RecordingTransport::default());
    let bridge = Bridge::new(
        ChirpstackRegistry::new(Arc::clone(&chirpstack), APP),
        Arc::clone(&transport),
        DiscoveryPublisher::new(topics(), "bridge-uid"),
        BridgeSettings {
            start_delay: Duration::ZERO,
            restore_age: Duration::from_secs(60),
            debug_payload: false,
        },
    );
    Harness {
        bridge,
        chirpstack,
        transport,
    }
}

impl Harness {
    async fn send(&mut self, message: InboundMessage) {
        self.bridge.handle_message(&message).await.unwrap();
    }

    /// Echo every retained, non-empty discovery config as the broker would.
    async fn echo_configs(&mut self, published: &[Published]) {
        for message in published
            .iter()
            .filter(|message| message.topic.ends_with("/config") && !message.payload.is_empty())
        {
            self.send(InboundMessage::new(message.topic.clone(), message.payload.clone()))
                .await;
        }
    }
}

fn config_topic(dev_eui: &str, entity_id: &str) -> String {
    topics().discovery(&Integration::Sensor, dev_eui, entity_id)
}

fn device_config_topics(published: &[Published], dev_eui: &str) -> Vec<String> {
    published
        .iter()
        .filter(|message| message.topic.contains(&format!("/{dev_eui}/")) && message.topic.ends_with("/config"))
        .map(|message| message.topic.clone())
        .collect()
}

fn stale_stamp() -> f64 {
    1_000_000.0
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_publish_configs_for_single_quoted_codec() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("0004a30b001c0530", "p1", false);

    h.bridge.start().await.unwrap();
    let published = h.transport.take();

    let counter = published
        .iter()
        .find(|message| message.topic == config_topic("0004a30b001c0530", "counter"))
        .expect("counter config published");
    assert!(counter.retain);
    let payload = counter.json();
    assert_eq!(payload["name"], "Counter");
    assert_eq!(payload["value_template"], "{{ value_json.object.counter }}");
    assert_eq!(
        payload["state_topic"],
        "application/app-1/device/0004a30b001c0530/event/up"
    );
    assert_eq!(payload["device"]["manufacturer"], "Acme");
    assert_eq!(payload["device"]["name"], "Device 0004a30b001c0530");
    assert_eq!(payload["device"]["sw_version"], "LORAWAN 1.0.3");
    assert_eq!(payload["enabled_by_default"], true);

    let battery = published
        .iter()
        .find(|message| message.topic == config_topic("0004a30b001c0530", "battery"))
        .unwrap();
    assert_eq!(battery.json()["unit_of_measurement"], "%");

    let stats = h.bridge.reporter().snapshot();
    assert_eq!(stats.devices, 1);
    assert_eq!(stats.sensors, 3);
    assert_eq!(stats.state, BridgeState::AwaitingConfigAcks);
}

#[tokio::test]
async fn should_ignore_device_with_malformed_comment() {
    let mut h = harness();
    h.chirpstack.add_profile("bad", BAD_COMMENT_CODEC);
    h.chirpstack.add_device("01", "bad", false);

    h.bridge.start().await.unwrap();
    let published = h.transport.take();

    assert!(device_config_topics(&published, "01").is_empty());
    assert_eq!(h.bridge.reporter().snapshot().devices, 0);
}

#[tokio::test]
async fn should_ignore_codecs_without_function_or_return() {
    let mut h = harness();
    h.chirpstack.add_profile("no-return", NO_RETURN_CODEC);
    h.chirpstack.add_profile("no-function", NO_FUNCTION_CODEC);
    h.chirpstack.add_device("01", "no-return", false);
    h.chirpstack.add_device("02", "no-function", false);

    h.bridge.start().await.unwrap();

    let stats = h.bridge.reporter().snapshot();
    assert_eq!(stats.devices, 0);
    assert_eq!(stats.sensors, 0);
}

#[tokio::test]
async fn should_publish_good_device_next_to_faulty_one() {
    let mut h = harness();
    h.chirpstack.add_profile("good", GOOD_CODEC);
    h.chirpstack.add_profile("bad", BAD_COMMENT_CODEC);
    h.chirpstack.add_device("01", "bad", false);
    h.chirpstack.add_device("02", "good", false);

    h.bridge.start().await.unwrap();
    let published = h.transport.take();

    assert!(device_config_topics(&published, "01").is_empty());
    assert_eq!(device_config_topics(&published, "02").len(), 3);
}

#[tokio::test]
async fn should_skip_disabled_devices() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", true);
    h.chirpstack.add_device("02", "p1", false);

    h.bridge.start().await.unwrap();
    let published = h.transport.take();

    assert!(device_config_topics(&published, "01").is_empty());
    assert_eq!(h.bridge.reporter().snapshot().devices, 1);
}

#[tokio::test]
async fn should_go_online_once_all_configs_are_echoed() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);

    h.bridge.start().await.unwrap();
    let published = h.transport.take();
    h.echo_configs(&published).await;

    let online = h.transport.take();
    let status = online
        .iter()
        .find(|message| message.topic == topics().bridge_status())
        .expect("bridge status published");
    assert!(status.retain);
    assert_eq!(status.json(), json!({"state": "online"}));
    assert_eq!(h.bridge.reporter().snapshot().state, BridgeState::Online);
}

// ---------------------------------------------------------------------------
// Restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_retract_configs_of_removed_device_exactly_once() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.chirpstack.add_device("02", "p1", false);

    h.bridge.start().await.unwrap();
    let first = h.transport.take();
    h.echo_configs(&first).await;
    h.transport.take();

    h.chirpstack.remove_device("02");
    h.send(InboundMessage::new(topics().bridge_restart(), Vec::new()))
        .await;
    let second = h.transport.take();
    assert!(device_config_topics(&second, "02").is_empty());
    h.echo_configs(&second).await;

    let retracted: Vec<Published> = h
        .transport
        .take()
        .into_iter()
        .filter(|message| message.payload.is_empty())
        .collect();
    let mut topics_removed: Vec<String> = retracted.iter().map(|m| m.topic.clone()).collect();
    topics_removed.sort();
    let mut expected = vec![
        config_topic("02", "battery"),
        config_topic("02", "counter"),
        config_topic("02", "rssi"),
    ];
    expected.sort();
    assert_eq!(topics_removed, expected);
    assert!(retracted.iter().all(|message| message.retain));

    h.send(InboundMessage::new(topics().bridge_restart(), Vec::new()))
        .await;
    let third = h.transport.take();
    h.echo_configs(&third).await;
    assert!(
        h.transport
            .take()
            .iter()
            .all(|message| !message.payload.is_empty())
    );
}

#[tokio::test]
async fn should_rediscover_when_hub_comes_online() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.transport.take();

    h.send(InboundMessage::new(topics().hub_status(), b"online".to_vec()))
        .await;

    assert_eq!(device_config_topics(&h.transport.take(), "01").len(), 3);
}

// ---------------------------------------------------------------------------
// Retained values
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_remove_stale_snapshot_of_unknown_device() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.send(InboundMessage::new(topics().bridge_status(), br#"{"state":"online"}"#.to_vec()))
        .await;
    h.transport.take();

    let gone = topics().device_event("ff", "cur");
    let payload = json!({"object": {"counter": 1}, "time_stamp": stale_stamp()});
    h.send(InboundMessage::new(gone.clone(), payload.to_string()).retained())
        .await;

    let published = h.transport.take();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, gone);
    assert!(published[0].payload.is_empty());
    assert!(published[0].retain);
}

#[tokio::test]
async fn should_replay_stale_snapshot_of_known_device_on_uplink_topic() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.send(InboundMessage::new(topics().bridge_status(), br#"{"state":"online"}"#.to_vec()))
        .await;
    h.transport.take();

    let snapshot = json!({
        "object": {"counter": 7, "ignored": true},
        "batteryLevel": 80,
        "time_stamp": stale_stamp()
    });
    h.send(InboundMessage::new(topics().device_event("01", "cur"), snapshot.to_string()).retained())
        .await;

    let published = h.transport.take();
    let replay = published
        .iter()
        .find(|message| message.topic == topics().device_event("01", "up"))
        .expect("snapshot replayed");
    assert!(!replay.retain);
    let payload = replay.json();
    assert_eq!(payload["object"], json!({"counter": 7}));
    assert_eq!(payload["batteryLevel"], 80);
    assert!(payload.get("time_stamp").is_some());
    assert_eq!(
        *h.transport.unsubscriptions.lock().unwrap(),
        vec![topics().snapshot_wildcard()]
    );
}

#[tokio::test]
async fn should_restore_battery_level_when_window_opens() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.transport.take();

    h.send(InboundMessage::new(topics().bridge_status(), br#"{"state":"online"}"#.to_vec()))
        .await;

    assert!(
        h.transport
            .subscriptions
            .lock()
            .unwrap()
            .contains(&topics().snapshot_wildcard())
    );
    let restored: Vec<Published> = h
        .transport
        .take()
        .into_iter()
        .filter(|message| message.topic == topics().device_event("01", "up"))
        .collect();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].json()["batteryLevel"], 93.0);
}

#[tokio::test]
async fn should_join_uplinks_into_retained_snapshot() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.transport.take();

    let uplink = topics().device_event("01", "up");
    let first = json!({
        "batteryLevel": 93,
        "object": {"counter": 9, "noise": 1},
        "rxInfo": [{"rssi": -75, "snr": 6}, {"rssi": -90}],
        "deviceInfo": {"tenantId": "t1"}
    });
    h.send(InboundMessage::new(uplink.clone(), first.to_string()))
        .await;
    let second = json!({"object": {"counter": 10}});
    h.send(InboundMessage::new(uplink, second.to_string())).await;

    let snapshots: Vec<Published> = h
        .transport
        .take()
        .into_iter()
        .filter(|message| message.topic == topics().device_event("01", "cur"))
        .collect();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|message| message.retain));

    let mut joined = snapshots[1].json();
    let stamp = joined
        .as_object_mut()
        .unwrap()
        .remove("time_stamp")
        .unwrap();
    assert!(stamp.is_f64());
    assert_eq!(
        joined,
        json!({
            "batteryLevel": 93,
            "object": {"counter": 10},
            "rxInfo": [{"rssi": -75}]
        })
    );
}

#[tokio::test]
async fn should_ignore_uplinks_carrying_a_time_stamp() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.transport.take();

    let echo = json!({"batteryLevel": 93, "time_stamp": 1.0});
    h.send(InboundMessage::new(topics().device_event("01", "up"), echo.to_string()))
        .await;

    assert!(h.transport.take().is_empty());
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_announce_offline_on_close() {
    let mut h = harness();
    h.chirpstack.add_profile("p1", GOOD_CODEC);
    h.chirpstack.add_device("01", "p1", false);
    h.bridge.start().await.unwrap();
    h.transport.take();

    h.bridge.close().await.unwrap();

    let published = h.transport.take();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, topics().bridge_status());
    assert!(published[0].retain);
    assert_eq!(published[0].json(), json!({"state": "offline"}));
}
