//! # chirpbridged — ChirpStack to MQTT discovery bridge daemon
//!
//! Composition root that wires the adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise the tracing subscriber
//! - Resolve the ChirpStack application and build the device registry
//! - Connect to the broker with a retained offline last will
//! - Own the [`Bridge`] on a single task, feeding it broker events serially
//! - Handle graceful shutdown (Ctrl-C): announce offline, then disconnect
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use chirpbridge_adapter_chirpstack::{ChirpstackRegistry, RestClient, resolve_application_id};
use chirpbridge_adapter_mqtt::{ConnectionEvent, Will};
use chirpbridge_app::bridge::{Bridge, offline_payload};
use chirpbridge_app::discovery::DiscoveryPublisher;
use chirpbridge_app::ports::{DeviceRegistry, MqttTransport};
use chirpbridge_app::statistics::StatisticsReporter;
use chirpbridge_app::topics::TopicLayout;

use crate::config::Config;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    debug!(?config, "configuration loaded");

    // Registry
    let api = RestClient::new(&config.chirpstack)?;
    let application_id = resolve_application_id(&api, &config.chirpstack).await?;
    let registry = ChirpstackRegistry::new(api, application_id.clone());

    // Broker
    let topics = TopicLayout::new(&config.mqtt.discovery_prefix, &application_id);
    let will = Will {
        topic: topics.bridge_status(),
        payload: offline_payload(),
    };
    let (transport, connection) = chirpbridge_adapter_mqtt::connect(&config.mqtt, will);
    let (events_tx, events) = mpsc::unbounded_channel();
    let driver = tokio::spawn(connection.run(events_tx));

    // Bridge
    let publisher = DiscoveryPublisher::new(topics, config.unique_id());
    let mut bridge = Bridge::new(
        registry,
        transport.clone(),
        publisher,
        config.bridge_settings(),
    );
    tokio::spawn(log_statistics(bridge.reporter()));
    info!(%application_id, bridge = %bridge.publisher().bridge_identifier(), "chirpbridged starting");

    drive(&mut bridge, events).await;

    if let Err(err) = bridge.close().await {
        warn!(error = ?err, "failed to announce bridge offline");
    }
    if let Err(err) = transport.disconnect().await {
        warn!(error = %err, "failed to disconnect from broker");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, driver).await.is_err() {
        warn!("MQTT loop did not stop in time");
    }

    info!("chirpbridged stopped");
    Ok(())
}

/// Feed broker events to the bridge until Ctrl-C or the connection ends.
async fn drive<R, T>(bridge: &mut Bridge<R, T>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>)
where
    R: DeviceRegistry,
    T: MqttTransport,
{
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut connected_before = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConnectionEvent::Connected) => {
                    let result = if connected_before {
                        bridge.reconnected().await
                    } else {
                        bridge.start().await
                    };
                    connected_before = true;
                    if let Err(err) = result {
                        error!(error = ?err, "discovery cycle failed");
                    }
                }
                Some(ConnectionEvent::Message(message)) => {
                    if let Err(err) = bridge.handle_message(&message).await {
                        error!(topic = %message.topic, error = ?err, "message handling failed");
                    }
                }
                None => {
                    info!("MQTT loop ended");
                    return;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown requested");
                return;
            }
        }
    }
}

async fn log_statistics(mut reporter: StatisticsReporter) {
    let mut last = reporter.snapshot();
    while reporter.changed().await {
        let current = reporter.snapshot();
        if (current.devices, current.sensors, current.state) != (last.devices, last.sensors, last.state) {
            info!(
                devices = current.devices,
                sensors = current.sensors,
                state = ?current.state,
                "bridge statistics"
            );
        }
        last = current;
    }
}
