//! Broker connection: client options, last will and the event-loop driver.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chirpbridge_app::ports::transport::InboundMessage;

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::transport::RumqttTransport;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// What the event loop reports to the bridge task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A CONNACK was received, on first connect or after a reconnect.
    Connected,
    Message(InboundMessage),
}

/// Last will registered with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Owns the rumqttc event loop until [`run`](Self::run) is called.
pub struct MqttConnection {
    event_loop: EventLoop,
}

/// Build the client and its (not yet polled) event loop.
#[must_use]
pub fn connect(config: &MqttConfig, will: Will) -> (RumqttTransport, MqttConnection) {
    let (client, event_loop) = AsyncClient::new(options(config, will), config.channel_capacity.max(1));
    (RumqttTransport::new(client), MqttConnection { event_loop })
}

fn options(config: &MqttConfig, will: Will) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs.max(5))));
    options.set_clean_session(true);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }
    options.set_last_will(LastWill::new(will.topic, will.payload, QoS::AtLeastOnce, true));
    options
}

impl MqttConnection {
    /// Poll the event loop, forwarding connection events to `events`.
    ///
    /// Connection errors are logged and retried; the loop ends once the
    /// receiving side is dropped or the client has disconnected.
    pub async fn run(mut self, events: mpsc::UnboundedSender<ConnectionEvent>) {
        loop {
            match self.event_loop.poll().await {
                Ok(event) => {
                    if is_disconnect(&event) {
                        info!("disconnected from broker");
                        return;
                    }
                    if let Some(event) = translate(event) {
                        if events.send(event).is_err() {
                            debug!("event receiver dropped, stopping MQTT loop");
                            return;
                        }
                    }
                }
                Err(err) => {
                    if matches!(err, rumqttc::ConnectionError::RequestsDone) {
                        return;
                    }
                    let err = MqttError::Connection(err);
                    warn!(error = ?err, "broker connection lost, retrying");
                    if events.is_closed() {
                        return;
                    }
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

fn is_disconnect(event: &Event) -> bool {
    matches!(event, Event::Outgoing(rumqttc::Outgoing::Disconnect))
}

/// Keep the events the bridge cares about.
fn translate(event: Event) -> Option<ConnectionEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            info!(session_present = ack.session_present, "connected to broker");
            Some(ConnectionEvent::Connected)
        }
        Event::Incoming(Packet::Publish(publish)) => {
            let message = InboundMessage {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
                retain: publish.retain,
            };
            Some(ConnectionEvent::Message(message))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};

    fn will() -> Will {
        Will {
            topic: "application/app/bridge/status".to_string(),
            payload: br#"{"state":"offline"}"#.to_vec(),
        }
    }

    #[test]
    fn should_forward_retained_publish() {
        let mut publish = Publish::new("application/a/device/01/event/cur", QoS::AtLeastOnce, b"{}".to_vec());
        publish.retain = true;

        let event = translate(Event::Incoming(Packet::Publish(publish)));

        assert_eq!(
            event,
            Some(ConnectionEvent::Message(
                InboundMessage::new("application/a/device/01/event/cur", b"{}".to_vec()).retained()
            ))
        );
    }

    #[test]
    fn should_report_connack() {
        let ack = ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        };
        assert_eq!(
            translate(Event::Incoming(Packet::ConnAck(ack))),
            Some(ConnectionEvent::Connected)
        );
    }

    #[test]
    fn should_drop_other_packets() {
        assert_eq!(translate(Event::Incoming(Packet::PingResp)), None);
        assert_eq!(translate(Event::Outgoing(rumqttc::Outgoing::PingReq)), None);
    }

    #[test]
    fn should_register_retained_last_will() {
        let options = options(&MqttConfig::default(), will());
        let last_will = options.last_will().unwrap();
        assert_eq!(last_will.topic, "application/app/bridge/status");
        assert!(last_will.retain);
        assert_eq!(&last_will.message[..], br#"{"state":"offline"}"#);
    }

    #[test]
    fn should_detect_outgoing_disconnect() {
        assert!(is_disconnect(&Event::Outgoing(rumqttc::Outgoing::Disconnect)));
        assert!(!is_disconnect(&Event::Incoming(Packet::PingResp)));
    }
}
