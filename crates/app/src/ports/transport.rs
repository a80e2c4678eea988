//! MQTT transport port.

use std::future::Future;
use std::sync::Arc;

use chirpbridge_domain::error::BridgeError;

/// Outbound side of the broker connection.
///
/// Delivery of inbound messages is driven by the adapter, which feeds
/// [`InboundMessage`]s to the bridge one at a time.
pub trait MqttTransport: Send + Sync {
    /// Publish `payload` on `topic`. An empty payload with `retain` clears
    /// the retained message.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send;

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: MqttTransport> MqttTransport for Arc<T> {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).publish(topic, payload, retain)
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).subscribe(topic)
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).unsubscribe(topic)
    }
}

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    #[must_use]
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}
