//! [`MqttTransport`] implementation over a rumqttc [`AsyncClient`].

use std::future::Future;

use rumqttc::{AsyncClient, QoS};

use chirpbridge_app::ports::transport::MqttTransport;
use chirpbridge_domain::error::BridgeError;

use crate::error::MqttError;

/// Publishes and subscribes at QoS 1 through a shared client handle.
#[derive(Debug, Clone)]
pub struct RumqttTransport {
    client: AsyncClient,
}

impl RumqttTransport {
    #[must_use]
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    /// Send a DISCONNECT once queued requests are flushed.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Client`] when the event loop is gone.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.client.disconnect().await?;
        Ok(())
    }
}

impl MqttTransport for RumqttTransport {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let client = self.client.clone();
        let topic = topic.to_string();
        async move {
            client
                .publish(topic, QoS::AtLeastOnce, retain, payload)
                .await
                .map_err(|err| MqttError::from(err).into_domain())
        }
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let client = self.client.clone();
        let topic = topic.to_string();
        async move {
            client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(|err| MqttError::from(err).into_domain())
        }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let client = self.client.clone();
        let topic = topic.to_string();
        async move {
            client
                .unsubscribe(topic)
                .await
                .map_err(|err| MqttError::from(err).into_domain())
        }
    }
}
