//! MQTT connection wrapper.
//!
//! Owns the rumqttc client and its event loop task. The Last-Will marks
//! `P/status` as `offline` retained; `online` is (re)published on every
//! ConnAck, as are the standing subscriptions. While the broker is
//! unreachable, publishes become warn-logged no-ops: no queuing, no retry
//! at this layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::publisher::BusMessage;

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Topic prefix, used for the status topic and Last-Will.
    pub prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "pitwall".to_string(),
            prefix: "f12mqtt".to_string(),
        }
    }
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Connected MQTT client handle. Cloneable; all clones share the
/// connection.
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    status_topic: String,
}

impl MqttClient {
    /// Connect to the broker and spawn the event loop task. Returns the
    /// client and a receiver of inbound messages on subscribed topics.
    ///
    /// `subscriptions` are (re)established on every ConnAck.
    pub fn connect(
        config: &MqttConfig,
        subscriptions: Vec<String>,
    ) -> (MqttClient, mpsc::Receiver<InboundMessage>) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let status_topic = format!("{}/status", config.prefix);
        options.set_last_will(LastWill::new(
            &status_topic,
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let connected = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let task_client = client.clone();
        let task_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        task_connected.store(true, Ordering::SeqCst);
                        gauge!("publish_connected").set(1.0);
                        info!("bus connected");

                        if let Err(e) = task_client
                            .publish(&status_topic, QoS::AtLeastOnce, true, "online")
                            .await
                        {
                            warn!(error = %e, "failed to publish online status");
                        }
                        for topic in &subscriptions {
                            if let Err(e) =
                                task_client.subscribe(topic, QoS::AtLeastOnce).await
                            {
                                warn!(topic, error = %e, "failed to subscribe");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                        let message = InboundMessage {
                            topic: publish.topic,
                            payload,
                        };
                        if inbound_tx.send(message).await.is_err() {
                            debug!("inbound receiver dropped, stopping event loop");
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if task_connected.swap(false, Ordering::SeqCst) {
                            gauge!("publish_connected").set(0.0);
                            warn!(error = %e, "bus connection lost");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        (
            MqttClient {
                client,
                connected,
                status_topic: format!("{}/status", config.prefix),
            },
            inbound_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publish one message. A no-op with a warning while disconnected.
    pub async fn publish(&self, message: &BusMessage) -> Result<()> {
        if !self.is_connected() {
            warn!(topic = %message.topic, "bus disconnected, dropping publish");
            return Ok(());
        }
        self.client
            .publish(
                &message.topic,
                QoS::AtLeastOnce,
                message.retained,
                message.payload.clone(),
            )
            .await?;
        counter!("publish_messages_total").increment(1);
        Ok(())
    }

    /// Publish a batch in order, stopping silently on disconnect.
    pub async fn publish_all(&self, messages: &[BusMessage]) -> Result<()> {
        for message in messages {
            self.publish(message).await?;
        }
        Ok(())
    }

    /// Publish the retained offline status and disconnect cleanly.
    pub async fn shutdown(&self) {
        if self.is_connected() {
            let _ = self
                .client
                .publish(&self.status_topic, QoS::AtLeastOnce, true, "offline")
                .await;
        }
        let _ = self.client.try_disconnect();
    }
}
