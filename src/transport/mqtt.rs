//! MQTT Broker Transport
//!
//! Connects to the hardware broker, subscribes to the command topics and
//! streams inbound publishes to the bridge. Reconnects with exponential
//! backoff; subscriptions are renewed on every CONNACK.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use super::{BrokerTransport, InboundMessage, TransportError, TransportStatus};
use crate::command::INBOUND_FILTERS;
use crate::config::MqttConfig;
use crate::topic::{topic_matches_filter, validate_topic_filter, validate_topic_name};

/// MQTT client side of the bridge
pub struct MqttTransport {
    /// `host:port` used in log lines
    name: String,
    client: AsyncClient,
    qos: QoS,
    status: Arc<RwLock<TransportStatus>>,
}

impl MqttTransport {
    /// Spawn the connection task.
    ///
    /// Returns the transport handle and the stream of inbound messages.
    /// The task stops when `shutdown` fires or the receiver is dropped.
    pub fn spawn(
        config: &MqttConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> (Arc<Self>, mpsc::Receiver<InboundMessage>) {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keepalive_duration());
        options.set_clean_session(true);
        if let Some((username, password)) = config.credentials() {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let status = Arc::new(RwLock::new(TransportStatus::Connecting));

        let transport = Arc::new(Self {
            name: config.address(),
            client: client.clone(),
            qos: to_qos(config.qos),
            status: status.clone(),
        });

        tokio::spawn(Self::connection_loop(
            config.clone(),
            client,
            eventloop,
            status,
            inbound_tx,
            shutdown,
        ));

        (transport, inbound_rx)
    }

    /// Drive the event loop until shutdown
    async fn connection_loop(
        config: MqttConfig,
        client: AsyncClient,
        mut eventloop: EventLoop,
        status: Arc<RwLock<TransportStatus>>,
        inbound_tx: mpsc::Sender<InboundMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let address = config.address();
        let qos = to_qos(config.qos);
        let mut retry_interval = config.reconnect_interval_duration();
        let max_retry = config.max_reconnect_interval_duration();

        debug!("MQTT: Connecting to {}", address);

        loop {
            let event = tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("MQTT: Shutdown requested");
                    let _ = client.try_disconnect();
                    *status.write() = TransportStatus::Disconnected;
                    return;
                }
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    info!(
                        "MQTT: Connected to {} (session_present={})",
                        address, connack.session_present
                    );
                    *status.write() = TransportStatus::Connected;
                    retry_interval = config.reconnect_interval_duration();

                    for filter in INBOUND_FILTERS {
                        if let Err(e) = validate_topic_filter(filter) {
                            error!("MQTT: Invalid filter {}: {}", filter, e);
                            continue;
                        }
                        if let Err(e) = client.try_subscribe(filter, qos) {
                            error!("MQTT: Failed to subscribe to {}: {}", filter, e);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if !INBOUND_FILTERS
                        .iter()
                        .any(|filter| topic_matches_filter(&publish.topic, filter))
                    {
                        debug!("MQTT: Ignoring message on {}", publish.topic);
                        continue;
                    }

                    let message = InboundMessage::now(publish.topic, publish.payload);
                    if inbound_tx.send(message).await.is_err() {
                        info!("MQTT: Inbound receiver closed, stopping");
                        let _ = client.try_disconnect();
                        *status.write() = TransportStatus::Disconnected;
                        return;
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    debug!("MQTT: SUBACK received (pkid={})", suback.pkid);
                }
                Ok(event) => {
                    trace!("MQTT: {:?}", event);
                }
                Err(e) => {
                    error!("MQTT: Connection to {} failed: {}", address, e);
                    *status.write() = TransportStatus::Backoff;

                    debug!("MQTT: Reconnecting in {:?}", retry_interval);
                    tokio::select! {
                        _ = tokio::time::sleep(retry_interval) => {}
                        _ = shutdown.recv() => {
                            *status.write() = TransportStatus::Disconnected;
                            return;
                        }
                    }
                    retry_interval = std::cmp::min(retry_interval * 2, max_retry);
                    *status.write() = TransportStatus::Connecting;
                }
            }
        }
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> TransportStatus {
        *self.status.read()
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        validate_topic_name(topic).map_err(|e| TransportError::Rejected(e.to_string()))?;

        if self.status() != TransportStatus::Connected {
            warn!("MQTT: Not connected, dropping publish to {}", topic);
            return Err(TransportError::NotConnected);
        }

        self.client
            .try_publish(topic, self.qos, false, payload.to_vec())
            .map_err(|e| match e {
                ClientError::TryRequest(_) => TransportError::QueueFull,
                other => TransportError::Other(other.to_string()),
            })
    }
}

fn to_qos(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        _ => QoS::AtLeastOnce,
    }
}
