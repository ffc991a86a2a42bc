//! Transport Layer
//!
//! Broker-side and client-side plumbing around the bridge:
//! - [`BrokerTransport`]: publish interface to the hardware broker
//! - [`MqttTransport`]: MQTT implementation with reconnect and inbound stream
//! - [`WsServer`]: WebSocket listener serving the fanout group to clients

mod mqtt;
mod websocket;

pub use mqtt::MqttTransport;
pub use websocket::{ServerError, WsServer};

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;

/// A message delivered by the broker
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: Instant,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, received_at: Instant) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
        }
    }

    /// Stamp a message with the current time
    pub fn now(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(topic, payload, Instant::now())
    }
}

/// Error type for broker transport operations
#[derive(Debug)]
pub enum TransportError {
    /// No broker connection is configured or established
    NotConnected,
    /// Outbound queue is full
    QueueFull,
    /// Topic or payload rejected before sending
    Rejected(String),
    /// Other error
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Broker not connected"),
            TransportError::QueueFull => write!(f, "Outbound queue full"),
            TransportError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            TransportError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Status of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// Not connected, will attempt to connect
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and operational
    Connected,
    /// Connection failed, backing off before retry
    Backoff,
    /// Broker access is turned off in configuration
    Disabled,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Disconnected => "disconnected",
            TransportStatus::Connecting => "connecting",
            TransportStatus::Connected => "connected",
            TransportStatus::Backoff => "backoff",
            TransportStatus::Disabled => "disabled",
        }
    }
}

/// Outbound side of the hardware broker
///
/// Publishing must not block on the network: implementations queue the
/// message and return. Inbound delivery is not part of this trait; a
/// transport hands its inbound stream to the bridge as a channel.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Get the current connection status
    fn status(&self) -> TransportStatus;

    /// Queue a publish to the broker
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;
}

/// Transport used when broker access is disabled
///
/// Every publish fails with [`TransportError::NotConnected`].
#[derive(Debug, Default)]
pub struct NullTransport;

#[async_trait]
impl BrokerTransport for NullTransport {
    fn name(&self) -> &str {
        "disabled"
    }

    fn status(&self) -> TransportStatus {
        TransportStatus::Disabled
    }

    async fn publish(&self, _topic: &str, _payload: Bytes) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }
}
