//! HitBridge - MQTT to WebSocket bridge for arena game hardware
//!
//! Hardware events arriving on the broker (damage, heal, reset) are turned
//! into JSON events broadcast to every connected WebSocket client. Client
//! control actions (gun on/off) are published back to the hardware.

pub mod bridge;
pub mod command;
pub mod config;
pub mod fanout;
pub mod guard;
pub mod metrics;
pub mod topic;
pub mod transport;

pub use bridge::{BroadcastEvent, Bridge, ClientMessage, InboundOutcome};
pub use command::{Command, RouteError};
pub use config::Config;
pub use fanout::Fanout;
pub use guard::{DedupGuard, LoopGuard};
pub use metrics::{Metrics, MetricsServer};
pub use transport::{
    BrokerTransport, InboundMessage, MqttTransport, NullTransport, TransportError,
    TransportStatus, WsServer,
};
