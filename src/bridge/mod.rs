//! Bridge between the hardware broker and connected clients
//!
//! The [`Bridge`] sits between two message-consuming loops:
//!
//! - **Broker side**: [`Bridge::run_inbound`] drains the transport's inbound
//!   channel. Each message passes the duplicate guard, is routed into a
//!   [`Command`], passes the self-echo guard and is broadcast to clients.
//! - **Client side**: every WebSocket connection hands text frames to
//!   [`Bridge::handle_client_text`]. Gun control actions are published to
//!   the broker and echoed to all clients.
//!
//! # Reset Flow
//!
//! `command/reset` is used in both directions. [`Bridge::trigger_reset`]
//! publishes a reset tagged with a fresh token and broadcasts
//! `{"type":"reset"}` right away. When the broker delivers that reset back,
//! the token identifies it as our own and it is dropped, so clients see one
//! reset per trigger.
//!
//! # Locking
//!
//! Both guards share one mutex. It is only taken for synchronous table
//! updates and released before any publish or broadcast.

mod event;


pub use event::{BroadcastEvent, ClientMessage};

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::command::{self, gun_control_topic, Command, EntityId, RouteError, RESET_TOPIC};
use crate::config::GuardConfig;
use crate::fanout::Fanout;
use crate::guard::{DedupGuard, LoopGuard};
use crate::metrics::Metrics;
use crate::transport::{BrokerTransport, InboundMessage, TransportStatus};

/// What happened to an inbound broker message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Routed and sent to clients
    Broadcast(BroadcastEvent),
    /// Same payload on the same topic within the dedup window
    Duplicate,
    /// Topic could not be turned into a command
    Unroutable(RouteError),
    /// A reset this bridge published, coming back from the broker
    SelfEcho,
}

struct GuardState {
    dedup: DedupGuard,
    loops: LoopGuard,
}

/// The bridge. Construct once and share as `Arc<Bridge>`.
pub struct Bridge {
    transport: Arc<dyn BrokerTransport>,
    fanout: Fanout,
    guards: Mutex<GuardState>,
    metrics: Arc<Metrics>,
}

impl Bridge {
    pub fn new(
        transport: Arc<dyn BrokerTransport>,
        fanout: Fanout,
        guard: &GuardConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            transport,
            fanout,
            guards: Mutex::new(GuardState {
                dedup: DedupGuard::new(guard.dedup_window),
                loops: LoopGuard::new(guard.reset_token_ttl),
            }),
            metrics,
        }
    }

    /// Process one message from the broker
    pub fn handle_inbound(&self, message: InboundMessage) -> InboundOutcome {
        self.metrics.inbound_messages_total.inc();
        let now = message.received_at;

        let command = {
            let mut guards = self.guards.lock();

            if guards
                .dedup
                .should_suppress(&message.topic, &message.payload, now)
            {
                self.metrics.duplicates_suppressed_total.inc();
                warn!("Bridge: Suppressed duplicate message on {}", message.topic);
                return InboundOutcome::Duplicate;
            }

            let command = match command::parse(&message.topic, &message.payload) {
                Ok(command) => command,
                Err(e) => {
                    self.metrics
                        .route_failures_total
                        .with_label_values(&[e.as_str()])
                        .inc();
                    debug!("Bridge: Dropping message: {}", e);
                    return InboundOutcome::Unroutable(e);
                }
            };

            if let Command::Reset {
                origin_id: Some(token),
            } = &command
            {
                if guards.loops.is_self_echo(token, now) {
                    self.metrics
                        .reset_tokens_outstanding
                        .set(guards.loops.outstanding() as i64);
                    self.metrics.self_echoes_dropped_total.inc();
                    debug!("Bridge: Dropped echo of own reset {}", token);
                    return InboundOutcome::SelfEcho;
                }
            }

            command
        };

        match &command {
            Command::Damage { entity_id, amount } => {
                info!("Bridge: Damage {} to entity {}", amount, entity_id)
            }
            Command::Heal { entity_id, amount } => {
                info!("Bridge: Heal {} to entity {}", amount, entity_id)
            }
            Command::Reset { .. } => info!("Bridge: Reset from hardware"),
            Command::GunControl { .. } => {}
        }

        let event = BroadcastEvent::from(&command);
        self.broadcast(event.clone());
        InboundOutcome::Broadcast(event)
    }

    /// Drain the broker's inbound channel until it closes or shutdown fires
    pub async fn run_inbound(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    debug!("Bridge: Inbound loop shutting down");
                    break;
                }
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.handle_inbound(message);
                    }
                    None => {
                        info!("Bridge: Broker inbound stream closed");
                        break;
                    }
                },
            }
        }
    }

    /// Handle a text frame from a client. Anything that is not a known
    /// control action is ignored.
    pub async fn handle_client_text(&self, text: &str) -> Option<BroadcastEvent> {
        match ClientMessage::parse(text) {
            Some(message) => Some(self.handle_client_message(message).await),
            None => {
                self.metrics.client_messages_ignored_total.inc();
                trace!("Bridge: Ignoring client message: {}", text);
                None
            }
        }
    }

    pub async fn handle_client_message(&self, message: ClientMessage) -> BroadcastEvent {
        match message {
            ClientMessage::GunControl { player_id, enabled } => {
                self.set_gun(player_id, enabled).await
            }
        }
    }

    /// Tell a prop to enable or disable its gun, then tell every client.
    ///
    /// The broadcast happens even when the broker publish fails.
    pub async fn set_gun(&self, entity_id: EntityId, enabled: bool) -> BroadcastEvent {
        let topic = gun_control_topic(entity_id);
        let payload = json!({ "enabled": enabled }).to_string();
        self.publish("gun_control", &topic, Bytes::from(payload)).await;

        let event = BroadcastEvent::GunControl {
            player_id: entity_id,
            enabled,
        };
        self.broadcast(event.clone());
        event
    }

    /// Publish a reset to hardware and clients. Returns the token the
    /// broker echo will carry.
    pub async fn trigger_reset(&self) -> String {
        let token = {
            let mut guards = self.guards.lock();
            let token = guards.loops.begin_self_reset(Instant::now());
            self.metrics
                .reset_tokens_outstanding
                .set(guards.loops.outstanding() as i64);
            token
        };

        let payload = json!({ "reset": true, "id": token }).to_string();
        self.publish("reset", RESET_TOPIC, Bytes::from(payload)).await;

        info!("Bridge: Reset triggered ({})", token);
        self.broadcast(BroadcastEvent::Reset);
        token
    }

    /// Expire reset tokens whose echo never arrived
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut guards = self.guards.lock();
        let removed = guards.loops.sweep(now);
        self.metrics
            .reset_tokens_outstanding
            .set(guards.loops.outstanding() as i64);
        drop(guards);

        if removed > 0 {
            self.metrics.reset_tokens_expired_total.inc_by(removed as u64);
            debug!("Bridge: Expired {} reset token(s)", removed);
        }
        removed
    }

    /// Run [`Bridge::sweep_expired`] every `interval` until shutdown
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        bridge.sweep_expired(Instant::now());
                    }
                }
            }
        })
    }

    /// Join the client broadcast group
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastEvent>> {
        self.fanout.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn transport_status(&self) -> TransportStatus {
        self.transport.status()
    }

    /// Reset tokens still waiting for their echo
    pub fn outstanding_resets(&self) -> usize {
        self.guards.lock().loops.outstanding()
    }

    fn broadcast(&self, event: BroadcastEvent) {
        self.metrics
            .broadcasts_total
            .with_label_values(&[event.kind()])
            .inc();
        let receivers = self.fanout.publish(event);
        trace!("Bridge: Broadcast to {} client(s)", receivers);
    }

    async fn publish(&self, command: &str, topic: &str, payload: Bytes) {
        match self.transport.publish(topic, payload).await {
            Ok(()) => {
                self.metrics
                    .broker_publishes_total
                    .with_label_values(&[command])
                    .inc();
                info!("Bridge: Published {} to {}", command, topic);
            }
            Err(e) => {
                self.metrics.broker_publish_failures_total.inc();
                error!(
                    "Bridge: Publish to {} via {} failed: {}",
                    topic,
                    self.transport.name(),
                    e
                );
            }
        }
    }
}
