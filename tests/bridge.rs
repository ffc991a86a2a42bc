//! Bridge Integration Tests
//!
//! Drive the bridge through its public API with a transport that records
//! publishes, covering the hardware-to-client and client-to-hardware flows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use hitbridge::config::GuardConfig;
use hitbridge::{
    BroadcastEvent, Bridge, BrokerTransport, Fanout, InboundMessage, Metrics, TransportError,
    TransportStatus,
};

/// Broker stand-in that records publishes and can loop them back inbound
struct LoopbackBroker {
    published: Mutex<Vec<(String, Bytes)>>,
    inbound: mpsc::Sender<InboundMessage>,
}

#[async_trait]
impl BrokerTransport for LoopbackBroker {
    fn name(&self) -> &str {
        "loopback"
    }

    fn status(&self) -> TransportStatus {
        TransportStatus::Connected
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.published
            .lock()
            .push((topic.to_string(), payload.clone()));

        // Hardware sees everything on command/#, including our own resets
        if topic.starts_with("command/") {
            self.inbound
                .try_send(InboundMessage::now(topic, payload))
                .map_err(|_| TransportError::QueueFull)?;
        }
        Ok(())
    }
}

struct Harness {
    bridge: Arc<Bridge>,
    broker: Arc<LoopbackBroker>,
    events: broadcast::Receiver<Arc<BroadcastEvent>>,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown: broadcast::Sender<()>,
}

fn start() -> Harness {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (shutdown, _) = broadcast::channel(1);
    let broker = Arc::new(LoopbackBroker {
        published: Mutex::new(Vec::new()),
        inbound: inbound_tx.clone(),
    });

    let fanout = Fanout::new(64);
    let events = fanout.subscribe();
    let bridge = Arc::new(Bridge::new(
        broker.clone(),
        fanout,
        &GuardConfig::default(),
        Arc::new(Metrics::new()),
    ));
    tokio::spawn(bridge.clone().run_inbound(inbound_rx, shutdown.subscribe()));

    Harness {
        bridge,
        broker,
        events,
        inbound: inbound_tx,
        shutdown,
    }
}

async fn next_event(events: &mut broadcast::Receiver<Arc<BroadcastEvent>>) -> Value {
    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("fanout closed");
    serde_json::to_value(&*event).unwrap()
}

async fn assert_no_event(events: &mut broadcast::Receiver<Arc<BroadcastEvent>>) {
    assert!(
        timeout(Duration::from_millis(150), events.recv())
            .await
            .is_err(),
        "unexpected event"
    );
}

async fn hardware(h: &Harness, topic: &str, payload: &'static str) {
    h.inbound
        .send(InboundMessage::now(topic, Bytes::from_static(payload.as_bytes())))
        .await
        .unwrap();
}

#[tokio::test]
async fn damage_reaches_clients() {
    let mut h = start();

    hardware(&h, "command/damage/3", r#"{"damage":7}"#).await;

    assert_eq!(
        next_event(&mut h.events).await,
        json!({"type": "damage", "player_id": 3, "damage": 7})
    );
}

#[tokio::test]
async fn heal_with_empty_payload_heals_one() {
    let mut h = start();

    hardware(&h, "command/heal/3", "").await;

    assert_eq!(
        next_event(&mut h.events).await,
        json!({"type": "heal", "player_id": 3, "heal": 1})
    );
}

#[tokio::test]
async fn redelivered_damage_counted_once() {
    let mut h = start();

    hardware(&h, "command/damage/3", r#"{"damage":1}"#).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    hardware(&h, "command/damage/3", r#"{"damage":1}"#).await;

    assert_eq!(
        next_event(&mut h.events).await,
        json!({"type": "damage", "player_id": 3, "damage": 1})
    );
    assert_no_event(&mut h.events).await;
    assert_eq!(h.bridge.metrics().duplicates_suppressed_total.get(), 1);
}

#[tokio::test]
async fn different_players_not_deduplicated() {
    let mut h = start();

    hardware(&h, "command/damage/3", r#"{"damage":1}"#).await;
    hardware(&h, "command/damage/4", r#"{"damage":1}"#).await;

    assert_eq!(next_event(&mut h.events).await["player_id"], 3);
    assert_eq!(next_event(&mut h.events).await["player_id"], 4);
}

#[tokio::test]
async fn operator_reset_broadcast_exactly_once() {
    let mut h = start();

    let token = h.bridge.trigger_reset().await;

    let published = h.broker.published.lock().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "command/reset");
    let payload: Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(payload, json!({"reset": true, "id": token}));

    // One broadcast at trigger time; the loopback echo is absorbed
    assert_eq!(next_event(&mut h.events).await, json!({"type": "reset"}));
    assert_no_event(&mut h.events).await;
    assert_eq!(h.bridge.metrics().self_echoes_dropped_total.get(), 1);
    assert_eq!(h.bridge.outstanding_resets(), 0);
}

#[tokio::test]
async fn hardware_reset_still_broadcast_after_operator_reset() {
    let mut h = start();

    h.bridge.trigger_reset().await;
    assert_eq!(next_event(&mut h.events).await, json!({"type": "reset"}));
    assert_no_event(&mut h.events).await;

    hardware(&h, "command/reset", "").await;
    assert_eq!(next_event(&mut h.events).await, json!({"type": "reset"}));
}

#[tokio::test]
async fn gun_control_goes_to_hardware_and_clients() {
    let mut h = start();

    h.bridge
        .handle_client_text(r#"{"type":"gun_control","player_id":5,"enabled":true}"#)
        .await;

    let published = h.broker.published.lock().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "control/gun/5");
    assert_eq!(&published[0].1[..], br#"{"enabled":true}"#);

    assert_eq!(
        next_event(&mut h.events).await,
        json!({"type": "gun_control", "player_id": 5, "enabled": true})
    );
    // control/ topics are not looped back
    assert_no_event(&mut h.events).await;
}

#[tokio::test]
async fn sweeper_expires_lost_reset_tokens() {
    let (_inbound_tx, inbound_rx) = mpsc::channel(1);
    let (shutdown, _) = broadcast::channel(1);
    let broker = Arc::new(LoopbackBroker {
        published: Mutex::new(Vec::new()),
        // Echo path closed: the reset never comes back
        inbound: mpsc::channel(1).0,
    });
    let guard = GuardConfig {
        reset_token_ttl: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let bridge = Arc::new(Bridge::new(
        broker,
        Fanout::new(8),
        &guard,
        Arc::new(Metrics::new()),
    ));
    tokio::spawn(bridge.clone().run_inbound(inbound_rx, shutdown.subscribe()));
    let sweeper = bridge.spawn_sweeper(guard.sweep_interval, shutdown.subscribe());

    bridge.trigger_reset().await;
    assert_eq!(bridge.outstanding_resets(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(bridge.outstanding_resets(), 0);
    assert_eq!(bridge.metrics().reset_tokens_expired_total.get(), 1);

    shutdown.send(()).unwrap();
    timeout(Duration::from_secs(1), sweeper)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_stops_inbound_loop() {
    let mut h = start();
    h.shutdown.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Loop is gone; the channel is closed for senders
    assert!(h
        .inbound
        .send(InboundMessage::new(
            "command/damage/1",
            Bytes::new(),
            Instant::now()
        ))
        .await
        .is_err());
    assert_no_event(&mut h.events).await;
}
