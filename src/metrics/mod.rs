//! Prometheus metrics for HitBridge
//!
//! Exposes metrics at /metrics endpoint for monitoring and observability.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

mod server;

pub use server::MetricsServer;

/// All HitBridge metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Broker → clients
    pub inbound_messages_total: IntCounter,
    pub duplicates_suppressed_total: IntCounter,
    pub route_failures_total: IntCounterVec,
    pub self_echoes_dropped_total: IntCounter,
    pub broadcasts_total: IntCounterVec,

    // Clients → broker
    pub broker_publishes_total: IntCounterVec,
    pub broker_publish_failures_total: IntCounter,
    pub client_messages_ignored_total: IntCounter,

    // Connections
    pub websocket_connections_total: IntCounter,
    pub websocket_clients_current: IntGauge,
    pub websocket_connections_rejected_total: IntCounter,

    // Guards
    pub reset_tokens_outstanding: IntGauge,
    pub reset_tokens_expired_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let inbound_messages_total = IntCounter::with_opts(Opts::new(
            "hitbridge_inbound_messages_total",
            "Total messages received from the broker",
        ))
        .unwrap();

        let duplicates_suppressed_total = IntCounter::with_opts(Opts::new(
            "hitbridge_duplicates_suppressed_total",
            "Inbound messages dropped as duplicates",
        ))
        .unwrap();

        let route_failures_total = IntCounterVec::new(
            Opts::new(
                "hitbridge_route_failures_total",
                "Inbound messages that could not be routed, by reason",
            ),
            &["reason"],
        )
        .unwrap();

        let self_echoes_dropped_total = IntCounter::with_opts(Opts::new(
            "hitbridge_self_echoes_dropped_total",
            "Self-published resets absorbed on their way back",
        ))
        .unwrap();

        let broadcasts_total = IntCounterVec::new(
            Opts::new(
                "hitbridge_broadcasts_total",
                "Events broadcast to clients, by type",
            ),
            &["type"],
        )
        .unwrap();

        let broker_publishes_total = IntCounterVec::new(
            Opts::new(
                "hitbridge_broker_publishes_total",
                "Messages queued to the broker, by command",
            ),
            &["command"],
        )
        .unwrap();

        let broker_publish_failures_total = IntCounter::with_opts(Opts::new(
            "hitbridge_broker_publish_failures_total",
            "Publishes the broker transport refused",
        ))
        .unwrap();

        let client_messages_ignored_total = IntCounter::with_opts(Opts::new(
            "hitbridge_client_messages_ignored_total",
            "Client messages that were not valid control actions",
        ))
        .unwrap();

        let websocket_connections_total = IntCounter::with_opts(Opts::new(
            "hitbridge_websocket_connections_total",
            "Total WebSocket clients accepted since startup",
        ))
        .unwrap();

        let websocket_clients_current = IntGauge::with_opts(Opts::new(
            "hitbridge_websocket_clients_current",
            "Currently connected WebSocket clients",
        ))
        .unwrap();

        let websocket_connections_rejected_total = IntCounter::with_opts(Opts::new(
            "hitbridge_websocket_connections_rejected_total",
            "WebSocket connections refused at the connection limit",
        ))
        .unwrap();

        let reset_tokens_outstanding = IntGauge::with_opts(Opts::new(
            "hitbridge_reset_tokens_outstanding",
            "Self-published resets waiting for their echo",
        ))
        .unwrap();

        let reset_tokens_expired_total = IntCounter::with_opts(Opts::new(
            "hitbridge_reset_tokens_expired_total",
            "Reset tokens that expired without an echo",
        ))
        .unwrap();

        registry
            .register(Box::new(inbound_messages_total.clone()))
            .unwrap();
        registry
            .register(Box::new(duplicates_suppressed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(route_failures_total.clone()))
            .unwrap();
        registry
            .register(Box::new(self_echoes_dropped_total.clone()))
            .unwrap();
        registry
            .register(Box::new(broadcasts_total.clone()))
            .unwrap();
        registry
            .register(Box::new(broker_publishes_total.clone()))
            .unwrap();
        registry
            .register(Box::new(broker_publish_failures_total.clone()))
            .unwrap();
        registry
            .register(Box::new(client_messages_ignored_total.clone()))
            .unwrap();
        registry
            .register(Box::new(websocket_connections_total.clone()))
            .unwrap();
        registry
            .register(Box::new(websocket_clients_current.clone()))
            .unwrap();
        registry
            .register(Box::new(websocket_connections_rejected_total.clone()))
            .unwrap();
        registry
            .register(Box::new(reset_tokens_outstanding.clone()))
            .unwrap();
        registry
            .register(Box::new(reset_tokens_expired_total.clone()))
            .unwrap();

        Self {
            registry,
            inbound_messages_total,
            duplicates_suppressed_total,
            route_failures_total,
            self_echoes_dropped_total,
            broadcasts_total,
            broker_publishes_total,
            broker_publish_failures_total,
            client_messages_ignored_total,
            websocket_connections_total,
            websocket_clients_current,
            websocket_connections_rejected_total,
            reset_tokens_outstanding,
            reset_tokens_expired_total,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register() {
        let metrics = Metrics::new();
        metrics.inbound_messages_total.inc();
        metrics.broadcasts_total.with_label_values(&["damage"]).inc();

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"hitbridge_inbound_messages_total".to_string()));
        assert!(names.contains(&"hitbridge_broadcasts_total".to_string()));
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.duplicates_suppressed_total.inc();
        assert_eq!(a.duplicates_suppressed_total.get(), 1);
        assert_eq!(b.duplicates_suppressed_total.get(), 0);
    }
}
