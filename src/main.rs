//! HitBridge - MQTT to WebSocket bridge for arena game hardware
//!
//! Usage:
//!   hitbridge [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>      Configuration file path
//!   -b, --bind <ADDR>        WebSocket bind address (default: 0.0.0.0:8000)
//!   --mqtt-host <HOST>       Broker host (default: localhost)
//!   --mqtt-port <PORT>       Broker port (default: 1883)
//!   --no-mqtt                Run without a broker connection
//!   --metrics-bind <ADDR>    Enable the metrics/operator endpoint on this address
//!   -l, --log-level          Log level (error, warn, info, debug, trace)
//!   -h, --help               Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hitbridge::config::Config;
use hitbridge::transport::{BrokerTransport, MqttTransport, NullTransport, WsServer};
use hitbridge::{Bridge, Fanout, Metrics, MetricsServer};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// HitBridge - MQTT to WebSocket bridge
#[derive(Parser, Debug)]
#[command(name = "hitbridge")]
#[command(author = "HitBridge Contributors")]
#[command(version)]
#[command(about = "Bridges arena hardware on MQTT to WebSocket clients")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// WebSocket request path
    #[arg(long)]
    ws_path: Option<String>,

    /// Broker host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// Broker port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// Run without a broker connection
    #[arg(long)]
    no_mqtt: bool,

    /// Serve metrics and the operator endpoint on this address
    #[arg(long)]
    metrics_bind: Option<SocketAddr>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(config_path) => Config::load(config_path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging - CLI overrides config, config overrides default (info)
    let log_level = args.log_level.unwrap_or_else(|| {
        match config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    // CLI args override file config
    if let Some(bind) = args.bind {
        config.websocket.bind = bind;
    }
    if let Some(path) = args.ws_path {
        config.websocket.path = path;
    }
    if let Some(host) = args.mqtt_host {
        config.mqtt.host = host;
    }
    if let Some(port) = args.mqtt_port {
        config.mqtt.port = port;
    }
    if args.no_mqtt {
        config.mqtt.enabled = false;
    }
    if let Some(bind) = args.metrics_bind {
        config.metrics.enabled = true;
        config.metrics.bind = bind;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting HitBridge");
    info!(
        "  WebSocket: {} (path: {})",
        config.websocket.bind, config.websocket.path
    );
    info!(
        "  Guards: dedup window {:?}, reset token ttl {:?}",
        config.guard.dedup_window, config.guard.reset_token_ttl
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let metrics = Arc::new(Metrics::new());
    let fanout = Fanout::new(config.websocket.broadcast_capacity);

    let (transport, inbound) = if config.mqtt.enabled {
        if config.mqtt.username.is_some() != config.mqtt.password.is_some() {
            warn!("  MQTT: username and password must both be set, connecting anonymously");
        }
        info!(
            "  MQTT: {} (client_id={}, qos={})",
            config.mqtt.address(),
            config.mqtt.client_id,
            config.mqtt.qos
        );
        let (transport, inbound) = MqttTransport::spawn(&config.mqtt, shutdown_tx.subscribe());
        let transport: Arc<dyn BrokerTransport> = transport;
        (transport, Some(inbound))
    } else {
        warn!("  MQTT: disabled, control actions will not reach hardware");
        let transport: Arc<dyn BrokerTransport> = Arc::new(NullTransport);
        (transport, None)
    };

    let bridge = Arc::new(Bridge::new(transport, fanout, &config.guard, metrics));

    if let Some(inbound) = inbound {
        tokio::spawn(bridge.clone().run_inbound(inbound, shutdown_tx.subscribe()));
    }
    let _sweeper = bridge.spawn_sweeper(config.guard.sweep_interval, shutdown_tx.subscribe());

    if config.metrics.enabled {
        info!("  Metrics: enabled (http://{})", config.metrics.bind);
        let metrics_server = MetricsServer::bind(bridge.clone(), config.metrics.bind).await?;
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = metrics_server.run(shutdown_rx).await {
                error!("Metrics server error: {}", e);
            }
        });
    } else {
        info!("  Metrics: disabled");
    }

    let server = WsServer::bind(&config.websocket, bridge, shutdown_tx.clone()).await?;

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                let _ = signal_tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
