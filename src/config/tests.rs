//! Config module tests

use super::*;

#[test]
fn test_substitute_env_vars_simple() {
    std::env::set_var("HB_TEST_VAR_SIMPLE", "hello");
    let result = substitute_env_vars("value = \"${HB_TEST_VAR_SIMPLE}\"");
    assert_eq!(result, "value = \"hello\"");
    std::env::remove_var("HB_TEST_VAR_SIMPLE");
}

#[test]
fn test_substitute_env_vars_with_default() {
    std::env::remove_var("HB_TEST_VAR_UNSET");
    let result = substitute_env_vars("value = \"${HB_TEST_VAR_UNSET:-fallback}\"");
    assert_eq!(result, "value = \"fallback\"");

    std::env::set_var("HB_TEST_VAR_SET", "env_value");
    let result = substitute_env_vars("value = \"${HB_TEST_VAR_SET:-fallback}\"");
    assert_eq!(result, "value = \"env_value\"");
    std::env::remove_var("HB_TEST_VAR_SET");
}

#[test]
fn test_substitute_env_vars_missing_no_default() {
    std::env::remove_var("HB_TEST_VAR_MISSING");
    let result = substitute_env_vars("value = \"${HB_TEST_VAR_MISSING}\"");
    assert_eq!(result, "value = \"\"");
}

#[test]
fn test_load_config_with_env_substitution() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("hitbridge.toml");

    std::env::set_var("HB_TEST_BROKER_HOST", "10.0.0.5");

    let config_content = r#"
[mqtt]
host = "${HB_TEST_BROKER_HOST}"
port = ${HB_TEST_BROKER_PORT:-1884}

[guard]
dedup_window = "750ms"
"#;

    std::fs::write(&config_path, config_content).unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.mqtt.host, "10.0.0.5");
    assert_eq!(config.mqtt.port, 1884);
    assert_eq!(config.guard.dedup_window, Duration::from_millis(750));
    assert_eq!(config.guard.reset_token_ttl, Duration::from_secs(5));
    assert_eq!(config.websocket.path, "/ws/game/");

    std::env::remove_var("HB_TEST_BROKER_HOST");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.log.level, "info");
    assert!(!config.metrics.enabled);
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.mqtt.enabled);
    assert_eq!(config.mqtt.host, "localhost");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.qos, 0);
    assert_eq!(config.websocket.bind.port(), 8000);
    assert_eq!(config.websocket.path, "/ws/game/");
    assert_eq!(config.guard.dedup_window, Duration::from_secs(1));
    assert_eq!(config.guard.reset_token_ttl, Duration::from_secs(5));
    assert!(!config.metrics.enabled);
}

#[test]
fn test_parse_minimal_config() {
    let toml = r#"
[mqtt]
host = "broker.arena.local"
"#;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.mqtt.host, "broker.arena.local");
    assert_eq!(config.mqtt.port, 1883);
}

#[test]
fn test_parse_full_config() {
    let toml = r#"
[log]
level = "debug"

[mqtt]
enabled = true
host = "192.168.1.20"
port = 1884
client_id = "arena-bridge"
username = "arena"
password = "secret"
keepalive = 30
reconnect_interval = 2
max_reconnect_interval = 60
qos = 1
channel_capacity = 256

[websocket]
bind = "127.0.0.1:8001"
path = "/ws/arena/"
broadcast_capacity = 64
max_connections = 20

[guard]
dedup_window = "500ms"
reset_token_ttl = "10s"
sweep_interval = "2s"

[metrics]
enabled = true
bind = "127.0.0.1:9100"
"#;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.mqtt.client_id, "arena-bridge");
    assert_eq!(config.mqtt.credentials(), Some(("arena", "secret")));
    assert_eq!(config.mqtt.qos, 1);
    assert_eq!(config.mqtt.channel_capacity, 256);
    assert_eq!(config.websocket.bind.to_string(), "127.0.0.1:8001");
    assert_eq!(config.websocket.path, "/ws/arena/");
    assert_eq!(config.websocket.max_connections, 20);
    assert_eq!(config.guard.dedup_window, Duration::from_millis(500));
    assert_eq!(config.guard.reset_token_ttl, Duration::from_secs(10));
    assert_eq!(config.guard.sweep_interval, Duration::from_secs(2));
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.bind.port(), 9100);
}

#[test]
fn test_invalid_qos() {
    let toml = r#"
[mqtt]
qos = 2
"#;

    assert!(matches!(Config::parse(toml), Err(ConfigError::Validation(_))));
}

#[test]
fn test_empty_host_rejected_when_enabled() {
    let toml = r#"
[mqtt]
host = ""
"#;
    assert!(Config::parse(toml).is_err());

    let toml = r#"
[mqtt]
enabled = false
host = ""
"#;
    assert!(Config::parse(toml).is_ok());
}

#[test]
fn test_websocket_path_must_be_absolute() {
    let toml = r#"
[websocket]
path = "ws/game/"
"#;

    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_zero_guard_window_rejected() {
    let toml = r#"
[guard]
dedup_window = "0s"
"#;

    assert!(Config::parse(toml).is_err());
}

#[test]
fn test_bad_duration_is_parse_error() {
    let toml = r#"
[guard]
reset_token_ttl = "five seconds"
"#;

    assert!(matches!(Config::parse(toml), Err(ConfigError::Parse(_))));
}
