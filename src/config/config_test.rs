//! Tests for configuration loading
//!
//! Environment overlays go through an explicit lookup so tests never touch the
//! real process environment.

use super::*;
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.server.http.port, 8080);
    assert_eq!(config.server.grpc.port, 9090);
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    assert_eq!(config.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.log.level, LogLevel::Info);
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.log.output, LogOutput::Stdout);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();

    let (config, source) = load_with(dir.path(), env(&[])).unwrap();

    assert_eq!(config, Config::default());
    assert_eq!(source, ConfigSource::Defaults(dir.path().join(CONFIG_FILE)));
}

#[test]
fn test_loads_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE),
        r#"
server:
  http:
    port: 8000
  grpc:
    port: 9000
log:
  level: debug
  format: text
  output: "file:/tmp/service.log"
database:
  connection_string: "postgres://user:pass@db/app"
some_value: hello
"#,
    )
    .unwrap();

    let (config, source) = load_with(dir.path(), env(&[])).unwrap();

    assert_eq!(source, ConfigSource::File(dir.path().join(CONFIG_FILE)));
    assert_eq!(config.server.http.port, 8000);
    assert_eq!(config.server.grpc.port, 9000);
    // Unset fields keep their defaults
    assert_eq!(config.server.http.request_timeout_secs, 10);
    assert_eq!(config.shutdown_timeout_secs, 30);
    assert_eq!(config.log.level, LogLevel::Debug);
    assert_eq!(config.log.format, LogFormat::Text);
    assert_eq!(
        config.log.output,
        LogOutput::File("/tmp/service.log".into())
    );
    assert_eq!(
        config.database.connection_string,
        "postgres://user:pass@db/app"
    );
    assert_eq!(config.some_value, "hello");
}

#[test]
fn test_environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE),
        "server:\n  http:\n    port: 8000\n",
    )
    .unwrap();

    let (config, _) = load_with(
        dir.path(),
        env(&[
            ("SERVER_HTTP_PORT", "8123"),
            ("SERVER_GRPC_PORT", "9123"),
            ("LOG_LEVEL", "warn"),
            ("DATABASE_CONNECTION_STRING", "postgres://env/db"),
            ("SHUTDOWN_TIMEOUT_SECS", "5"),
        ]),
    )
    .unwrap();

    assert_eq!(config.server.http.port, 8123);
    assert_eq!(config.server.grpc.port, 9123);
    assert_eq!(config.log.level, LogLevel::Warn);
    assert_eq!(config.database.connection_string, "postgres://env/db");
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
}

#[test]
fn test_invalid_numeric_env_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let err = load_with(dir.path(), env(&[("SERVER_GRPC_PORT", "not-a-port")])).unwrap_err();

    match err {
        ConfigError::InvalidEnv { key, value } => {
            assert_eq!(key, "SERVER_GRPC_PORT");
            assert_eq!(value, "not-a-port");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_malformed_yaml_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), "server: [unclosed").unwrap();

    let err = load_with(dir.path(), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_empty_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), "\n").unwrap();

    let (config, _) = load_with(dir.path(), env(&[])).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_addresses_bind_all_interfaces() {
    let mut config = Config::default();
    config.server.http.port = 8001;
    config.server.grpc.port = 9001;

    assert_eq!(config.http_addr().to_string(), "0.0.0.0:8001");
    assert_eq!(config.grpc_addr().to_string(), "0.0.0.0:9001");
}
