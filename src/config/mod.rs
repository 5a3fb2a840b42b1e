//! Service configuration
//!
//! Loaded once at startup from `<dir>/app.yaml`, then overlaid with environment
//! variables named after the YAML path (`server.http.port` → `SERVER_HTTP_PORT`).
//! A missing file is not an error; every field has a default.

use crate::logging::{LogConfig, LogFormat, LogLevel, LogOutput};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up inside the config directory
pub const CONFIG_FILE: &str = "app.yaml";

/// Default bounded shutdown deadline
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub database: DatabaseConfig,
    /// Free-form example setting passed through to the application
    pub some_value: String,
    /// Budget shared by every `stop` call during shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            some_value: String::new(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub grpc: GrpcConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    /// Deadline given to each request's dependency checks
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub port: u16,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file; defaults plus environment
    Defaults(PathBuf),
}

impl Config {
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.server.http.port))
    }

    pub fn grpc_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.server.grpc.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.http.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Overlay values found through `lookup`, keyed by environment variable name
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SERVER_HTTP_PORT") {
            self.server.http.port = parse_env("SERVER_HTTP_PORT", v)?;
        }
        if let Some(v) = lookup("SERVER_HTTP_REQUEST_TIMEOUT_SECS") {
            self.server.http.request_timeout_secs =
                parse_env("SERVER_HTTP_REQUEST_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("SERVER_GRPC_PORT") {
            self.server.grpc.port = parse_env("SERVER_GRPC_PORT", v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = LogLevel::from(v);
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.log.format = LogFormat::from(v);
        }
        if let Some(v) = lookup("LOG_OUTPUT") {
            self.log.output = LogOutput::from(v);
        }
        if let Some(v) = lookup("DATABASE_CONNECTION_STRING") {
            self.database.connection_string = v;
        }
        if let Some(v) = lookup("SOME_VALUE") {
            self.some_value = v;
        }
        if let Some(v) = lookup("SHUTDOWN_TIMEOUT_SECS") {
            self.shutdown_timeout_secs = parse_env("SHUTDOWN_TIMEOUT_SECS", v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

/// Parse a YAML document; an empty document yields the defaults
pub fn from_yaml(path: &Path, content: &str) -> Result<Config, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `<dir>/app.yaml` and overlay the process environment
pub fn load(dir: &Path) -> Result<(Config, ConfigSource), ConfigError> {
    load_with(dir, |key| std::env::var(key).ok())
}

/// Same as `load` with an explicit environment lookup
pub fn load_with<F>(dir: &Path, lookup: F) -> Result<(Config, ConfigSource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = dir.join(CONFIG_FILE);
    let (mut config, source) = match std::fs::read_to_string(&path) {
        Ok(content) => (from_yaml(&path, &content)?, ConfigSource::File(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (Config::default(), ConfigSource::Defaults(path))
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };

    config.apply_env(lookup)?;
    Ok((config, source))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "config_test.rs"]
mod tests;
