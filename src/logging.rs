//! Structured logging setup
//!
//! `LogConfig` is built once from configuration and installs the global
//! `tracing` subscriber. Defaults: level `info`, format `json`, output `stdout`.
//! `RUST_LOG`, when set, takes precedence over the configured level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Minimum level; unknown names fall back to `Info`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Output encoding; unknown names fall back to `Json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl From<String> for LogFormat {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "text" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

impl From<LogFormat> for String {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => "json".to_string(),
            LogFormat::Text => "text".to_string(),
        }
    }
}

/// Output target: `stdout` or `file:<path>`; anything else means stdout
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum LogOutput {
    #[default]
    Stdout,
    File(PathBuf),
}

impl From<String> for LogOutput {
    fn from(value: String) -> Self {
        match value.trim().strip_prefix("file:") {
            Some(path) if !path.is_empty() => LogOutput::File(PathBuf::from(path)),
            _ => LogOutput::Stdout,
        }
    }
}

impl From<LogOutput> for String {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::Stdout => "stdout".to_string(),
            LogOutput::File(path) => format!("file:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl LogConfig {
    /// Filter from `RUST_LOG`, or the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Build the writer for the configured output
///
/// Returns the writer and, when a log file could not be opened, the error that
/// forced the fallback to stdout.
fn make_writer(output: &LogOutput) -> (BoxMakeWriter, Option<std::io::Error>) {
    match output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), None),
        LogOutput::File(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), None),
            Err(e) => (BoxMakeWriter::new(std::io::stdout), Some(e)),
        },
    }
}

/// Install the global subscriber
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (writer, fallback) = make_writer(&config.output);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(writer);

    match config.format {
        LogFormat::Json => builder.json().try_init()?,
        LogFormat::Text => builder.try_init()?,
    }

    if let Some(e) = fallback {
        tracing::warn!(output = ?config.output, error = %e, "Failed to open log file, using stdout");
    }
    Ok(())
}
