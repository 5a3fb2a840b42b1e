//! Network listeners and their lifecycle
//!
//! Two transports share one lifecycle contract:
//! - HTTP (`http`): health probes, metrics and request/response endpoints
//! - gRPC (`grpc`): services registered through `GrpcHandlers`
//!
//! `start` serves until failure or `stop`; `stop` drains within a deadline and
//! force-closes the connections still open when it passes.
//! Also provides the process-wide shutdown channel for SIGTERM/SIGINT.

mod conn;
mod drain;
pub mod grpc;
pub mod http;
pub mod metrics;
pub mod shutdown;

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::time::Instant;

pub use grpc::{GrpcHandlers, GrpcServer};
pub use http::{build_router, HttpServer, HttpState};
pub use metrics::{create_metrics, Metrics, SharedMetrics};
pub use shutdown::{
    shutdown_channel, wait_for_signal, ShutdownController, ShutdownReason, ShutdownSignal,
};

/// Errors from starting or stopping a component
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("{component} did not drain before the deadline")]
    DrainTimeout { component: &'static str },
}

/// Anything the supervisor stops during shutdown
#[async_trait]
pub trait Component: Send + Sync {
    /// Component name for logging
    fn name(&self) -> &'static str;

    /// Stop gracefully, force-closing remaining work at `deadline`
    ///
    /// Safe to call before `start` and concurrently with it.
    async fn stop(&self, deadline: Instant) -> Result<(), ServerError>;
}

/// A network listener with a blocking serve loop
#[async_trait]
pub trait Listener: Component {
    /// Bind and serve until a transport error or until `stop` is called
    ///
    /// Returns `Ok(())` after a requested stop, `Err` on a fatal transport error.
    async fn start(&self) -> Result<(), ServerError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "http_test.rs"]
mod http_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "grpc_test.rs"]
mod grpc_tests;
