//! Process supervisor for the HTTP and gRPC listeners
//!
//! ```text
//! Initializing ──▶ Running ──▶ ShuttingDown ──▶ Terminated
//!                    │
//!                    ├── SIGINT / SIGTERM ─────┐
//!                    ├── HTTP start failed ────┼──▶ shutdown signal (first wins)
//!                    └── gRPC start failed ────┘
//! ```
//!
//! Shutdown stops HTTP, then gRPC, then the application service, one after the
//! other under a single deadline. A failed stop is logged and the sequence
//! carries on.

use crate::server::{
    shutdown_channel, Component, Listener, ServerError, ShutdownController, ShutdownReason,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one shutdown sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The trigger that won
    pub reason: ShutdownReason,
    /// Components whose `stop` returned an error
    pub failed: Vec<&'static str>,
}

pub struct Supervisor {
    http: Arc<dyn Listener>,
    grpc: Arc<dyn Listener>,
    service: Arc<dyn Component>,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        http: Arc<dyn Listener>,
        grpc: Arc<dyn Listener>,
        service: Arc<dyn Component>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            http,
            grpc,
            service,
            shutdown_timeout,
        }
    }

    /// Run both listeners until `os_signal` resolves or a listener fails, then shut down
    ///
    /// `os_signal` resolves with the signal name; an error means signal handlers
    /// could not be installed and only listener failures can end the run.
    pub async fn run_until<S>(self, os_signal: S) -> ShutdownReport
    where
        S: Future<Output = std::io::Result<&'static str>> + Send + 'static,
    {
        let (controller, mut signal) = shutdown_channel();

        let listeners = vec![
            spawn_listener(self.http.clone(), controller.clone()),
            spawn_listener(self.grpc.clone(), controller.clone()),
        ];

        let watcher_controller = controller.clone();
        let watcher = tokio::spawn(async move {
            match os_signal.await {
                Ok(name) => {
                    watcher_controller.trigger(ShutdownReason::Signal(name));
                }
                Err(e) => error!(error = %e, "Failed to install signal handlers"),
            }
        });

        info!("Supervisor running");
        let reason = signal.wait().await;
        info!(reason = %reason, "Shutting down servers...");

        let deadline = Instant::now() + self.shutdown_timeout;
        let failed = self.stop_all(deadline).await;

        watcher.abort();
        for (name, mut handle) in listeners {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(component = name, "Listener still running after deadline, aborting");
                handle.abort();
            }
        }

        ShutdownReport { reason, failed }
    }

    /// Stop every component in order under one shared deadline
    async fn stop_all(&self, deadline: Instant) -> Vec<&'static str> {
        let mut failed = Vec::new();

        let result = self.http.stop(deadline).await;
        record_stop(self.http.name(), result, &mut failed);

        let result = self.grpc.stop(deadline).await;
        record_stop(self.grpc.name(), result, &mut failed);

        let result = self.service.stop(deadline).await;
        record_stop(self.service.name(), result, &mut failed);

        failed
    }
}

fn spawn_listener(
    listener: Arc<dyn Listener>,
    controller: ShutdownController,
) -> (&'static str, JoinHandle<()>) {
    let name = listener.name();
    let handle = tokio::spawn(async move {
        match listener.start().await {
            Ok(()) => info!(component = name, "Listener finished"),
            Err(e) => {
                error!(component = name, error = %e, "Listener failed");
                controller.trigger(ShutdownReason::ListenerFailed(name));
            }
        }
    });
    (name, handle)
}

fn record_stop(
    name: &'static str,
    result: Result<(), ServerError>,
    failed: &mut Vec<&'static str>,
) {
    match result {
        Ok(()) => info!(component = name, "Component stopped"),
        Err(e) => {
            error!(component = name, error = %e, "Component shutdown failed");
            failed.push(name);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "supervisor_test.rs"]
mod tests;
