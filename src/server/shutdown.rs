//! Graceful shutdown handling
//!
//! A single process-wide shutdown channel. It can be triggered from:
//! - SIGTERM / SIGINT
//! - the HTTP listener failing
//! - the gRPC listener failing
//!
//! Only the first trigger has an effect; the reason it carries is what the
//! supervisor logs.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Why shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal was received
    Signal(&'static str),
    /// A listener's `start` returned an error
    ListenerFailed(&'static str),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::ListenerFailed(component) => write!(f, "{} listener failed", component),
        }
    }
}

/// Receiving half, cloned and passed to whatever needs to wait for shutdown
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    /// Wait for shutdown and return the reason of the first trigger
    pub async fn wait(&mut self) -> ShutdownReason {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::Signal("closed")),
            // Controller dropped, treat as shutdown
            Err(_) => ShutdownReason::Signal("closed"),
        }
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// Reason of the first trigger, if any
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.receiver.borrow()
    }
}

/// Controller for triggering shutdown
#[derive(Clone)]
pub struct ShutdownController {
    sender: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownController {
    /// Trigger shutdown
    ///
    /// Returns `true` only for the call that actually fired the signal.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let fired = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if fired {
            info!(reason = %reason, "Shutdown signal sent");
        }
        fired
    }
}

/// Create a new shutdown signal pair
///
/// Returns (controller, signal) where:
/// - controller: cloned into every task allowed to trigger shutdown
/// - signal: cloned and passed to components that need to listen
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(None);
    (
        ShutdownController {
            sender: Arc::new(sender),
        },
        ShutdownSignal { receiver },
    )
}

/// Wait for SIGTERM or SIGINT signal
///
/// Returns the signal name that was received.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received termination signal");
    Ok(name)
}

/// Wait for Ctrl+C signal (Windows)
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok("CTRL_C")
}
