//! Dependency health checks and Kubernetes probes
//!
//! A `Health` aggregator owns an ordered list of `Checker`s and answers three probes:
//! - `/healthz` - Liveness: should the process be considered dead?
//! - `/readyz` - Readiness: should the process receive traffic?
//! - `/startupz` - Startup: has the process finished initializing?
//!
//! All three run the same checks; they differ only in how the result is reported.

pub mod database;

use async_trait::async_trait;
use axum::http::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use database::DatabaseChecker;

/// Errors reported by a single dependency check
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Check deadline exceeded")]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Operation context handed to every checker
///
/// Carries the caller's deadline, typically derived from the incoming request.
/// Dropping the check future cancels it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckContext {
    deadline: Option<Instant>,
}

impl CheckContext {
    /// Context without a deadline
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has already passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Drive a check future, failing with `DeadlineExceeded` once the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, CheckError>
    where
        F: Future<Output = Result<T, CheckError>>,
    {
        match self.deadline {
            Some(_) if self.is_expired() => Err(CheckError::DeadlineExceeded),
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| CheckError::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}

/// A pluggable dependency reachability test
#[async_trait]
pub trait Checker: Send + Sync {
    /// Checker name for logging
    fn name(&self) -> &str;

    /// Report whether the dependency is currently reachable
    ///
    /// Must return within the context deadline and must not panic.
    async fn check(&self, ctx: &CheckContext) -> Result<(), CheckError>;
}

/// Probe kinds served over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Liveness,
    Readiness,
    Startup,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Liveness => "liveness",
            ProbeKind::Readiness => "readiness",
            ProbeKind::Startup => "startup",
        }
    }

    /// Status code and body reported for a probe result
    pub fn response(&self, healthy: bool) -> (StatusCode, &'static str) {
        match (self, healthy) {
            (ProbeKind::Liveness, true) => (StatusCode::OK, "OK"),
            (ProbeKind::Liveness, false) => (StatusCode::INTERNAL_SERVER_ERROR, "NOT OK"),
            (ProbeKind::Readiness, true) => (StatusCode::OK, "READY"),
            (ProbeKind::Readiness, false) => (StatusCode::INTERNAL_SERVER_ERROR, "NOT READY"),
            (ProbeKind::Startup, true) => (StatusCode::OK, "AVAILABLE"),
            (ProbeKind::Startup, false) => (StatusCode::SERVICE_UNAVAILABLE, "NOT AVAILABLE"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub kind: ProbeKind,
    pub healthy: bool,
}

impl ProbeOutcome {
    pub fn status(&self) -> StatusCode {
        self.kind.response(self.healthy).0
    }

    pub fn body(&self) -> &'static str {
        self.kind.response(self.healthy).1
    }
}

/// Aggregates dependency checkers into a single pass/fail
///
/// Immutable after construction; share it through an `Arc`.
#[derive(Clone, Default)]
pub struct Health {
    checkers: Vec<Arc<dyn Checker>>,
}

impl Health {
    pub fn new(checkers: Vec<Arc<dyn Checker>>) -> Self {
        Self { checkers }
    }

    /// Run every checker in registration order, stopping at the first failure
    pub async fn run_checks(&self, ctx: &CheckContext) -> Result<(), CheckError> {
        for checker in &self.checkers {
            if let Err(e) = checker.check(ctx).await {
                warn!(checker = checker.name(), error = %e, "Health check failed");
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn probe(&self, kind: ProbeKind, ctx: &CheckContext) -> ProbeOutcome {
        let healthy = self.run_checks(ctx).await.is_ok();
        debug!(probe = kind.as_str(), healthy, "Probe evaluated");
        ProbeOutcome { kind, healthy }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "health_test.rs"]
mod tests;
