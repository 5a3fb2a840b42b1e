//! Start/stop bookkeeping shared by both listeners
//!
//! ```text
//! Idle ──start──▶ Serving ──serving ended──▶ Stopped
//!   │                                           ▲
//!   └──────────────stop before start────────────┘
//! ```
//!
//! `stop` may run before, during or after `start`. A stop before start makes the
//! later `start` return immediately without binding. The serving loop learns the
//! stop deadline through `StopRequest` and force-closes whatever is still open
//! when it passes.

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Serving,
    Stopped,
}

/// Why waiting for the drain gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainTimedOut;

/// Serving side of a stop: resolves with the drain deadline
pub struct StopRequest {
    deadline: watch::Receiver<Option<Instant>>,
}

impl StopRequest {
    /// Wait until `stop` is called and return its deadline
    pub async fn requested(&mut self) -> Instant {
        match self.deadline.wait_for(Option::is_some).await {
            Ok(deadline) => (*deadline).unwrap_or_else(Instant::now),
            // Drain dropped, nothing left to wait for
            Err(_) => Instant::now(),
        }
    }
}

pub struct Drain {
    name: &'static str,
    state: watch::Sender<ListenerState>,
    deadline: watch::Sender<Option<Instant>>,
}

impl Drain {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        let (deadline, _) = watch::channel(None);
        Self {
            name,
            state,
            deadline,
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Move to `Serving`
    ///
    /// Returns the handle that resolves when `stop` is called, or `None` when the
    /// listener must not serve (already stopped, or started twice).
    pub fn begin(&self) -> Option<StopRequest> {
        let started = self.state.send_if_modified(|state| {
            if *state != ListenerState::Idle {
                return false;
            }
            *state = ListenerState::Serving;
            true
        });
        if !started {
            return None;
        }
        // stop() may have fired between the state change and here
        if self.deadline.borrow().is_some() {
            self.finish();
            return None;
        }
        Some(StopRequest {
            deadline: self.deadline.subscribe(),
        })
    }

    /// Mark serving as ended
    pub fn finish(&self) {
        self.state.send_replace(ListenerState::Stopped);
    }

    /// Ask the serving loop to stop by `deadline` and wait for it
    ///
    /// The first call fixes the deadline; later calls only wait.
    pub async fn stop(&self, deadline: Instant) -> Result<(), DrainTimedOut> {
        self.deadline.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(deadline);
            true
        });

        // Never started: nothing to drain, and a later begin() sees the stop
        self.state.send_if_modified(|state| {
            if *state != ListenerState::Idle {
                return false;
            }
            *state = ListenerState::Stopped;
            true
        });

        let mut state = self.state.subscribe();
        let drained =
            tokio::time::timeout_at(deadline, state.wait_for(|s| *s == ListenerState::Stopped))
                .await
                .is_ok();
        if drained {
            Ok(())
        } else {
            warn!(component = self.name, "Drain deadline exceeded");
            Err(DrainTimedOut)
        }
    }
}
