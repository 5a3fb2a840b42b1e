//! Tests for the process supervisor
//!
//! Listeners and the application service are replaced by mocks that count calls.

use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Listener mock: serves until stopped, or fails after a delay
struct MockListener {
    name: &'static str,
    fail_start_after: Option<Duration>,
    fail_stop: bool,
    ignore_stop: bool,
    stopped: watch::Sender<bool>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl MockListener {
    fn serving(name: &'static str) -> Self {
        Self {
            name,
            fail_start_after: None,
            fail_stop: false,
            ignore_stop: false,
            stopped: watch::channel(false).0,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    fn failing_after(name: &'static str, delay: Duration) -> Self {
        Self {
            fail_start_after: Some(delay),
            ..Self::serving(name)
        }
    }

    fn with_failing_stop(self) -> Self {
        Self {
            fail_stop: true,
            ..self
        }
    }

    fn ignoring_stop(self) -> Self {
        Self {
            ignore_stop: true,
            ..self
        }
    }

    fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Component for MockListener {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn stop(&self, _deadline: Instant) -> Result<(), ServerError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if !self.ignore_stop {
            self.stopped.send_replace(true);
        }
        if self.fail_stop {
            Err(ServerError::DrainTimeout {
                component: self.name,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Listener for MockListener {
    async fn start(&self) -> Result<(), ServerError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fail_start_after {
            tokio::time::sleep(delay).await;
            return Err(ServerError::Serve(std::io::Error::other("transport broke")));
        }
        let mut stopped = self.stopped.subscribe();
        let _ = stopped.wait_for(|stopped| *stopped).await;
        Ok(())
    }
}

#[derive(Default)]
struct MockService {
    stop_calls: AtomicUsize,
}

#[async_trait]
impl Component for MockService {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn stop(&self, _deadline: Instant) -> Result<(), ServerError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    http: Arc<MockListener>,
    grpc: Arc<MockListener>,
    service: Arc<MockService>,
}

impl Harness {
    fn new(http: MockListener, grpc: MockListener) -> Self {
        Self {
            http: Arc::new(http),
            grpc: Arc::new(grpc),
            service: Arc::new(MockService::default()),
        }
    }

    fn supervisor(&self, shutdown_timeout: Duration) -> Supervisor {
        Supervisor::new(
            self.http.clone(),
            self.grpc.clone(),
            self.service.clone(),
            shutdown_timeout,
        )
    }

    async fn run<S>(&self, os_signal: S) -> ShutdownReport
    where
        S: Future<Output = std::io::Result<&'static str>> + Send + 'static,
    {
        tokio::time::timeout(
            Duration::from_secs(5),
            self.supervisor(Duration::from_secs(1)).run_until(os_signal),
        )
        .await
        .expect("supervisor should finish")
    }

    fn assert_stopped_once(&self) {
        assert_eq!(self.http.stop_calls(), 1, "http stop calls");
        assert_eq!(self.grpc.stop_calls(), 1, "grpc stop calls");
        assert_eq!(
            self.service.stop_calls.load(Ordering::SeqCst),
            1,
            "service stop calls"
        );
    }
}

fn no_signal() -> impl Future<Output = std::io::Result<&'static str>> + Send + 'static {
    std::future::pending()
}

fn signal_after(
    delay: Duration,
    name: &'static str,
) -> impl Future<Output = std::io::Result<&'static str>> + Send + 'static {
    async move {
        tokio::time::sleep(delay).await;
        Ok(name)
    }
}

#[tokio::test]
async fn test_os_signal_triggers_full_shutdown() {
    let harness = Harness::new(MockListener::serving("http"), MockListener::serving("grpc"));

    let report = harness
        .run(signal_after(Duration::from_millis(20), "SIGTERM"))
        .await;

    assert_eq!(report.reason, ShutdownReason::Signal("SIGTERM"));
    assert!(report.failed.is_empty());
    assert_eq!(harness.http.start_calls(), 1);
    assert_eq!(harness.grpc.start_calls(), 1);
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_http_start_failure_stops_grpc() {
    let harness = Harness::new(
        MockListener::failing_after("http", Duration::from_millis(10)),
        MockListener::serving("grpc"),
    );

    let report = harness.run(no_signal()).await;

    assert_eq!(report.reason, ShutdownReason::ListenerFailed("http"));
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_grpc_start_failure_stops_http() {
    let harness = Harness::new(
        MockListener::serving("http"),
        MockListener::failing_after("grpc", Duration::from_millis(10)),
    );

    let report = harness.run(no_signal()).await;

    assert_eq!(report.reason, ShutdownReason::ListenerFailed("grpc"));
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_simultaneous_failures_run_one_shutdown() {
    let harness = Harness::new(
        MockListener::failing_after("http", Duration::ZERO),
        MockListener::failing_after("grpc", Duration::ZERO),
    );

    let report = harness
        .run(signal_after(Duration::ZERO, "SIGINT"))
        .await;

    assert!(matches!(
        report.reason,
        ShutdownReason::ListenerFailed(_) | ShutdownReason::Signal("SIGINT")
    ));
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_failed_stop_does_not_abort_remaining_stops() {
    let harness = Harness::new(
        MockListener::serving("http").with_failing_stop(),
        MockListener::serving("grpc"),
    );

    let report = harness
        .run(signal_after(Duration::from_millis(10), "SIGTERM"))
        .await;

    assert_eq!(report.failed, vec!["http"]);
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_every_failed_stop_is_reported() {
    let harness = Harness::new(
        MockListener::serving("http").with_failing_stop(),
        MockListener::serving("grpc").with_failing_stop(),
    );

    let report = harness
        .run(signal_after(Duration::from_millis(10), "SIGTERM"))
        .await;

    assert_eq!(report.failed, vec!["http", "grpc"]);
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_signal_handler_error_leaves_listeners_running() {
    let harness = Harness::new(
        MockListener::serving("http"),
        MockListener::failing_after("grpc", Duration::from_millis(100)),
    );

    let broken_signal = async { Err::<&'static str, _>(std::io::Error::other("no signal handlers")) };
    let report = harness.run(broken_signal).await;

    // Only the listener failure could end the run
    assert_eq!(report.reason, ShutdownReason::ListenerFailed("grpc"));
    harness.assert_stopped_once();
}

#[tokio::test]
async fn test_listener_ignoring_stop_is_bounded_by_deadline() {
    let harness = Harness::new(
        MockListener::serving("http").ignoring_stop(),
        MockListener::serving("grpc"),
    );

    let started = std::time::Instant::now();
    let report = harness
        .supervisor(Duration::from_millis(100))
        .run_until(signal_after(Duration::from_millis(10), "SIGTERM"))
        .await;

    assert_eq!(report.reason, ShutdownReason::Signal("SIGTERM"));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "shutdown must be bounded by its deadline"
    );
    harness.assert_stopped_once();
}
