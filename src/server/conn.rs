//! Accept loop shared by both listeners
//!
//! Every accepted connection runs in a task owned by the loop. On stop the
//! listener is closed, open connections are asked to finish gracefully, and any
//! still open at the deadline are aborted.

use super::drain::StopRequest;
use axum::http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use std::error::Error as StdError;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::Service;
use tracing::{debug, info, warn};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Pause after a failed accept, typically fd exhaustion
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serve `service` on `listener` until `stop` is requested, then drain
pub(super) async fn serve_connections<S, B>(
    name: &'static str,
    listener: TcpListener,
    builder: Builder<TokioExecutor>,
    service: S,
    mut stop: StopRequest,
) where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    let deadline = loop {
        tokio::select! {
            deadline = stop.requested() => break deadline,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let io = TokioIo::new(stream);
                    let svc = TowerToHyperService::new(service.clone());
                    let conn = graceful.watch(builder.serve_connection(io, svc).into_owned());
                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(
                                component = name,
                                peer = %peer,
                                error = %e,
                                "Connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    warn!(component = name, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    };
    drop(listener);

    info!(
        component = name,
        connections = connections.len(),
        "Draining connections"
    );
    if tokio::time::timeout_at(deadline, graceful.shutdown())
        .await
        .is_err()
    {
        warn!(
            component = name,
            connections = connections.len(),
            "Drain deadline reached, closing remaining connections"
        );
        connections.abort_all();
    }
    while connections.join_next().await.is_some() {}
}
