//! HTTP listener for health probes, metrics and request/response endpoints
//!
//! - `/healthz` - Liveness: is the process alive?
//! - `/readyz` - Readiness: should the process receive traffic?
//! - `/startupz` - Startup: has the process finished initializing?
//! - `/metrics` - Prometheus metrics in text format
//! - `/some-endpoint` - sample business endpoint

use super::conn::serve_connections;
use super::drain::{Drain, StopRequest};
use super::metrics::SharedMetrics;
use super::{Component, Listener, ServerError};
use crate::health::{CheckContext, Health, ProbeKind};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hyper_util::rt::TokioExecutor;
use hyper_util::server::conn::auto::Builder;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

const X_REQUEST_ID: &str = "x-request-id";

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub health: Arc<Health>,
    pub metrics: SharedMetrics,
    /// Deadline given to each probe's dependency checks
    pub request_timeout: Duration,
}

async fn probe(state: &HttpState, kind: ProbeKind) -> Response {
    let ctx = CheckContext::with_timeout(state.request_timeout);
    let outcome = state.health.probe(kind, &ctx).await;
    state.metrics.record_probe(kind.as_str(), outcome.healthy);
    (outcome.status(), outcome.body()).into_response()
}

/// Liveness probe handler
///
/// Returns 200 `OK`, or 500 `NOT OK` when a dependency check fails.
async fn healthz(State(state): State<HttpState>) -> Response {
    probe(&state, ProbeKind::Liveness).await
}

/// Readiness probe handler
///
/// Returns 200 `READY`, or 500 `NOT READY` when a dependency check fails.
async fn readyz(State(state): State<HttpState>) -> Response {
    probe(&state, ProbeKind::Readiness).await
}

/// Startup probe handler
///
/// Returns 200 `AVAILABLE`, or 503 `NOT AVAILABLE` when a dependency check fails.
async fn startupz(State(state): State<HttpState>) -> Response {
    probe(&state, ProbeKind::Startup).await
}

/// Prometheus metrics handler
async fn metrics(State(state): State<HttpState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

async fn some_endpoint() -> &'static str {
    "Some data"
}

/// Access log and request metrics
async fn track_requests(State(state): State<HttpState>, request: Request, next: Next) -> Response {
    let started = std::time::Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    state
        .metrics
        .record_request(method.as_str(), status, elapsed.as_secs_f64());
    info!(
        method = %method,
        path = %path,
        status,
        duration_ms = elapsed.as_millis() as u64,
        request_id = %request_id,
        "HTTP request"
    );

    response
}

/// Per-request error boundary: log the panic, answer with an opaque 500
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "Panic recovered while handling request");

    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

fn cors_layer() -> CorsLayer {
    let request_id = HeaderName::from_static(X_REQUEST_ID);
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            request_id.clone(),
        ])
        .expose_headers([request_id])
        .allow_credentials(true)
}

/// Wrap application routes with the standard middleware stack
///
/// Outermost first: CORS, request ID, request ID propagation, access log,
/// panic boundary.
pub fn with_middleware(routes: Router, state: HttpState) -> Router {
    routes
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(state, track_requests))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors_layer())
}

/// Build the router for probe, metrics and business endpoints
pub fn build_router(state: HttpState) -> Router {
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/startupz", get(startupz))
        .route("/metrics", get(self::metrics))
        .route("/some-endpoint", get(some_endpoint))
        .with_state(state.clone());

    with_middleware(routes, state)
}

/// HTTP listener lifecycle
pub struct HttpServer {
    addr: SocketAddr,
    router: Router,
    drain: Drain,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self {
            addr,
            router,
            drain: Drain::new("http"),
            local_addr: OnceLock::new(),
        }
    }

    /// Address actually bound, once `start` has bound the socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn serve(&self, stop: StopRequest) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);
        // Log after successful bind - server is actually listening
        info!(address = %local_addr, "HTTP server listening");

        let builder = Builder::new(TokioExecutor::new());
        serve_connections("http", listener, builder, self.router.clone(), stop).await;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[async_trait]
impl Component for HttpServer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn stop(&self, deadline: Instant) -> Result<(), ServerError> {
        info!("HTTP server stopping");
        self.drain
            .stop(deadline)
            .await
            .map_err(|_| ServerError::DrainTimeout {
                component: self.name(),
            })
    }
}

#[async_trait]
impl Listener for HttpServer {
    async fn start(&self) -> Result<(), ServerError> {
        let Some(stop) = self.drain.begin() else {
            info!("HTTP server stopped before it started");
            return Ok(());
        };
        info!(address = %self.addr, "HTTP server starting");

        let result = self.serve(stop).await;
        self.drain.finish();
        result
    }
}
