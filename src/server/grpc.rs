//! gRPC listener and service registration
//!
//! Services are registered through `GrpcHandlers::register`; the listener itself
//! only knows about the resulting `Routes`. The standard `grpc.health.v1.Health`
//! service is registered by default and answers from the same `Health` aggregator
//! as the HTTP probes.

use super::conn::serve_connections;
use super::drain::{Drain, StopRequest};
use super::{Component, Listener, ServerError};
use crate::health::{CheckContext, Health};
use async_trait::async_trait;
use axum::http::Request as HttpRequest;
use hyper::body::Incoming;
use hyper_util::rt::TokioExecutor;
use hyper_util::server::conn::auto::Builder;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_stream::Stream;
use tonic::server::NamedService;
use tonic::service::{Routes, RoutesBuilder};
use tower::ServiceExt;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_server::HealthServer;
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
use tracing::{debug, info};

/// `grpc.health.v1.Health` backed by the dependency checkers
#[derive(Clone)]
pub struct HealthService {
    health: Arc<Health>,
    request_timeout: Duration,
}

impl HealthService {
    pub fn new(health: Arc<Health>, request_timeout: Duration) -> Self {
        Self {
            health,
            request_timeout,
        }
    }

    /// Only the server as a whole (`""`) and the health service itself are known
    fn ensure_known(service: &str) -> Result<(), Status> {
        if service.is_empty() || service == HealthServer::<Self>::NAME {
            Ok(())
        } else {
            Err(Status::not_found(format!("unknown service {}", service)))
        }
    }

    async fn serving_status(&self) -> ServingStatus {
        let ctx = CheckContext::with_timeout(self.request_timeout);
        match self.health.run_checks(&ctx).await {
            Ok(()) => ServingStatus::Serving,
            Err(_) => ServingStatus::NotServing,
        }
    }
}

#[tonic::async_trait]
impl tonic_health::pb::health_server::Health for HealthService {
    type WatchStream =
        Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send + 'static>>;

    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        Self::ensure_known(&service)?;
        let status = self.serving_status().await;
        debug!(service = %service, status = ?status, "gRPC health check");

        Ok(Response::new(HealthCheckResponse {
            status: status as i32,
        }))
    }

    /// Reports the current status once and ends the stream
    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;
        Self::ensure_known(&service)?;
        let status = self.serving_status().await;
        debug!(service = %service, status = ?status, "gRPC health watch");

        let response = HealthCheckResponse {
            status: status as i32,
        };
        Ok(Response::new(
            Box::pin(tokio_stream::once(Ok(response))) as Self::WatchStream
        ))
    }
}

/// Registration hook for gRPC services
pub struct GrpcHandlers {
    health: HealthService,
}

impl GrpcHandlers {
    pub fn new(health: Arc<Health>, request_timeout: Duration) -> Self {
        Self {
            health: HealthService::new(health, request_timeout),
        }
    }

    /// Register every service on the builder
    pub fn register(&self, routes: &mut RoutesBuilder) {
        routes.add_service(HealthServer::new(self.health.clone()));
    }

    pub fn routes(&self) -> Routes {
        let mut builder = RoutesBuilder::default();
        self.register(&mut builder);
        builder.routes()
    }
}

/// gRPC listener lifecycle
pub struct GrpcServer {
    addr: SocketAddr,
    routes: Routes,
    drain: Drain,
    local_addr: OnceLock<SocketAddr>,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, routes: Routes) -> Self {
        Self {
            addr,
            routes,
            drain: Drain::new("grpc"),
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
        info!(address = %local_addr, "gRPC server listening");

        let service = self
            .routes
            .clone()
            .prepare()
            .map_request(|req: HttpRequest<Incoming>| req.map(tonic::body::boxed));
        let builder = Builder::new(TokioExecutor::new()).http2_only();
        serve_connections("grpc", listener, builder, service, stop).await;

        info!("gRPC server stopped");
        Ok(())
    }
}

#[async_trait]
impl Component for GrpcServer {
    fn name(&self) -> &'static str {
        "grpc"
    }

    async fn stop(&self, deadline: Instant) -> Result<(), ServerError> {
        info!("gRPC server stopping");
        self.drain
            .stop(deadline)
            .await
            .map_err(|_| ServerError::DrainTimeout {
                component: self.name(),
            })
    }
}

#[async_trait]
impl Listener for GrpcServer {
    async fn start(&self) -> Result<(), ServerError> {
        let Some(stop) = self.drain.begin() else {
            info!("gRPC server stopped before it started");
            return Ok(());
        };
        info!(address = %self.addr, "gRPC server starting");

        let result = self.serve(stop).await;
        self.drain.finish();
        result
    }
}
