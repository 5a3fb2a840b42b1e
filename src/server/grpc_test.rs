//! Tests for the gRPC listener and the grpc.health.v1 service

use super::grpc::*;
use super::{Component, Listener};
use crate::health::{CheckContext, CheckError, Checker, Health};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tonic::transport::Channel;
use tonic::Code;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

struct FixedChecker(bool);

#[async_trait]
impl Checker for FixedChecker {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn check(&self, _ctx: &CheckContext) -> Result<(), CheckError> {
        if self.0 {
            Ok(())
        } else {
            Err(CheckError::DeadlineExceeded)
        }
    }
}

fn server_with(healthy: bool) -> Arc<GrpcServer> {
    let health = Arc::new(Health::new(vec![Arc::new(FixedChecker(healthy))]));
    let handlers = GrpcHandlers::new(health, Duration::from_secs(5));
    Arc::new(GrpcServer::new(
        "127.0.0.1:0".parse().unwrap(),
        handlers.routes(),
    ))
}

async fn connect(addr: SocketAddr) -> HealthClient<Channel> {
    let channel = Channel::from_shared(format!("http://{}", addr))
        .expect("valid endpoint")
        .connect()
        .await
        .expect("connect to gRPC server");
    HealthClient::new(channel)
}

async fn wait_for_bind(server: &GrpcServer) -> SocketAddr {
    for _ in 0..100 {
        if let Some(addr) = server.local_addr() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("gRPC server did not bind");
}

#[tokio::test]
async fn test_health_check_reports_serving() {
    let server = server_with(true);
    let running = server.clone();
    let handle = tokio::spawn(async move { running.start().await });
    let addr = wait_for_bind(&server).await;

    let mut client = connect(addr).await;
    let response = client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, ServingStatus::Serving as i32);
    drop(client);

    server
        .stop(Instant::now() + Duration::from_secs(5))
        .await
        .expect("graceful stop");
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("start should return after stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_health_watch_reports_not_serving() {
    let server = server_with(false);
    let running = server.clone();
    let handle = tokio::spawn(async move { running.start().await });
    let addr = wait_for_bind(&server).await;

    let mut client = connect(addr).await;
    let mut stream = client
        .watch(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap()
        .into_inner();

    let first = stream.next().await.expect("one status").unwrap();
    assert_eq!(first.status, ServingStatus::NotServing as i32);
    assert!(stream.next().await.is_none(), "watch ends after one status");

    handle.abort();
}

#[tokio::test]
async fn test_health_check_names() {
    let server = server_with(true);
    let running = server.clone();
    let handle = tokio::spawn(async move { running.start().await });
    let addr = wait_for_bind(&server).await;
    let mut client = connect(addr).await;

    let own = client
        .check(HealthCheckRequest {
            service: "grpc.health.v1.Health".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(own.status, ServingStatus::Serving as i32);

    let unknown = client
        .check(HealthCheckRequest {
            service: "acme.Unknown".to_string(),
        })
        .await
        .expect_err("unknown service must be rejected");
    assert_eq!(unknown.code(), Code::NotFound);

    let watched = client
        .watch(HealthCheckRequest {
            service: "acme.Unknown".to_string(),
        })
        .await
        .expect_err("unknown service must be rejected");
    assert_eq!(watched.code(), Code::NotFound);

    handle.abort();
}

#[tokio::test]
async fn test_stop_before_start_is_safe() {
    let server = server_with(true);

    let stopped = server.stop(Instant::now() + Duration::from_secs(1)).await;
    assert!(stopped.is_ok());

    let started = tokio::time::timeout(Duration::from_secs(1), server.start())
        .await
        .expect("start after stop returns immediately");
    assert!(started.is_ok());
    assert!(server.local_addr().is_none());
}
