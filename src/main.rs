use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use twinserve::config::{self, ConfigSource};
use twinserve::health::{Checker, DatabaseChecker, Health};
use twinserve::logging;
use twinserve::server::{
    build_router, create_metrics, wait_for_signal, GrpcHandlers, GrpcServer, HttpServer,
    HttpState,
};
use twinserve::service::Service;
use twinserve::supervisor::Supervisor;

/// HTTP and gRPC service with health probes and graceful shutdown
#[derive(Debug, Parser)]
#[command(name = "twinserve", version)]
pub struct Cli {
    /// Directory containing app.yaml
    #[arg(long, env = "CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, source) = config::load(&cli.config_dir).context("Failed to load config")?;

    logging::init(&config.log).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults(path) => warn!(
            path = %path.display(),
            "Config file not found, using defaults and environment"
        ),
    }
    info!(
        http_port = config.server.http.port,
        grpc_port = config.server.grpc.port,
        shutdown_timeout_secs = config.shutdown_timeout_secs,
        "Starting twinserve"
    );

    let service = Arc::new(Service::new());

    let database = match DatabaseChecker::connect_lazy(&config.database.connection_string) {
        Ok(checker) => checker,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };
    let checkers: Vec<Arc<dyn Checker>> = vec![Arc::new(database)];
    let health = Arc::new(Health::new(checkers));

    let metrics = create_metrics().context("Failed to create metrics registry")?;
    info!("Prometheus metrics registry initialized");

    let http_state = HttpState {
        health: health.clone(),
        metrics,
        request_timeout: config.request_timeout(),
    };
    let http = Arc::new(HttpServer::new(config.http_addr(), build_router(http_state)));

    let grpc_handlers = GrpcHandlers::new(health, config.request_timeout());
    let grpc = Arc::new(GrpcServer::new(config.grpc_addr(), grpc_handlers.routes()));

    if let Err(e) = service.start().await {
        error!(error = %e, "Service failed to start");
        return Err(e.into());
    }

    let supervisor = Supervisor::new(http, grpc, service, config.shutdown_timeout());
    let report = supervisor.run_until(wait_for_signal()).await;

    info!(
        reason = %report.reason,
        failed = ?report.failed,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
