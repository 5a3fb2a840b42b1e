//! Application service stopped alongside the listeners

use crate::server::{Component, ServerError};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

pub struct Service {
    version: &'static str,
}

impl Service {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub async fn start(&self) -> Result<(), ServerError> {
        info!(version = self.version, "Service starting");
        Ok(())
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Component for Service {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn stop(&self, _deadline: Instant) -> Result<(), ServerError> {
        info!("Service stopping");
        Ok(())
    }
}
