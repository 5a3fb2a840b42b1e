//! Datastore reachability checker

use super::{CheckContext, CheckError, Checker};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection;
use std::time::Duration;

/// Upper bound on waiting for a pooled connection when the context has no deadline
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pings the database through a lazily-connected pool
#[derive(Clone)]
pub struct DatabaseChecker {
    pool: PgPool,
}

impl DatabaseChecker {
    /// Build a checker without connecting
    ///
    /// Fails only when the connection string cannot be parsed. Connections are
    /// opened on first check.
    pub fn connect_lazy(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(connection_string)?;
        Ok(Self { pool })
    }

    async fn ping(&self) -> Result<(), CheckError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }
}

#[async_trait]
impl Checker for DatabaseChecker {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self, ctx: &CheckContext) -> Result<(), CheckError> {
        ctx.run(self.ping()).await
    }
}
