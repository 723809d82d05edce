//! Postgres adapter.
//!
//! All repositories run plain bound queries against one shared pool, so
//! the crate builds without a live database. Counter movements and
//! terminal transitions are expressed as single conditional updates;
//! the schema in `migrations/` backs them with CHECK constraints and a
//! unique waitlist pair index.

pub mod repositories;

use std::fmt;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::error::{CirculationError, Result};

#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    max_connections: u32,
    min_connections: u32,
}

impl fmt::Debug for PostgresDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDatabase")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl PostgresDatabase {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);
        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(2);

        Self::with_limits(connection_string, max_connections, min_connections)
            .await
    }

    pub async fn with_limits(
        connection_string: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .test_before_acquire(true)
            .connect(connection_string)
            .await
            .map_err(|e| {
                CirculationError::Internal(format!(
                    "Database connection failed: {e}"
                ))
            })?;

        info!(
            max_connections,
            min_connections, "database pool initialized"
        );

        Ok(Self {
            pool,
            max_connections,
            min_connections,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the bundled migrations.
    pub async fn initialize_schema(&self) -> Result<()> {
        crate::MIGRATOR.run(&self.pool).await.map_err(|e| {
            CirculationError::Internal(format!("Migration failed: {e}"))
        })?;
        Ok(())
    }
}
