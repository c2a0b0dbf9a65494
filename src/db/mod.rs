pub mod migrate;
pub mod operations;

use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use thiserror::Error;

use crate::config::Config;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the connection pool. The same SQL runs against PostgreSQL and
/// SQLite through the `Any` driver, so every statement uses `$n`
/// placeholders and sticks to BIGINT / DOUBLE PRECISION / TEXT columns.
#[derive(Clone)]
pub struct DatabaseProxy {
    pool: AnyPool,
    backend: Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    fn from_url(url: &str) -> Result<Self, DbInitError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(DbInitError::UnsupportedUrl)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub healthy: bool,
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseProxy {
    pub async fn connect(config: &Config) -> Result<Self, DbInitError> {
        let backend = Backend::from_url(&config.database_url)?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await?;

        let proxy = Self { pool, backend };
        migrate::apply_schema(&proxy).await?;
        tracing::info!(backend = ?backend, "database ready");
        Ok(proxy)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub async fn health(&self) -> HealthStatus {
        let started = Instant::now();
        let result =
            tokio::time::timeout(HEALTH_CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(&self.pool))
                .await;

        match result {
            Ok(Ok(_)) => HealthStatus {
                healthy: true,
                backend: self.backend,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Ok(Err(err)) => HealthStatus {
                healthy: false,
                backend: self.backend,
                latency_ms: None,
                error: Some(err.to_string()),
            },
            Err(_) => HealthStatus {
                healthy: false,
                backend: self.backend,
                latency_ms: None,
                error: Some("timeout".to_string()),
            },
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("DATABASE_URL must start with postgres:// or sqlite:")]
    UnsupportedUrl,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Reads a 0/1 flag column.
pub fn flag(row: &AnyRow, column: &str) -> Result<bool, sqlx::Error> {
    use sqlx::Row;
    let value: i64 = row.try_get(column)?;
    Ok(value != 0)
}

pub fn flag_value(value: bool) -> i64 {
    i64::from(value)
}
