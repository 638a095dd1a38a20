use crate::config::DatabaseConfig;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Where `run_migrations` looks when no directory is given
pub const MIGRATIONS_DIR: &str = "./migrations";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolCreation(sqlx::Error),

    #[error("Database connection timeout")]
    ConnectionTimeout,

    #[error("Database migration failed: {0}")]
    Migration(#[from] MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DatabaseError::ConnectionTimeout,
            other => DatabaseError::PoolCreation(other),
        }
    }
}

/// Open the pool holding tracked variants and charts, then ping it once so a bad URL
/// or a down server fails start-up instead of the first cycle.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    if config.url.trim().is_empty() {
        return Err(DatabaseError::Config("database url is empty".to_string()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .test_before_acquire(config.test_before_acquire)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    debug!(max_connections = config.max_connections, "Database pool ready");

    Ok(pool)
}

/// Apply the `variants` and `charts` schema from `dir`, or `MIGRATIONS_DIR`.
pub async fn run_migrations(pool: &PgPool, dir: Option<&str>) -> Result<(), DatabaseError> {
    let dir = dir.unwrap_or(MIGRATIONS_DIR);
    let migrator = Migrator::new(Path::new(dir)).await?;
    info!(dir, migrations = migrator.iter().count(), "Applying migrations");
    migrator.run(pool).await?;
    Ok(())
}
