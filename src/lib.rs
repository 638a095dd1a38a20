//! Pricey Backend Library
//!
//! Price tracking pipeline: reconciles marketplace prices into daily series, mirrors them
//! into user charts, evaluates thresholds and sends alerts.

pub mod clients;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repositories::{ChartRepository, ChartStore, VariantRepository, VariantStore};
use sqlx::PgPool;
use std::sync::Arc;

/// Application state: the pool and the PostgreSQL-backed stores built on it
pub struct AppState {
    pub pool: PgPool,
    pub variant_store: Arc<dyn VariantStore>,
    pub chart_store: Arc<dyn ChartStore>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            variant_store: Arc::new(VariantRepository::new(pool.clone())),
            chart_store: Arc::new(ChartRepository::new(pool.clone())),
            pool,
        }
    }
}
