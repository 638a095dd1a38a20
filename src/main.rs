//! Pricey Backend Service
//!
//! Main entry point for the price tracking pipeline.
//! Runs one reconciliation-and-notification cycle, or one per `POLL_INTERVAL_SECS`
//! when an interval is configured.

use anyhow::{Context, Result};
use chrono::Utc;
use pricey_backend::clients::{ShopeeClient, SvgChartRenderer, TelegramMessenger};
use pricey_backend::config::AppConfig;
use pricey_backend::database::{create_pool, run_migrations};
use pricey_backend::services::DailyCycle;
use pricey_backend::{AppError, AppState};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("pricey_backend={},sqlx=warn", config.log_level).into()
    });

    if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    init_tracing(&config);

    info!("Pricey backend starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    info!("Max connections: {}", config.database.max_connections);

    run_migrations(&pool, None)
        .await
        .context("Database migration failed")?;
    info!("Database migrations completed successfully");

    // =========================================================================
    // PIPELINE
    // =========================================================================
    let state = AppState::new(pool);

    let pipeline = &config.pipeline;
    let fetcher = ShopeeClient::new(&config.shopee, pipeline.fetch_timeout())
        .map_err(|e| AppError::ExternalService(format!("marketplace client: {}", e)))?;
    let messenger = TelegramMessenger::new(&config.telegram, pipeline.fetch_timeout())
        .map_err(|e| AppError::ExternalService(format!("messenger: {}", e)))?;

    let cycle = DailyCycle::new(
        state.variant_store.clone(),
        state.chart_store.clone(),
        Arc::new(fetcher),
        Arc::new(SvgChartRenderer::new()),
        Arc::new(messenger),
        pipeline,
    );
    info!(
        "Pipeline ready: cap={}, epsilon={}, concurrency={}, fetch timeout={:?}",
        pipeline.notification_cap,
        pipeline.price_epsilon,
        pipeline.concurrency,
        pipeline.fetch_timeout()
    );

    match pipeline.poll_interval() {
        Some(interval) => {
            let handle = tokio::spawn(cycle.start(interval));
            info!("Press Ctrl+C to shutdown gracefully");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, shutting down gracefully...");
                }
                _ = handle => {
                    error!("Cycle task exited unexpectedly");
                }
            }
        }
        None => {
            let report = cycle
                .run(Utc::now().naive_utc())
                .await
                .context("Cycle aborted")?;
            info!(
                "Cycle complete: {} variants, {} changed, {} redrawn, {} notified, {} alerts sent",
                report.variants_seen,
                report.variants_changed,
                report.charts_refreshed,
                report.charts_notified,
                report.alerts_sent
            );
        }
    }

    state.pool.close().await;
    info!("Pricey backend shutdown complete");
    Ok(())
}
