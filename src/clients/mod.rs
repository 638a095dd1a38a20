//! Boundaries to the marketplace, chart drawing and message delivery.

pub mod render;
pub mod shopee;
pub mod telegram;

pub use render::SvgChartRenderer;
pub use shopee::ShopeeClient;
pub use telegram::TelegramMessenger;

use crate::models::{Chart, TrackedVariant};
use chrono::NaiveDate;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Current price and stock of one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// Item or variant no longer listed
    #[error("variant not found: {0}")]
    NotFound(String),

    #[error("marketplace did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("marketplace request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected marketplace payload: {0}")]
    Decode(String),
}

/// A drawn chart, ready to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("chart {0} has no price series to draw")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("message endpoint unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Resolves the current price of a tracked variant
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch(&self, variant: &TrackedVariant) -> Result<PriceQuote, FetchError>;
}

/// Draws a chart from the daily series mirrored into its members
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, chart: &Chart) -> Result<RenderedChart, RenderError>;
}

/// Delivers messages to a chat
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError>;

    /// Replace the image of the chart message `chart_id` in `chat_id`.
    async fn update_chart(
        &self,
        chat_id: &str,
        chart_id: &str,
        chart: &RenderedChart,
        caption: &str,
    ) -> Result<(), DeliveryError>;
}

/// Caption shown under a refreshed chart
pub fn chart_caption(date: NaiveDate) -> String {
    format!("_Last updated on {}_", date.format("%Y-%m-%d"))
}
