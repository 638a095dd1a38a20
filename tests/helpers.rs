#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use pricey_backend::clients::{
    ChartRenderer, DeliveryError, FetchError, Messenger, PriceFetcher, PriceQuote, RenderError,
    RenderedChart,
};
use pricey_backend::config::PipelineConfig;
use pricey_backend::error::RepositoryError;
use pricey_backend::models::*;
use pricey_backend::repositories::*;
use pricey_backend::services::*;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SITE_URL: &str = "https://shopee.sg";

/// 09:00 on the `n`th day after 2024-01-01
pub fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        + Duration::days(n)
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        fetch_timeout_secs: 1,
        notification_cap: 3,
        price_epsilon: Decimal::new(1, 2),
        concurrency: 4,
        poll_interval_secs: None,
    }
}

pub fn selection(variant_id: &str, price: Decimal) -> VariantSelection {
    VariantSelection {
        variant_id: variant_id.to_string(),
        variant_name: format!("Variant {}", variant_id),
        item_id: format!("item-{}", variant_id),
        item_name: format!("Item {}", variant_id),
        shop_id: "shop-1".to_string(),
        channel: Channel::Shopee,
        currency: Some("SGD".to_string()),
        price,
        stock: 10,
    }
}

pub fn track_request(
    chat_id: &str,
    chart_id: &str,
    threshold: i32,
    selections: Vec<VariantSelection>,
) -> TrackRequest {
    TrackRequest {
        chat_id: chat_id.to_string(),
        chart_id: chart_id.to_string(),
        chart_name: Some(format!("Chart {}", chart_id)),
        threshold,
        selections,
    }
}

fn unavailable<T>() -> RepoResult<T> {
    Err(RepositoryError::Query(sqlx::Error::PoolTimedOut))
}

/// In-memory implementation of both stores with the same semantics as the Postgres ones
#[derive(Default)]
pub struct MemoryStore {
    variants: Mutex<BTreeMap<String, TrackedVariant>>,
    charts: Mutex<BTreeMap<(String, String), Chart>>,
    down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every call fail as if the database were unreachable
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    pub fn variant(&self, variant_id: &str) -> TrackedVariant {
        self.variants.lock().unwrap()[variant_id].clone()
    }

    pub fn chart(&self, chat_id: &str, chart_id: &str) -> Chart {
        self.charts.lock().unwrap()[&(chat_id.to_string(), chart_id.to_string())].clone()
    }

    pub fn remove_chart(&self, chat_id: &str, chart_id: &str) {
        self.charts
            .lock()
            .unwrap()
            .remove(&(chat_id.to_string(), chart_id.to_string()));
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn list_all(&self) -> RepoResult<Vec<TrackedVariant>> {
        if self.is_down() {
            return unavailable();
        }
        Ok(self.variants.lock().unwrap().values().cloned().collect())
    }

    async fn find_by_id(&self, variant_id: &str) -> RepoResult<Option<TrackedVariant>> {
        if self.is_down() {
            return unavailable();
        }
        Ok(self.variants.lock().unwrap().get(variant_id).cloned())
    }

    async fn upsert(&self, variant: &TrackedVariant) -> RepoResult<TrackedVariant> {
        if self.is_down() {
            return unavailable();
        }
        self.variants
            .lock()
            .unwrap()
            .insert(variant.variant_id.clone(), variant.clone());
        Ok(variant.clone())
    }
}

#[async_trait]
impl ChartStore for MemoryStore {
    async fn list_all(&self) -> RepoResult<Vec<Chart>> {
        if self.is_down() {
            return unavailable();
        }
        Ok(self.charts.lock().unwrap().values().cloned().collect())
    }

    async fn find(&self, key: &ChartKey) -> RepoResult<Option<Chart>> {
        if self.is_down() {
            return unavailable();
        }
        Ok(self
            .charts
            .lock()
            .unwrap()
            .get(&(key.chat_id.clone(), key.chart_id.clone()))
            .cloned())
    }

    async fn find_by_variant(&self, variant_id: &str) -> RepoResult<Vec<Chart>> {
        if self.is_down() {
            return unavailable();
        }
        Ok(self
            .charts
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.references(variant_id))
            .cloned()
            .collect())
    }

    async fn insert(&self, chart: &Chart) -> RepoResult<Chart> {
        if self.is_down() {
            return unavailable();
        }
        let mut charts = self.charts.lock().unwrap();
        let key = (chart.chat_id.clone(), chart.chart_id.clone());
        if charts.contains_key(&key) {
            return Err(RepositoryError::Duplicate(chart.key().to_string()));
        }
        charts.insert(key, chart.clone());
        Ok(chart.clone())
    }

    async fn mirror_variant(&self, variant: &TrackedVariant) -> RepoResult<Vec<ChartKey>> {
        if self.is_down() {
            return unavailable();
        }
        let mut touched = Vec::new();
        for chart in self.charts.lock().unwrap().values_mut() {
            if chart.mirror_variant(variant) > 0 {
                touched.push(chart.key());
            }
        }
        Ok(touched)
    }

    async fn save_evaluation(
        &self,
        key: &ChartKey,
        evaluation: &ChartEvaluation,
        now: NaiveDateTime,
    ) -> RepoResult<Chart> {
        if self.is_down() {
            return unavailable();
        }
        let mut charts = self.charts.lock().unwrap();
        let chart = charts
            .get_mut(&(key.chat_id.clone(), key.chart_id.clone()))
            .ok_or_else(|| RepositoryError::NotFound(format!("chart {}", key)))?;
        chart
            .apply_evaluation(evaluation, now)
            .map_err(RepositoryError::InvalidInput)?;
        Ok(chart.clone())
    }

    async fn increment_notification_count(
        &self,
        key: &ChartKey,
        expected: i32,
        now: NaiveDateTime,
    ) -> RepoResult<Option<i32>> {
        if self.is_down() {
            return unavailable();
        }
        let mut charts = self.charts.lock().unwrap();
        match charts.get_mut(&(key.chat_id.clone(), key.chart_id.clone())) {
            Some(chart) if chart.notification_count == expected => {
                chart.notification_count += 1;
                chart.last_notified_time = Some(now);
                Ok(Some(chart.notification_count))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Script {
    Quote(PriceQuote),
    NotFound,
    Hang,
}

/// Price fetcher answering from a per-variant script
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_price(&self, variant_id: &str, price: Decimal, stock: i32) {
        self.scripts
            .lock()
            .unwrap()
            .insert(variant_id.to_string(), Script::Quote(PriceQuote { price, stock }));
    }

    pub fn set_not_found(&self, variant_id: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(variant_id.to_string(), Script::NotFound);
    }

    pub fn set_hang(&self, variant_id: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(variant_id.to_string(), Script::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFetcher for ScriptedFetcher {
    async fn fetch(&self, variant: &TrackedVariant) -> Result<PriceQuote, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().get(&variant.variant_id).copied();
        match script {
            Some(Script::Quote(quote)) => Ok(quote),
            Some(Script::Hang) => futures::future::pending().await,
            Some(Script::NotFound) | None => Err(FetchError::NotFound(variant.variant_id.clone())),
        }
    }
}

/// Chart drawn by `RecordingRenderer`: the key it was drawn for and each member's series
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnChart {
    pub key: String,
    pub title: String,
    pub series: Vec<PriceSeries>,
}

/// Renderer that records the series it was asked to draw and can be told to fail
#[derive(Default)]
pub struct RecordingRenderer {
    drawn: Mutex<Vec<DrawnChart>>,
    failing: AtomicBool,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn drawn(&self) -> Vec<DrawnChart> {
        self.drawn.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChartRenderer for RecordingRenderer {
    async fn render(&self, chart: &Chart) -> Result<RenderedChart, RenderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RenderError::Empty(chart.key().to_string()));
        }
        self.drawn.lock().unwrap().push(DrawnChart {
            key: chart.key().to_string(),
            title: chart.display_name().to_string(),
            series: chart.variants.iter().map(|m| m.series.clone()).collect(),
        });
        Ok(RenderedChart {
            file_name: format!("{}.png", chart.chart_id),
            content_type: "image/png".to_string(),
            bytes: chart.display_name().as_bytes().to_vec(),
        })
    }
}

/// Chart message replacement seen by `RecordingMessenger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartUpdate {
    pub chat_id: String,
    pub chart_id: String,
    pub file_name: String,
    pub caption: String,
}

/// Messenger that records what it sends and can be told to fail
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
    updates: Mutex<Vec<ChartUpdate>>,
    failing: AtomicBool,
    updates_failing: AtomicBool,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make chart message updates fail; alerts are unaffected
    pub fn set_updates_failing(&self, failing: bool) {
        self.updates_failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<ChartUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("endpoint down".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn update_chart(
        &self,
        chat_id: &str,
        chart_id: &str,
        chart: &RenderedChart,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        if self.updates_failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("message to edit not found".to_string()));
        }
        self.updates.lock().unwrap().push(ChartUpdate {
            chat_id: chat_id.to_string(),
            chart_id: chart_id.to_string(),
            file_name: chart.file_name.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}

/// Everything a pipeline test needs, wired against in-memory collaborators
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub renderer: Arc<RecordingRenderer>,
    pub messenger: Arc<RecordingMessenger>,
    pub cycle: DailyCycle,
    pub tracking: TrackingService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(pipeline_config())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = MemoryStore::new();
        let fetcher = ScriptedFetcher::new();
        let renderer = RecordingRenderer::new();
        let messenger = RecordingMessenger::new();

        let variant_store: Arc<dyn VariantStore> = store.clone();
        let chart_store: Arc<dyn ChartStore> = store.clone();

        let cycle = DailyCycle::new(
            variant_store.clone(),
            chart_store.clone(),
            fetcher.clone(),
            renderer.clone(),
            messenger.clone(),
            &config,
        );
        let tracking = TrackingService::new(variant_store, chart_store, SITE_URL.to_string());

        Self {
            store,
            fetcher,
            renderer,
            messenger,
            cycle,
            tracking,
        }
    }

    /// Register a chart at `day(0)` with every variant priced as given
    pub async fn track(
        &self,
        chat_id: &str,
        chart_id: &str,
        threshold: i32,
        prices: &[(&str, Decimal)],
    ) -> Chart {
        let selections = prices
            .iter()
            .map(|(id, price)| {
                self.fetcher.set_price(id, *price, 10);
                selection(id, *price)
            })
            .collect();
        self.tracking
            .track(track_request(chat_id, chart_id, threshold, selections), day(0))
            .await
            .unwrap()
    }
}
