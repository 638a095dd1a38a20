use crate::error::{AppError, AppResult};
use crate::models::{Channel, Chart, ChartKey, ChartVariant, TrackedVariant};
use crate::repositories::{ChartStore, VariantStore};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// A variant the user picked, as resolved by the front-end
#[derive(Debug, Clone)]
pub struct VariantSelection {
    pub variant_id: String,
    pub variant_name: String,
    pub item_id: String,
    pub item_name: String,
    pub shop_id: String,
    pub channel: Channel,
    pub currency: Option<String>,
    pub price: Decimal,
    pub stock: i32,
}

/// Everything needed to register a new chart
#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub chat_id: String,
    pub chart_id: String,
    pub chart_name: Option<String>,
    pub threshold: i32,
    pub selections: Vec<VariantSelection>,
}

/// Registers charts and the variants they observe
pub struct TrackingService {
    variant_store: Arc<dyn VariantStore>,
    chart_store: Arc<dyn ChartStore>,
    site_url: String,
}

impl TrackingService {
    pub fn new(
        variant_store: Arc<dyn VariantStore>,
        chart_store: Arc<dyn ChartStore>,
        site_url: String,
    ) -> Self {
        Self {
            variant_store,
            chart_store,
            site_url,
        }
    }

    fn validate(request: &TrackRequest) -> AppResult<()> {
        if request.chat_id.trim().is_empty() || request.chart_id.trim().is_empty() {
            return Err(AppError::Validation(
                "chat id and chart id are required".to_string(),
            ));
        }
        if request.selections.is_empty() {
            return Err(AppError::Validation(
                "a chart needs at least one variant".to_string(),
            ));
        }
        if !(-100..=0).contains(&request.threshold) {
            return Err(AppError::Validation(format!(
                "threshold {} must be between -100 and 0",
                request.threshold
            )));
        }

        let mut seen = HashSet::new();
        for selection in &request.selections {
            if !seen.insert(selection.variant_id.as_str()) {
                return Err(AppError::Validation(format!(
                    "variant {} selected twice",
                    selection.variant_id
                )));
            }
            if selection.price < Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "variant {} has a negative price",
                    selection.variant_id
                )));
            }
        }
        Ok(())
    }

    /// Start tracking the selected variants under a new chart.
    pub async fn track(&self, request: TrackRequest, now: NaiveDateTime) -> AppResult<Chart> {
        Self::validate(&request)?;

        let key = ChartKey::new(request.chat_id.clone(), request.chart_id.clone());
        if self.chart_store.find(&key).await?.is_some() {
            return Err(AppError::Validation(format!("chart {} already exists", key)));
        }

        let mut snapshots = Vec::with_capacity(request.selections.len());
        for selection in request.selections {
            let mut variant = match self.variant_store.find_by_id(&selection.variant_id).await? {
                Some(existing) => existing,
                None => {
                    info!(variant_id = %selection.variant_id, "Tracking new variant");
                    TrackedVariant::new(
                        selection.variant_id,
                        selection.variant_name,
                        selection.item_id,
                        selection.item_name,
                        selection.shop_id,
                        selection.channel,
                        selection.currency,
                        selection.price,
                        selection.stock,
                        now,
                    )
                }
            };
            variant.add_observer(&key.chat_id, &key.chart_id);
            let stored = self.variant_store.upsert(&variant).await?;

            let item_url = selection
                .channel
                .item_url(&self.site_url, &stored.shop_id, &stored.item_id);
            snapshots.push(ChartVariant::snapshot(&stored, item_url, now));
        }

        let chart = Chart::new(key, request.chart_name, request.threshold, snapshots, now);
        let chart = self.chart_store.insert(&chart).await?;
        info!(
            chat_id = %chart.chat_id,
            chart_id = %chart.chart_id,
            members = chart.variants.len(),
            threshold = chart.threshold,
            "Chart registered"
        );
        Ok(chart)
    }
}
