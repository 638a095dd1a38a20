use crate::error::AppResult;
use crate::models::{ChartKey, TrackedVariant};
use crate::repositories::ChartStore;
use std::sync::Arc;
use tracing::debug;

/// Broadcasts a reconciled variant into every chart snapshot that mirrors it
pub struct ChartPropagator {
    chart_store: Arc<dyn ChartStore>,
}

impl ChartPropagator {
    pub fn new(chart_store: Arc<dyn ChartStore>) -> Self {
        Self { chart_store }
    }

    /// Must run after `variant` has been stored. Safe to replay.
    pub async fn propagate(&self, variant: &TrackedVariant) -> AppResult<Vec<ChartKey>> {
        let touched = self.chart_store.mirror_variant(variant).await?;
        debug!(
            variant_id = %variant.variant_id,
            charts = touched.len(),
            "Propagated variant into charts"
        );
        Ok(touched)
    }
}
