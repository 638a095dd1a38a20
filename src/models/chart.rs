use super::variant::{PriceEvent, PriceSeries, TrackedVariant};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Composite key of a chart: the owning chat and the message the chart was rendered into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartKey {
    pub chat_id: String,
    pub chart_id: String,
}

impl ChartKey {
    pub fn new(chat_id: impl Into<String>, chart_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            chart_id: chart_id.into(),
        }
    }
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.chart_id)
    }
}

/// Chart-local snapshot of a tracked variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartVariant {
    pub variant_id: String,
    pub variant_name: String,
    pub item_id: String,
    pub item_name: String,
    pub shop_id: String,
    pub channel: String,
    pub item_url: String,
    pub created_time: NaiveDateTime,
    pub created_price: Decimal,
    pub current_price: Decimal,
    pub lowest_price: Decimal,
    pub stock: i32,
    pub price_history: Vec<PriceEvent>,
    pub series: PriceSeries,
    pub last_updated_time: NaiveDateTime,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub threshold_hit: bool,
}

impl ChartVariant {
    /// Snapshot a variant as it stands right now; its current price becomes the baseline.
    pub fn snapshot(variant: &TrackedVariant, item_url: String, now: NaiveDateTime) -> Self {
        Self {
            variant_id: variant.variant_id.clone(),
            variant_name: variant.variant_name.clone(),
            item_id: variant.item_id.clone(),
            item_name: variant.item_name.clone(),
            shop_id: variant.shop_id.clone(),
            channel: variant.channel.clone(),
            item_url,
            created_time: now,
            created_price: variant.current_price,
            current_price: variant.current_price,
            lowest_price: variant.lowest_price,
            stock: variant.stock,
            price_history: variant.price_history.clone(),
            series: variant.series.clone(),
            last_updated_time: variant.last_updated_time,
            price_change: Decimal::ZERO,
            price_change_percent: Decimal::ZERO,
            threshold_hit: false,
        }
    }

    /// Overwrite every mirrored field from the canonical record.
    /// Baseline price and baseline time are left alone.
    pub fn mirror(&mut self, variant: &TrackedVariant) {
        self.current_price = variant.current_price;
        self.lowest_price = variant.lowest_price;
        self.stock = variant.stock;
        self.price_history = variant.price_history.clone();
        self.series = variant.series.clone();
        self.last_updated_time = variant.last_updated_time;
    }
}

/// A named, threshold-bearing collection of variant snapshots owned by one chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Chart {
    pub chat_id: String,
    pub chart_id: String,
    pub chart_name: Option<String>,
    pub threshold: i32,
    #[sqlx(json)]
    pub variants: Vec<ChartVariant>,
    #[sqlx(json)]
    pub threshold_hit_list: Vec<bool>,
    #[sqlx(json)]
    pub price_change_percent_list: Vec<Decimal>,
    pub threshold_hit: bool,
    pub notification_count: i32,
    pub last_notified_time: Option<NaiveDateTime>,
    pub created_time: NaiveDateTime,
    pub last_updated_time: NaiveDateTime,
}

impl Chart {
    pub fn new(
        key: ChartKey,
        chart_name: Option<String>,
        threshold: i32,
        variants: Vec<ChartVariant>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            chat_id: key.chat_id,
            chart_id: key.chart_id,
            chart_name,
            threshold,
            variants,
            threshold_hit_list: Vec::new(),
            price_change_percent_list: Vec::new(),
            threshold_hit: false,
            notification_count: 0,
            last_notified_time: None,
            created_time: now,
            last_updated_time: now,
        }
    }

    pub fn key(&self) -> ChartKey {
        ChartKey::new(self.chat_id.clone(), self.chart_id.clone())
    }

    /// Name shown to the user, falling back to a generic title
    pub fn display_name(&self) -> &str {
        self.chart_name.as_deref().unwrap_or("Price Change")
    }

    pub fn variant_ids(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.variant_id.clone()).collect()
    }

    pub fn references(&self, variant_id: &str) -> bool {
        self.variants.iter().any(|v| v.variant_id == variant_id)
    }

    /// Copy the canonical record into every member that mirrors it.
    /// Returns how many members were touched.
    pub fn mirror_variant(&mut self, variant: &TrackedVariant) -> usize {
        let mut touched = 0;
        for member in self
            .variants
            .iter_mut()
            .filter(|m| m.variant_id == variant.variant_id)
        {
            member.mirror(variant);
            touched += 1;
        }
        touched
    }

    /// Persist an evaluation into the member snapshots and aggregate fields.
    pub fn apply_evaluation(
        &mut self,
        evaluation: &ChartEvaluation,
        now: NaiveDateTime,
    ) -> Result<(), String> {
        if evaluation.members.len() != self.variants.len() {
            return Err(format!(
                "evaluation has {} members, chart {} has {}",
                evaluation.members.len(),
                self.key(),
                self.variants.len()
            ));
        }

        for (member, result) in self.variants.iter_mut().zip(&evaluation.members) {
            if member.variant_id != result.variant_id {
                return Err(format!(
                    "evaluation member {} does not line up with chart member {}",
                    result.variant_id, member.variant_id
                ));
            }
            member.price_change = result.price_change;
            member.price_change_percent = result.price_change_percent;
            member.threshold_hit = result.threshold_hit;
        }

        self.threshold_hit_list = evaluation.threshold_hit_list();
        self.price_change_percent_list = evaluation.price_change_percent_list();
        self.threshold_hit = evaluation.threshold_hit;
        self.last_updated_time = now;
        Ok(())
    }
}

/// Threshold result for one chart member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEvaluation {
    pub variant_id: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub threshold_hit: bool,
}

/// Threshold result for a whole chart, positionally aligned with its members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartEvaluation {
    pub members: Vec<MemberEvaluation>,
    pub threshold_hit: bool,
}

impl ChartEvaluation {
    pub fn threshold_hit_list(&self) -> Vec<bool> {
        self.members.iter().map(|m| m.threshold_hit).collect()
    }

    pub fn price_change_percent_list(&self) -> Vec<Decimal> {
        self.members.iter().map(|m| m.price_change_percent).collect()
    }

    pub fn breaching_members(&self) -> usize {
        self.members.iter().filter(|m| m.threshold_hit).count()
    }
}
