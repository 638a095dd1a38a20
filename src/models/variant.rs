use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Round a price to cents, halves away from zero.
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Marketplace a variant is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Shopee,
}

impl Channel {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "shopee" => Ok(Channel::Shopee),
            _ => Err(format!("Unsupported channel: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Shopee => "shopee",
        }
    }

    /// Public product page for an item on this channel
    pub fn item_url(&self, site_url: &str, shop_id: &str, item_id: &str) -> String {
        match self {
            Channel::Shopee => format!(
                "{}/product/{}/{}",
                site_url.trim_end_matches('/'),
                shop_id,
                item_id
            ),
        }
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.as_str().to_string()
    }
}

/// One observed price change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub date: NaiveDateTime,
    pub price: Decimal,
}

impl PriceEvent {
    pub fn new(date: NaiveDateTime, price: Decimal) -> Self {
        Self { date, price }
    }

    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }
}

/// Dense, gap-free daily price series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<Decimal>,
}

impl PriceSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.prices.last().copied()
    }

    pub fn lowest_price(&self) -> Option<Decimal> {
        self.prices.iter().min().copied()
    }

    /// Dates are consecutive calendar days and line up with prices.
    pub fn is_dense(&self) -> bool {
        self.dates.len() == self.prices.len()
            && self
                .dates
                .windows(2)
                .all(|w| w[0].succ_opt() == Some(w[1]))
    }
}

/// Canonical record of one marketplace product variant under observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrackedVariant {
    pub variant_id: String,
    pub variant_name: String,
    pub item_id: String,
    pub item_name: String,
    pub shop_id: String,
    pub channel: String, // Stored as TEXT, use Channel enum for type safety
    pub currency: Option<String>,
    pub created_time: NaiveDateTime,
    pub created_price: Decimal,
    pub current_price: Decimal,
    pub lowest_price: Decimal,
    pub stock: i32,
    #[sqlx(json)]
    pub price_history: Vec<PriceEvent>,
    #[sqlx(json)]
    pub series: PriceSeries,
    pub chat_ids: Vec<String>,
    pub chart_ids: Vec<String>,
    pub last_updated_time: NaiveDateTime,
}

impl TrackedVariant {
    /// Start tracking a variant first seen at `price` on `now`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        variant_id: String,
        variant_name: String,
        item_id: String,
        item_name: String,
        shop_id: String,
        channel: Channel,
        currency: Option<String>,
        price: Decimal,
        stock: i32,
        now: NaiveDateTime,
    ) -> Self {
        let price = round_price(price);
        Self {
            variant_id,
            variant_name,
            item_id,
            item_name,
            shop_id,
            channel: channel.as_str().to_string(),
            currency,
            created_time: now,
            created_price: price,
            current_price: price,
            lowest_price: price,
            stock,
            price_history: vec![PriceEvent::new(now, price)],
            series: PriceSeries {
                dates: vec![now.date()],
                prices: vec![price],
            },
            chat_ids: Vec::new(),
            chart_ids: Vec::new(),
            last_updated_time: now,
        }
    }

    /// Get channel as an enum
    pub fn channel_enum(&self) -> Result<Channel, String> {
        Channel::from_str(&self.channel)
    }

    pub fn add_observer(&mut self, chat_id: &str, chart_id: &str) {
        if !self.chat_ids.iter().any(|c| c == chat_id) {
            self.chat_ids.push(chat_id.to_string());
        }
        if !self.chart_ids.iter().any(|c| c == chart_id) {
            self.chart_ids.push(chart_id.to_string());
        }
    }
}
