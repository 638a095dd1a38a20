use super::{FetchError, PriceFetcher, PriceQuote};
use crate::config::ShopeeConfig;
use crate::models::variant::round_price;
use crate::models::TrackedVariant;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Raw prices are integers scaled by this factor
const PRICE_DENOMINATION: i64 = 100_000;

#[derive(Debug, Deserialize)]
struct ItemResponse {
    item: Option<ItemPayload>,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    itemid: i64,
    price_min: i64,
    stock: i32,
    #[serde(default)]
    models: Vec<ModelPayload>,
}

#[derive(Debug, Deserialize)]
struct ModelPayload {
    modelid: i64,
    price: i64,
    stock: i32,
}

/// Shopee item API client
pub struct ShopeeClient {
    client: Client,
    api_url: String,
}

impl ShopeeClient {
    pub fn new(config: &ShopeeConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("Mozilla/5")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn to_price(raw: i64) -> Decimal {
        round_price(Decimal::from(raw) / Decimal::from(PRICE_DENOMINATION))
    }

    /// Pick the variant's price out of an item payload.
    /// A variant whose id is the item id is the item itself; otherwise look it up in `models`.
    fn quote_from(payload: ItemResponse, variant_id: &str) -> Result<PriceQuote, FetchError> {
        let item = payload
            .item
            .ok_or_else(|| FetchError::NotFound(variant_id.to_string()))?;

        let wanted: i64 = variant_id
            .parse()
            .map_err(|_| FetchError::Decode(format!("non-numeric variant id {}", variant_id)))?;

        if item.itemid == wanted {
            return Ok(PriceQuote {
                price: Self::to_price(item.price_min),
                stock: item.stock,
            });
        }

        item.models
            .iter()
            .find(|m| m.modelid == wanted)
            .map(|m| PriceQuote {
                price: Self::to_price(m.price),
                stock: m.stock,
            })
            .ok_or_else(|| FetchError::NotFound(variant_id.to_string()))
    }
}

#[async_trait]
impl PriceFetcher for ShopeeClient {
    async fn fetch(&self, variant: &TrackedVariant) -> Result<PriceQuote, FetchError> {
        let url = format!("{}/api/v2/item/get", self.api_url);
        debug!(variant_id = %variant.variant_id, %url, "Fetching Shopee item");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("itemid", variant.item_id.as_str()),
                ("shopid", variant.shop_id.as_str()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(variant.variant_id.clone()));
        }

        let payload = response
            .error_for_status()?
            .json::<ItemResponse>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Self::quote_from(payload, &variant.variant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn variant(variant_id: &str) -> TrackedVariant {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        TrackedVariant::new(
            variant_id.to_string(),
            "Red".to_string(),
            "1001".to_string(),
            "Desk Lamp".to_string(),
            "77".to_string(),
            Channel::Shopee,
            Some("SGD".to_string()),
            dec!(20.00),
            3,
            now,
        )
    }

    fn client_for(server: &MockServer) -> ShopeeClient {
        let config = ShopeeConfig {
            api_url: server.uri(),
            site_url: "https://shopee.sg".to_string(),
        };
        ShopeeClient::new(&config, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_price_denomination() {
        assert_eq!(ShopeeClient::to_price(1_999_000), dec!(19.99));
        assert_eq!(ShopeeClient::to_price(0), dec!(0));
    }

    #[test]
    fn test_missing_item_is_not_found() {
        let payload: ItemResponse = serde_json::from_str(r#"{"item": null}"#).unwrap();
        let result = ShopeeClient::quote_from(payload, "1001");
        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_item_level_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/item/get"))
            .and(query_param("itemid", "1001"))
            .and(query_param("shopid", "77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "item": {"itemid": 1001, "price_min": 1_550_000, "stock": 12, "models": []}
            })))
            .mount(&server)
            .await;

        let quote = client_for(&server).fetch(&variant("1001")).await.unwrap();
        assert_eq!(quote, PriceQuote { price: dec!(15.50), stock: 12 });
    }

    #[tokio::test]
    async fn test_fetch_model_level_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/item/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "item": {
                    "itemid": 1001,
                    "price_min": 900_000,
                    "stock": 40,
                    "models": [
                        {"modelid": 5, "price": 900_000, "stock": 30},
                        {"modelid": 6, "price": 1_234_500, "stock": 10}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let quote = client_for(&server).fetch(&variant("6")).await.unwrap();
        assert_eq!(quote.price, dec!(12.35));
        assert_eq!(quote.stock, 10);

        let missing = client_for(&server).fetch(&variant("7")).await;
        assert!(matches!(missing, Err(FetchError::NotFound(_))));
    }
}
