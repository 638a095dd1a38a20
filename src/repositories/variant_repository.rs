use super::{RepoResult, VariantStore};
use crate::models::TrackedVariant;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

const VARIANT_COLUMNS: &str = r#"
    variant_id,
    variant_name,
    item_id,
    item_name,
    shop_id,
    channel,
    currency,
    created_time,
    created_price,
    current_price,
    lowest_price,
    stock,
    price_history,
    series,
    chat_ids,
    chart_ids,
    last_updated_time
"#;

/// Repository for variant data access
pub struct VariantRepository {
    pool: PgPool,
}

impl VariantRepository {
    /// Create a new VariantRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VariantStore for VariantRepository {
    async fn list_all(&self) -> RepoResult<Vec<TrackedVariant>> {
        let sql = format!(
            "SELECT {} FROM variants ORDER BY created_time ASC, variant_id ASC",
            VARIANT_COLUMNS
        );
        let variants = sqlx::query_as::<_, TrackedVariant>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(variants)
    }

    async fn find_by_id(&self, variant_id: &str) -> RepoResult<Option<TrackedVariant>> {
        let sql = format!("SELECT {} FROM variants WHERE variant_id = $1", VARIANT_COLUMNS);
        let variant = sqlx::query_as::<_, TrackedVariant>(&sql)
            .bind(variant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(variant)
    }

    async fn upsert(&self, variant: &TrackedVariant) -> RepoResult<TrackedVariant> {
        let sql = format!(
            r#"
            INSERT INTO variants ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (variant_id) DO UPDATE SET
                variant_name = EXCLUDED.variant_name,
                item_name = EXCLUDED.item_name,
                currency = EXCLUDED.currency,
                current_price = EXCLUDED.current_price,
                lowest_price = EXCLUDED.lowest_price,
                stock = EXCLUDED.stock,
                price_history = EXCLUDED.price_history,
                series = EXCLUDED.series,
                chat_ids = EXCLUDED.chat_ids,
                chart_ids = EXCLUDED.chart_ids,
                last_updated_time = EXCLUDED.last_updated_time
            RETURNING {columns}
            "#,
            columns = VARIANT_COLUMNS
        );

        let stored = sqlx::query_as::<_, TrackedVariant>(&sql)
            .bind(&variant.variant_id)
            .bind(&variant.variant_name)
            .bind(&variant.item_id)
            .bind(&variant.item_name)
            .bind(&variant.shop_id)
            .bind(&variant.channel)
            .bind(&variant.currency)
            .bind(variant.created_time)
            .bind(variant.created_price)
            .bind(variant.current_price)
            .bind(variant.lowest_price)
            .bind(variant.stock)
            .bind(Json(&variant.price_history))
            .bind(Json(&variant.series))
            .bind(&variant.chat_ids)
            .bind(&variant.chart_ids)
            .bind(variant.last_updated_time)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }
}
