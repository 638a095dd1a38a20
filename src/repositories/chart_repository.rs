use super::{ChartStore, RepoResult};
use crate::error::RepositoryError;
use crate::models::{Chart, ChartEvaluation, ChartKey, TrackedVariant};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

const CHART_COLUMNS: &str = r#"
    chat_id,
    chart_id,
    chart_name,
    threshold,
    variants,
    threshold_hit_list,
    price_change_percent_list,
    threshold_hit,
    notification_count,
    last_notified_time,
    created_time,
    last_updated_time
"#;

/// Repository for chart data access
pub struct ChartRepository {
    pool: PgPool,
}

impl ChartRepository {
    /// Create a new ChartRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rewrite the mutable document fields of a locked chart row
    async fn write_locked(
        tx: &mut Transaction<'_, Postgres>,
        chart: &Chart,
    ) -> RepoResult<Chart> {
        let sql = format!(
            r#"
            UPDATE charts
            SET variants = $3,
                threshold_hit_list = $4,
                price_change_percent_list = $5,
                threshold_hit = $6,
                last_updated_time = $7
            WHERE chat_id = $1 AND chart_id = $2
            RETURNING {}
            "#,
            CHART_COLUMNS
        );

        let stored = sqlx::query_as::<_, Chart>(&sql)
            .bind(&chart.chat_id)
            .bind(&chart.chart_id)
            .bind(Json(&chart.variants))
            .bind(Json(&chart.threshold_hit_list))
            .bind(Json(&chart.price_change_percent_list))
            .bind(chart.threshold_hit)
            .bind(chart.last_updated_time)
            .fetch_one(&mut **tx)
            .await?;
        Ok(stored)
    }
}

#[async_trait]
impl ChartStore for ChartRepository {
    async fn list_all(&self) -> RepoResult<Vec<Chart>> {
        let sql = format!(
            "SELECT {} FROM charts ORDER BY chat_id ASC, created_time ASC",
            CHART_COLUMNS
        );
        let charts = sqlx::query_as::<_, Chart>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(charts)
    }

    async fn find(&self, key: &ChartKey) -> RepoResult<Option<Chart>> {
        let sql = format!(
            "SELECT {} FROM charts WHERE chat_id = $1 AND chart_id = $2",
            CHART_COLUMNS
        );
        let chart = sqlx::query_as::<_, Chart>(&sql)
            .bind(&key.chat_id)
            .bind(&key.chart_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chart)
    }

    async fn find_by_variant(&self, variant_id: &str) -> RepoResult<Vec<Chart>> {
        let sql = format!(
            "SELECT {} FROM charts WHERE $1 = ANY(variant_ids) ORDER BY chat_id, chart_id",
            CHART_COLUMNS
        );
        let charts = sqlx::query_as::<_, Chart>(&sql)
            .bind(variant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(charts)
    }

    async fn insert(&self, chart: &Chart) -> RepoResult<Chart> {
        let sql = format!(
            r#"
            INSERT INTO charts (
                chat_id, chart_id, chart_name, threshold, variant_ids, variants,
                threshold_hit_list, price_change_percent_list, threshold_hit,
                notification_count, last_notified_time, created_time, last_updated_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            CHART_COLUMNS
        );

        let stored = sqlx::query_as::<_, Chart>(&sql)
            .bind(&chart.chat_id)
            .bind(&chart.chart_id)
            .bind(&chart.chart_name)
            .bind(chart.threshold)
            .bind(chart.variant_ids())
            .bind(Json(&chart.variants))
            .bind(Json(&chart.threshold_hit_list))
            .bind(Json(&chart.price_change_percent_list))
            .bind(chart.threshold_hit)
            .bind(chart.notification_count)
            .bind(chart.last_notified_time)
            .bind(chart.created_time)
            .bind(chart.last_updated_time)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn mirror_variant(&self, variant: &TrackedVariant) -> RepoResult<Vec<ChartKey>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            SELECT {} FROM charts
            WHERE $1 = ANY(variant_ids)
            ORDER BY chat_id, chart_id
            FOR UPDATE
            "#,
            CHART_COLUMNS
        );
        let charts = sqlx::query_as::<_, Chart>(&sql)
            .bind(&variant.variant_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut touched = Vec::with_capacity(charts.len());
        for mut chart in charts {
            if chart.mirror_variant(variant) == 0 {
                debug!(
                    chart = %chart.key(),
                    variant_id = %variant.variant_id,
                    "Chart index lists variant but no member matches"
                );
                continue;
            }
            Self::write_locked(&mut tx, &chart).await?;
            touched.push(chart.key());
        }

        tx.commit().await?;
        Ok(touched)
    }

    async fn save_evaluation(
        &self,
        key: &ChartKey,
        evaluation: &ChartEvaluation,
        now: NaiveDateTime,
    ) -> RepoResult<Chart> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM charts WHERE chat_id = $1 AND chart_id = $2 FOR UPDATE",
            CHART_COLUMNS
        );
        let mut chart = sqlx::query_as::<_, Chart>(&sql)
            .bind(&key.chat_id)
            .bind(&key.chart_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("chart {}", key)))?;

        chart
            .apply_evaluation(evaluation, now)
            .map_err(RepositoryError::InvalidInput)?;
        let stored = Self::write_locked(&mut tx, &chart).await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn increment_notification_count(
        &self,
        key: &ChartKey,
        expected: i32,
        now: NaiveDateTime,
    ) -> RepoResult<Option<i32>> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE charts
            SET notification_count = notification_count + 1,
                last_notified_time = $4
            WHERE chat_id = $1 AND chart_id = $2 AND notification_count = $3
            RETURNING notification_count
            "#,
        )
        .bind(&key.chat_id)
        .bind(&key.chart_id)
        .bind(expected)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }
}
