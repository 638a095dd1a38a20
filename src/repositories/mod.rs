pub mod chart_repository;
pub mod variant_repository;

// Re-export all repositories for convenient access
pub use chart_repository::ChartRepository;
pub use variant_repository::VariantRepository;

use crate::error::RepositoryError;
use crate::models::{Chart, ChartEvaluation, ChartKey, TrackedVariant};
use async_trait::async_trait;
use chrono::NaiveDateTime;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Persistent store for canonical variant records
#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn list_all(&self) -> RepoResult<Vec<TrackedVariant>>;

    async fn find_by_id(&self, variant_id: &str) -> RepoResult<Option<TrackedVariant>>;

    /// Insert or fully replace a variant, keyed by `variant_id`
    async fn upsert(&self, variant: &TrackedVariant) -> RepoResult<TrackedVariant>;
}

/// Persistent store for charts and their member snapshots
#[async_trait]
pub trait ChartStore: Send + Sync {
    async fn list_all(&self) -> RepoResult<Vec<Chart>>;

    async fn find(&self, key: &ChartKey) -> RepoResult<Option<Chart>>;

    async fn find_by_variant(&self, variant_id: &str) -> RepoResult<Vec<Chart>>;

    /// Insert a new chart. Fails with `Duplicate` if the key is taken.
    async fn insert(&self, chart: &Chart) -> RepoResult<Chart>;

    /// Atomically mirror `variant` into every chart that references it.
    /// Returns the keys of the charts that were touched.
    async fn mirror_variant(&self, variant: &TrackedVariant) -> RepoResult<Vec<ChartKey>>;

    /// Atomically store an evaluation on a chart and return the updated chart.
    async fn save_evaluation(
        &self,
        key: &ChartKey,
        evaluation: &ChartEvaluation,
        now: NaiveDateTime,
    ) -> RepoResult<Chart>;

    /// Compare-and-set increment of the notification counter.
    /// Returns the new count, or `None` if the counter no longer equals `expected`.
    async fn increment_notification_count(
        &self,
        key: &ChartKey,
        expected: i32,
        now: NaiveDateTime,
    ) -> RepoResult<Option<i32>>;
}
