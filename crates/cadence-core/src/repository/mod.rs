use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{OccurrenceOverride, SeriesTemplate, Window};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

// Storage implementations, one module per table family
pub mod overrides;
pub mod series;

/// The atomic "this and future" write: truncate the original, insert the tail
/// series, and move every override and exception at or after `boundary` to it.
#[derive(Debug, Clone)]
pub struct SeriesSplit {
    /// The original template with its termination already truncated
    pub truncated: SeriesTemplate,
    /// `updated_at` of the original as it was read; the split aborts if the
    /// stored row no longer matches
    pub expected_updated_at: DateTime<Utc>,
    /// The new series starting at `boundary`
    pub tail: SeriesTemplate,
    pub boundary: DateTime<Utc>,
}

/// Read/write access to series templates
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Loads a template, failing with `SeriesNotFound` if it does not exist.
    async fn load_template(&self, series_id: Uuid) -> Result<SeriesTemplate, CoreError>;
    async fn find_template(&self, series_id: Uuid) -> Result<Option<SeriesTemplate>, CoreError>;
    async fn list_templates(&self, company_id: Uuid) -> Result<Vec<SeriesTemplate>, CoreError>;
    /// Ids of a tenant's series, without decoding their rules
    async fn list_series_ids(&self, company_id: Uuid) -> Result<Vec<Uuid>, CoreError>;
    /// Inserts the template or replaces the stored row with the same id.
    async fn save_template(&self, template: &SeriesTemplate) -> Result<(), CoreError>;
    /// Deletes the template; its overrides and exceptions go with it.
    async fn delete_series(&self, series_id: Uuid) -> Result<(), CoreError>;
    /// Applies a [`SeriesSplit`] as one transaction. Any failure is reported
    /// as `SplitIncomplete` and leaves storage unchanged.
    async fn split_series(&self, split: SeriesSplit) -> Result<(), CoreError>;
    /// Stores the truncated template and drops overrides and exceptions at or
    /// after `from`, as one transaction.
    async fn truncate_series(
        &self,
        truncated: &SeriesTemplate,
        expected_updated_at: DateTime<Utc>,
        from: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// Read/write access to the sparse per-occurrence side tables
#[async_trait]
pub trait OverrideStore: Send + Sync {
    /// Overrides whose key instant lies in `window`
    async fn fetch_overrides(
        &self,
        series_id: Uuid,
        window: Window,
    ) -> Result<HashMap<DateTime<Utc>, OccurrenceOverride>, CoreError>;
    /// Exception instants in `window`
    async fn fetch_exceptions(
        &self,
        series_id: Uuid,
        window: Window,
    ) -> Result<HashSet<DateTime<Utc>>, CoreError>;
    async fn find_override(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<Option<OccurrenceOverride>, CoreError>;
    /// Inserts or replaces the override at its key and removes any exception
    /// at the same key.
    async fn upsert_override(&self, occurrence: &OccurrenceOverride) -> Result<(), CoreError>;
    /// Marks an instant as cancelled and removes any override at the same key.
    async fn upsert_exception(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
    /// Returns whether a row was removed.
    async fn delete_override(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
    /// Returns whether a row was removed.
    async fn delete_exception(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
}

/// Everything the editor and the agenda view need from storage
pub trait Repository: TemplateStore + OverrideStore {}

impl<T: TemplateStore + OverrideStore> Repository for T {}

/// SQLite implementation of the storage traits
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}
