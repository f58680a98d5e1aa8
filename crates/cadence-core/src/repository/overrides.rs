use crate::error::CoreError;
use crate::models::{OccurrenceOverride, Window};
use crate::repository::{OverrideStore, SqliteRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Row shape of `occurrence_overrides`; `fields` holds the patch as JSON
#[derive(Debug, Clone, FromRow)]
pub(crate) struct OverrideRow {
    pub series_id: Uuid,
    pub occurrence_at: DateTime<Utc>,
    pub fields: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for OccurrenceOverride {
    type Error = CoreError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(OccurrenceOverride {
            series_id: row.series_id,
            occurrence_at: row.occurrence_at,
            fields: serde_json::from_str(&row.fields)?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl OverrideStore for SqliteRepository {
    async fn fetch_overrides(
        &self,
        series_id: Uuid,
        window: Window,
    ) -> Result<HashMap<DateTime<Utc>, OccurrenceOverride>, CoreError> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"SELECT * FROM occurrence_overrides
            WHERE series_id = $1 AND occurrence_at >= $2 AND occurrence_at < $3"#,
        )
        .bind(series_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let occurrence = OccurrenceOverride::try_from(row)?;
                Ok((occurrence.occurrence_at, occurrence))
            })
            .collect()
    }

    async fn fetch_exceptions(
        &self,
        series_id: Uuid,
        window: Window,
    ) -> Result<HashSet<DateTime<Utc>>, CoreError> {
        let instants: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"SELECT occurrence_at FROM occurrence_exceptions
            WHERE series_id = $1 AND occurrence_at >= $2 AND occurrence_at < $3"#,
        )
        .bind(series_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(self.pool())
        .await?;

        Ok(instants.into_iter().map(|(at,)| at).collect())
    }

    async fn find_override(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<Option<OccurrenceOverride>, CoreError> {
        let row: Option<OverrideRow> = sqlx::query_as(
            "SELECT * FROM occurrence_overrides WHERE series_id = $1 AND occurrence_at = $2",
        )
        .bind(series_id)
        .bind(occurrence_at)
        .fetch_optional(self.pool())
        .await?;
        row.map(OccurrenceOverride::try_from).transpose()
    }

    async fn upsert_override(&self, occurrence: &OccurrenceOverride) -> Result<(), CoreError> {
        let fields = serde_json::to_string(&occurrence.fields)?;
        let mut tx = self.pool().begin().await?;

        Self::delete_exception_in_transaction(&mut tx, occurrence.series_id, occurrence.occurrence_at)
            .await?;

        sqlx::query(
            r#"INSERT INTO occurrence_overrides (series_id, occurrence_at, fields, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(series_id, occurrence_at) DO UPDATE SET fields = excluded.fields"#,
        )
        .bind(occurrence.series_id)
        .bind(occurrence.occurrence_at)
        .bind(fields)
        .bind(occurrence.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_exception(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        Self::delete_override_in_transaction(&mut tx, series_id, occurrence_at).await?;

        sqlx::query(
            r#"INSERT INTO occurrence_exceptions (series_id, occurrence_at, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT(series_id, occurrence_at) DO NOTHING"#,
        )
        .bind(series_id)
        .bind(occurrence_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_override(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let mut tx = self.pool().begin().await?;
        let removed = Self::delete_override_in_transaction(&mut tx, series_id, occurrence_at).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_exception(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let mut tx = self.pool().begin().await?;
        let removed =
            Self::delete_exception_in_transaction(&mut tx, series_id, occurrence_at).await?;
        tx.commit().await?;
        Ok(removed)
    }
}

impl SqliteRepository {
    async fn delete_override_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "DELETE FROM occurrence_overrides WHERE series_id = $1 AND occurrence_at = $2",
        )
        .bind(series_id)
        .bind(occurrence_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_exception_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "DELETE FROM occurrence_exceptions WHERE series_id = $1 AND occurrence_at = $2",
        )
        .bind(series_id)
        .bind(occurrence_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
