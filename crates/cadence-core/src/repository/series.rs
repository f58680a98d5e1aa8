use crate::codec;
use crate::error::CoreError;
use crate::models::{Priority, SeriesTemplate, Status, TemplatePayload};
use crate::repository::{SeriesSplit, SqliteRepository, TemplateStore};
use crate::timezone::parse_timezone;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use uuid::Uuid;

/// Row shape of `series_templates`
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SeriesTemplateRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub anchor_start: DateTime<Utc>,
    pub timezone: String,
    pub rrule: String,
    pub recurrence_start: DateTime<Utc>,
    pub recurrence_end: Option<DateTime<Utc>>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub location: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SeriesTemplateRow> for SeriesTemplate {
    type Error = CoreError;

    fn try_from(row: SeriesTemplateRow) -> Result<Self, Self::Error> {
        let timezone = parse_timezone(&row.timezone)?;
        let rule = codec::decode(&row.rrule, timezone)?.ok_or_else(|| {
            CoreError::InvalidRule(format!("series {} has no recurrence rule", row.id))
        })?;

        Ok(SeriesTemplate {
            id: row.id,
            company_id: row.company_id,
            anchor_start: row.anchor_start,
            timezone,
            rule,
            recurrence_start: row.recurrence_start,
            recurrence_end: row.recurrence_end,
            fields: TemplatePayload {
                title: row.title,
                description: row.description,
                priority: row.priority,
                status: row.status,
                location: row.location,
                color: row.color,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl TemplateStore for SqliteRepository {
    async fn load_template(&self, series_id: Uuid) -> Result<SeriesTemplate, CoreError> {
        self.find_template(series_id)
            .await?
            .ok_or(CoreError::SeriesNotFound(series_id))
    }

    async fn find_template(&self, series_id: Uuid) -> Result<Option<SeriesTemplate>, CoreError> {
        let row: Option<SeriesTemplateRow> =
            sqlx::query_as("SELECT * FROM series_templates WHERE id = $1")
                .bind(series_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(SeriesTemplate::try_from).transpose()
    }

    async fn list_templates(&self, company_id: Uuid) -> Result<Vec<SeriesTemplate>, CoreError> {
        let rows: Vec<SeriesTemplateRow> = sqlx::query_as(
            "SELECT * FROM series_templates WHERE company_id = $1 ORDER BY anchor_start, id",
        )
        .bind(company_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(SeriesTemplate::try_from).collect()
    }

    async fn list_series_ids(&self, company_id: Uuid) -> Result<Vec<Uuid>, CoreError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM series_templates WHERE company_id = $1 ORDER BY anchor_start, id",
        )
        .bind(company_id)
        .fetch_all(self.pool())
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn save_template(&self, template: &SeriesTemplate) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        Self::upsert_template_in_transaction(&mut tx, template).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_series(&self, series_id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM series_templates WHERE id = $1")
            .bind(series_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::SeriesNotFound(series_id));
        }
        Ok(())
    }

    async fn split_series(&self, split: SeriesSplit) -> Result<(), CoreError> {
        let series_id = split.truncated.id;
        self.split_series_in_transaction(split)
            .await
            .map_err(|e| match e {
                CoreError::SplitIncomplete { .. } => e,
                other => CoreError::SplitIncomplete {
                    series_id,
                    reason: other.to_string(),
                },
            })
    }

    async fn truncate_series(
        &self,
        truncated: &SeriesTemplate,
        expected_updated_at: DateTime<Utc>,
        from: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        Self::update_template_checked(&mut tx, truncated, expected_updated_at).await?;

        sqlx::query("DELETE FROM occurrence_overrides WHERE series_id = $1 AND occurrence_at >= $2")
            .bind(truncated.id)
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM occurrence_exceptions WHERE series_id = $1 AND occurrence_at >= $2")
            .bind(truncated.id)
            .bind(from)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl SqliteRepository {
    async fn split_series_in_transaction(&self, split: SeriesSplit) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        Self::update_template_checked(&mut tx, &split.truncated, split.expected_updated_at).await?;
        Self::upsert_template_in_transaction(&mut tx, &split.tail).await?;

        let overrides = sqlx::query(
            "UPDATE occurrence_overrides SET series_id = $1 WHERE series_id = $2 AND occurrence_at >= $3",
        )
        .bind(split.tail.id)
        .bind(split.truncated.id)
        .bind(split.boundary)
        .execute(&mut *tx)
        .await?;

        let exceptions = sqlx::query(
            "UPDATE occurrence_exceptions SET series_id = $1 WHERE series_id = $2 AND occurrence_at >= $3",
        )
        .bind(split.tail.id)
        .bind(split.truncated.id)
        .bind(split.boundary)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            series_id = %split.truncated.id,
            tail_id = %split.tail.id,
            overrides = overrides.rows_affected(),
            exceptions = exceptions.rows_affected(),
            "re-parented occurrences"
        );
        Ok(())
    }

    /// Overwrites a template row only if it still carries `expected_updated_at`.
    async fn update_template_checked(
        tx: &mut Transaction<'_, Sqlite>,
        template: &SeriesTemplate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"UPDATE series_templates
            SET rrule = $1, recurrence_end = $2, updated_at = $3
            WHERE id = $4 AND updated_at = $5"#,
        )
        .bind(codec::encode(&template.rule))
        .bind(template.recurrence_end)
        .bind(template.updated_at)
        .bind(template.id)
        .bind(expected_updated_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::SplitIncomplete {
                series_id: template.id,
                reason: "series was modified or deleted concurrently".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) async fn upsert_template_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template: &SeriesTemplate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO series_templates (id, company_id, anchor_start, timezone, rrule, recurrence_start, recurrence_end,
                title, description, priority, status, location, color, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                anchor_start = excluded.anchor_start,
                timezone = excluded.timezone,
                rrule = excluded.rrule,
                recurrence_start = excluded.recurrence_start,
                recurrence_end = excluded.recurrence_end,
                title = excluded.title,
                description = excluded.description,
                priority = excluded.priority,
                status = excluded.status,
                location = excluded.location,
                color = excluded.color,
                updated_at = excluded.updated_at"#,
        )
        .bind(template.id)
        .bind(template.company_id)
        .bind(template.anchor_start)
        .bind(template.timezone.name())
        .bind(codec::encode(&template.rule))
        .bind(template.recurrence_start)
        .bind(template.recurrence_end)
        .bind(&template.fields.title)
        .bind(&template.fields.description)
        .bind(template.fields.priority)
        .bind(template.fields.status)
        .bind(&template.fields.location)
        .bind(&template.fields.color)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
