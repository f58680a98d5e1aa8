//! The series editor: creates series and applies `single`, `future` and
//! `series` scoped edits and cancellations.
//!
//! Every mutation returns an [`EditOutcome`] naming the cache keys it may have
//! affected, and forwards them to the configured [`InvalidationSink`].

use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    CacheKey, EditScope, NewSeriesData, OccurrenceOverride, RecurrenceRule,
    SeriesEdit, SeriesTemplate, Termination,
};
use crate::recurrence::RecurrenceManager;
use crate::repository::{Repository, SeriesSplit};
use crate::timezone::parse_timezone;

/// Receives the cache keys a mutation may have made stale.
pub trait InvalidationSink: Send + Sync {
    fn invalidate(&self, keys: &[CacheKey]);
}

/// Result of an edit or cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// The series the edit was issued against
    pub series_id: Uuid,
    /// The series created by a split, if any
    pub new_series_id: Option<Uuid>,
    /// Whether the series was deleted
    pub deleted: bool,
    pub invalidated: Vec<CacheKey>,
}

impl EditOutcome {
    fn new(series_id: Uuid, invalidated: Vec<CacheKey>) -> Self {
        Self {
            series_id,
            new_series_id: None,
            deleted: false,
            invalidated,
        }
    }
}

pub struct SeriesEditor<'a, S: ?Sized> {
    store: &'a S,
    sink: Option<&'a dyn InvalidationSink>,
}

impl<'a, S: Repository + ?Sized> SeriesEditor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store, sink: None }
    }

    pub fn with_sink(mut self, sink: &'a dyn InvalidationSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates and stores a new series.
    #[tracing::instrument(skip(self, data), fields(company_id = %data.company_id))]
    pub async fn create_series(&self, data: NewSeriesData) -> Result<SeriesTemplate, CoreError> {
        let timezone = parse_timezone(&data.timezone)?;
        data.rule.validate()?;
        // Occurrences are scheduled at whole seconds
        let anchor_start = data.anchor_start.trunc_subsecs(0);
        let recurrence_start = data
            .recurrence_start
            .map_or(anchor_start, |start| start.trunc_subsecs(0));

        if data.fields.title.trim().is_empty() {
            return Err(CoreError::InvalidInput("title cannot be empty".to_string()));
        }
        if let Some(until) = data.rule.until_instant() {
            if until < anchor_start {
                return Err(CoreError::InvalidRule(format!(
                    "until {} is before the first occurrence {}",
                    until, anchor_start
                )));
            }
        }

        let now = Utc::now();
        let template = SeriesTemplate {
            id: Uuid::now_v7(),
            company_id: data.company_id,
            anchor_start,
            timezone,
            rule: data.rule,
            recurrence_start,
            recurrence_end: data.rule.until_instant(),
            fields: data.fields,
            created_at: now,
            updated_at: now,
        };

        self.store.save_template(&template).await?;
        tracing::info!(series_id = %template.id, "created series");
        Ok(template)
    }

    /// Applies `edit` to the occurrence at `occurrence_at` with the given scope.
    ///
    /// `occurrence_at` is the original scheduled instant. For the `series`
    /// scope it is not required to be an occurrence.
    #[tracing::instrument(skip(self, edit))]
    pub async fn edit(
        &self,
        series_id: Uuid,
        scope: EditScope,
        occurrence_at: DateTime<Utc>,
        edit: SeriesEdit,
    ) -> Result<EditOutcome, CoreError> {
        if edit.fields.is_empty() && edit.rule.is_none() {
            return Err(CoreError::InvalidInput("edit changes nothing".to_string()));
        }
        if let Some(rule) = &edit.rule {
            rule.validate()?;
        }
        let occurrence_at = occurrence_at.trunc_subsecs(0);

        let template = self.store.load_template(series_id).await?;
        let outcome = match scope {
            EditScope::Single => self.edit_single(&template, occurrence_at, edit).await?,
            EditScope::Series => self.edit_series(template, edit).await?,
            EditScope::Future => self.edit_future(template, occurrence_at, edit).await?,
        };

        self.notify(&outcome);
        Ok(outcome)
    }

    /// Cancels with the given scope: one occurrence becomes an exception,
    /// `future` truncates the series before `occurrence_at`, and `series`
    /// deletes it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        series_id: Uuid,
        scope: EditScope,
        occurrence_at: DateTime<Utc>,
    ) -> Result<EditOutcome, CoreError> {
        let occurrence_at = occurrence_at.trunc_subsecs(0);
        let template = self.store.load_template(series_id).await?;

        let outcome = match scope {
            EditScope::Single => {
                self.ensure_occurrence(&template, occurrence_at)?;
                self.store.upsert_exception(series_id, occurrence_at).await?;
                tracing::info!("cancelled occurrence");
                EditOutcome::new(series_id, vec![CacheKey::instant(series_id, occurrence_at)])
            }
            EditScope::Future => {
                let manager = self.ensure_occurrence(&template, occurrence_at)?;
                let before = manager.count_before(occurrence_at);
                if before == 0 {
                    self.delete(series_id).await?
                } else {
                    let expected = template.updated_at;
                    let truncated = truncate(template, occurrence_at, before);
                    self.store
                        .truncate_series(&truncated, expected, occurrence_at)
                        .await?;
                    tracing::info!(kept = before, "truncated series");
                    EditOutcome::new(
                        series_id,
                        vec![CacheKey::starting_at(series_id, occurrence_at)],
                    )
                }
            }
            EditScope::Series => self.delete(series_id).await?,
        };

        self.notify(&outcome);
        Ok(outcome)
    }

    /// Removes any override or exception at `occurrence_at`, returning the
    /// occurrence to the template's fields.
    #[tracing::instrument(skip(self))]
    pub async fn restore_occurrence(
        &self,
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    ) -> Result<EditOutcome, CoreError> {
        let occurrence_at = occurrence_at.trunc_subsecs(0);
        let template = self.store.load_template(series_id).await?;
        self.ensure_occurrence(&template, occurrence_at)?;

        let had_override = self.store.delete_override(series_id, occurrence_at).await?;
        let had_exception = self.store.delete_exception(series_id, occurrence_at).await?;
        tracing::info!(had_override, had_exception, "restored occurrence");

        let outcome =
            EditOutcome::new(series_id, vec![CacheKey::instant(series_id, occurrence_at)]);
        self.notify(&outcome);
        Ok(outcome)
    }

    async fn edit_single(
        &self,
        template: &SeriesTemplate,
        occurrence_at: DateTime<Utc>,
        edit: SeriesEdit,
    ) -> Result<EditOutcome, CoreError> {
        if edit.rule.is_some() {
            return Err(CoreError::InvalidInput(
                "a single occurrence cannot change the recurrence rule".to_string(),
            ));
        }
        self.ensure_occurrence(template, occurrence_at)?;

        // Re-issuing an edit folds into the stored override instead of
        // discarding fields set earlier.
        let existing = self.store.find_override(template.id, occurrence_at).await?;
        let (fields, created_at) = match existing {
            Some(found) => (found.fields.merged_with(&edit.fields), found.created_at),
            None => (edit.fields, Utc::now()),
        };

        self.store
            .upsert_override(&OccurrenceOverride {
                series_id: template.id,
                occurrence_at,
                fields,
                created_at,
            })
            .await?;

        tracing::info!(series_id = %template.id, %occurrence_at, "overrode occurrence");
        Ok(EditOutcome::new(
            template.id,
            vec![CacheKey::instant(template.id, occurrence_at)],
        ))
    }

    async fn edit_series(
        &self,
        mut template: SeriesTemplate,
        edit: SeriesEdit,
    ) -> Result<EditOutcome, CoreError> {
        template.fields = edit.fields.apply(&template.fields);
        if let Some(rule) = edit.rule {
            template.rule = rule;
            // Never reopens a series ended by a split or truncation
            template.recurrence_end = earliest(template.recurrence_end, rule.until_instant());
        }
        template.updated_at = Utc::now();

        self.store.save_template(&template).await?;
        tracing::info!(series_id = %template.id, "edited series");
        Ok(EditOutcome::new(template.id, vec![CacheKey::all(template.id)]))
    }

    /// The series split.
    async fn edit_future(
        &self,
        template: SeriesTemplate,
        boundary: DateTime<Utc>,
        edit: SeriesEdit,
    ) -> Result<EditOutcome, CoreError> {
        let manager = self.ensure_occurrence(&template, boundary)?;
        let before = manager.count_before(boundary);
        if before == 0 {
            // Nothing precedes the boundary, so the whole series is the tail
            return self.edit_series(template, edit).await;
        }

        let series_id = template.id;
        let now = Utc::now();
        let rule = edit
            .rule
            .unwrap_or_else(|| continued_rule(&template.rule, before));
        let recurrence_end = earliest(template.recurrence_end, rule.until_instant());

        let tail = SeriesTemplate {
            id: Uuid::now_v7(),
            company_id: template.company_id,
            anchor_start: boundary,
            timezone: template.timezone,
            rule,
            recurrence_start: boundary,
            recurrence_end,
            fields: edit.fields.apply(&template.fields),
            created_at: now,
            updated_at: now,
        };
        let tail_id = tail.id;
        let expected_updated_at = template.updated_at;

        self.store
            .split_series(SeriesSplit {
                truncated: truncate(template, boundary, before),
                expected_updated_at,
                tail,
                boundary,
            })
            .await?;

        tracing::info!(%series_id, %tail_id, %boundary, kept = before, "split series");
        Ok(EditOutcome {
            series_id,
            new_series_id: Some(tail_id),
            deleted: false,
            invalidated: vec![
                CacheKey::starting_at(series_id, boundary),
                CacheKey::all(tail_id),
            ],
        })
    }

    async fn delete(&self, series_id: Uuid) -> Result<EditOutcome, CoreError> {
        self.store.delete_series(series_id).await?;
        tracing::info!(%series_id, "deleted series");
        Ok(EditOutcome {
            deleted: true,
            ..EditOutcome::new(series_id, vec![CacheKey::all(series_id)])
        })
    }

    /// Rejects instants the template does not produce.
    fn ensure_occurrence(
        &self,
        template: &SeriesTemplate,
        occurrence_at: DateTime<Utc>,
    ) -> Result<RecurrenceManager, CoreError> {
        let manager = RecurrenceManager::for_template(template)?;
        if !manager.produces(occurrence_at) {
            return Err(CoreError::OccurrenceNotFound {
                series_id: template.id,
                occurrence_at,
            });
        }
        Ok(manager)
    }

    fn notify(&self, outcome: &EditOutcome) {
        if let Some(sink) = self.sink {
            sink.invalidate(&outcome.invalidated);
        }
    }
}

/// Ends `template` so its last occurrence is strictly before `boundary`.
/// `before` is the number of occurrences it keeps.
fn truncate(mut template: SeriesTemplate, boundary: DateTime<Utc>, before: u32) -> SeriesTemplate {
    let last_tick = boundary - Duration::seconds(1);
    template.rule.termination = match template.rule.termination {
        Termination::Count(_) => Termination::Count(before),
        Termination::Until(_) | Termination::Unbounded => Termination::Until(last_tick),
    };
    template.recurrence_end = Some(template.recurrence_end.map_or(last_tick, |end| end.min(last_tick)));
    template.updated_at = Utc::now();
    template
}

/// The earlier of two optional bounds; `None` is unbounded.
fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// The original rule shape with the termination left over after `before`
/// occurrences went to the original series.
fn continued_rule(rule: &RecurrenceRule, before: u32) -> RecurrenceRule {
    let mut rule = *rule;
    if let Termination::Count(total) = rule.termination {
        rule.termination = Termination::Count(total.saturating_sub(before).max(1));
    }
    rule
}
