//! Occurrence materialization: merges the expanded schedule of a series with
//! its stored overrides and exceptions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::models::{Occurrence, OccurrenceKind, SeriesTemplate, Window};
use crate::recurrence::RecurrenceManager;
use crate::repository::{OverrideStore, Repository};

/// A series that could not be materialized for an agenda.
#[derive(Debug)]
pub struct SeriesFailure {
    pub series_id: Uuid,
    pub error: CoreError,
}

/// Occurrences of every series of a tenant in one window.
#[derive(Debug, Default)]
pub struct AgendaResult {
    /// Chronological; ties keep series order
    pub occurrences: Vec<Occurrence>,
    /// Series left out because expansion or storage failed
    pub failures: Vec<SeriesFailure>,
}

impl AgendaResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Materializer<'a, S: ?Sized> {
    store: &'a S,
    config: EngineConfig,
}

impl<'a, S: OverrideStore + ?Sized> Materializer<'a, S> {
    pub fn new(store: &'a S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Returns the user-visible occurrences of `template` in `window`.
    ///
    /// Fails closed: if overrides or exceptions cannot be read, the error is
    /// returned and no occurrences are produced for the series.
    #[tracing::instrument(skip(self, template), fields(series_id = %template.id))]
    pub async fn materialize(
        &self,
        template: &SeriesTemplate,
        window: Window,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let manager = RecurrenceManager::for_template(template)?;
        let cap = self.config.max_occurrences_per_window;

        let mut instants: Vec<DateTime<Utc>> = manager.occurrences(window).take(cap + 1).collect();
        if instants.len() > cap {
            tracing::warn!(cap, "occurrence cap reached, truncating window");
            instants.truncate(cap);
        }
        if instants.is_empty() {
            return Ok(Vec::new());
        }

        let (overrides, exceptions) = match tokio::try_join!(
            self.store.fetch_overrides(template.id, window),
            self.store.fetch_exceptions(template.id, window),
        ) {
            Ok(sides) => sides,
            Err(e) => {
                tracing::warn!(error = %e, "override lookup failed, withholding occurrences");
                return Err(e);
            }
        };

        let occurrences: Vec<Occurrence> = instants
            .into_iter()
            .filter(|at| !exceptions.contains(at))
            .map(|at| match overrides.get(&at) {
                Some(found) => Occurrence {
                    series_id: template.id,
                    scheduled_at: at,
                    fields: found.fields.apply(&template.fields),
                    kind: OccurrenceKind::Overridden(found.fields.clone()),
                },
                None => Occurrence {
                    series_id: template.id,
                    scheduled_at: at,
                    fields: template.fields.clone(),
                    kind: OccurrenceKind::Base,
                },
            })
            .collect();

        tracing::debug!(
            count = occurrences.len(),
            exceptions = exceptions.len(),
            overrides = overrides.len(),
            "materialized series"
        );
        Ok(occurrences)
    }
}

impl<'a, S: Repository + ?Sized> Materializer<'a, S> {
    /// Loads a series and materializes it.
    pub async fn materialize_series(
        &self,
        series_id: Uuid,
        window: Window,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let template = self.store.load_template(series_id).await?;
        if template.recurrence_start >= window.end
            || template.effective_end().is_some_and(|end| end < window.start)
        {
            return Ok(Vec::new());
        }
        self.materialize(&template, window).await
    }

    /// Materializes every series of a tenant. A failing series is reported in
    /// [`AgendaResult::failures`] and does not affect the others.
    #[tracing::instrument(skip(self))]
    pub async fn materialize_company(
        &self,
        company_id: Uuid,
        window: Window,
    ) -> Result<AgendaResult, CoreError> {
        let series_ids = self.store.list_series_ids(company_id).await?;
        let mut result = AgendaResult::default();

        for series_id in series_ids {
            match self.materialize_series(series_id, window).await {
                Ok(occurrences) => result.occurrences.extend(occurrences),
                Err(error) => {
                    tracing::warn!(%series_id, error = %error, "series left out of agenda");
                    result.failures.push(SeriesFailure { series_id, error });
                }
            }
        }

        result.occurrences.sort_by_key(|o| o.scheduled_at);
        Ok(result)
    }
}
