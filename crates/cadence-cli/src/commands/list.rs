use anyhow::Result;
use cadence_core::recurrence::RecurrenceManager;
use cadence_core::repository::Repository;
use chrono::Utc;

use crate::config::Config;
use crate::views::table::{display_series, ViewSeries};

pub async fn list_series(repo: &impl Repository, config: &Config) -> Result<()> {
    let templates = repo.list_templates(config.company_id).await?;
    let now = Utc::now();
    let horizon = config.engine.preview_horizon();

    let view_series: Vec<ViewSeries> = templates
        .into_iter()
        .map(|t| {
            let next_at = match RecurrenceManager::for_template(&t) {
                Ok(manager) => manager.next_occurrence_after(now, horizon),
                Err(e) => {
                    tracing::warn!(series_id = %t.id, error = %e, "cannot expand series");
                    None
                }
            };
            ViewSeries {
                id: t.id,
                title: t.fields.title,
                rule: t.rule,
                timezone: t.timezone,
                priority: t.fields.priority,
                next_at,
            }
        })
        .collect();

    display_series(&view_series);

    Ok(())
}
