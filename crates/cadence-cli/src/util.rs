use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::models::Window;
use cadence_core::repository::TemplateStore;
use cadence_core::timezone::resolve_local;
use chrono::{Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::cli::WindowArgs;
use crate::parser::parse_datetime;

/// Resolves a full series ID or a unique prefix of one.
pub async fn resolve_series_id(
    repo: &impl TemplateStore,
    company_id: Uuid,
    input: &str,
) -> Result<Uuid> {
    if let Ok(id) = input.parse::<Uuid>() {
        return Ok(id);
    }
    if input.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }

    let prefix = input.to_lowercase();
    let matches: Vec<Uuid> = repo
        .list_series_ids(company_id)
        .await?
        .into_iter()
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!(CoreError::InvalidInput(format!(
            "No series found with ID prefix '{}'",
            input
        )))),
        _ => Err(anyhow!(CoreError::InvalidInput(format!(
            "ID prefix '{}' matches {} series: {}",
            input,
            matches.len(),
            matches
                .iter()
                .map(|id| short_id(*id))
                .collect::<Vec<_>>()
                .join(", ")
        )))),
    }
}

/// Window from `--from/--to`, defaulting to local midnight today plus
/// `default_days`.
pub fn resolve_window(args: &WindowArgs, tz: Tz, default_days: u32) -> Result<Window> {
    let start = match &args.from {
        Some(from) => parse_datetime(from, tz)?,
        None => {
            let today = Utc::now().with_timezone(&tz).date_naive();
            resolve_local(tz, today.and_time(NaiveTime::default()))
        }
    };
    let end = match &args.to {
        Some(to) => parse_datetime(to, tz)?,
        None => start + Duration::days(i64::from(default_days.max(1))),
    };
    Ok(Window::new(start, end)?)
}

/// First eight characters of an ID, as shown in tables
pub fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}
