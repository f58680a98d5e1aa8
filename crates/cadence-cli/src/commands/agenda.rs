use anyhow::Result;
use cadence_core::materialization::Materializer;
use cadence_core::repository::Repository;
use owo_colors::OwoColorize;

use crate::cli::WindowArgs;
use crate::config::Config;
use crate::timezone::normalize_timezone_input;
use crate::util::{resolve_window, short_id};
use crate::views::table::{display_occurrences, ViewOccurrence};

pub async fn show_agenda(repo: &impl Repository, args: WindowArgs, config: &Config) -> Result<()> {
    let tz = normalize_timezone_input(&config.default_timezone)?;
    let window = resolve_window(&args, tz, config.agenda_days)?;

    let materializer = Materializer::new(repo, config.engine);
    let agenda = materializer
        .materialize_company(config.company_id, window)
        .await?;
    let complete = agenda.is_complete();

    let views: Vec<ViewOccurrence> = agenda
        .occurrences
        .into_iter()
        .map(|occurrence| ViewOccurrence {
            occurrence,
            timezone: tz,
        })
        .collect();
    display_occurrences(&views);

    if !complete {
        for failure in &agenda.failures {
            eprintln!(
                "{} series {} could not be shown: {}",
                "Warning:".yellow().bold(),
                short_id(failure.series_id),
                failure.error
            );
        }
    }

    Ok(())
}
