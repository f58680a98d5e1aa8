use anyhow::Result;
use cadence_core::editor::SeriesEditor;
use cadence_core::repository::Repository;
use owo_colors::OwoColorize;

use crate::cli::RestoreCommand;
use crate::config::Config;
use crate::parser::parse_datetime;
use crate::timezone::format_timezone_display;
use crate::util::{resolve_series_id, short_id};

pub async fn restore_occurrence(repo: &impl Repository, command: RestoreCommand, config: &Config) -> Result<()> {
    let series_id = resolve_series_id(repo, config.company_id, &command.id).await?;
    let template = repo.load_template(series_id).await?;
    let occurrence_at = parse_datetime(&command.at, template.timezone)?;

    SeriesEditor::new(repo)
        .restore_occurrence(series_id, occurrence_at)
        .await?;

    println!(
        "{} {} of series {} to the series defaults.",
        "Restored".green(),
        format_timezone_display(occurrence_at, template.timezone),
        short_id(series_id).yellow()
    );
    Ok(())
}
