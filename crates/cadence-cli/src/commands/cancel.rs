use anyhow::Result;
use cadence_core::editor::SeriesEditor;
use cadence_core::models::EditScope;
use cadence_core::repository::Repository;
use dialoguer::Confirm;
use owo_colors::OwoColorize;

use crate::cli::CancelCommand;
use crate::commands::select_scope;
use crate::config::Config;
use crate::parser::parse_datetime;
use crate::timezone::format_timezone_display;
use crate::util::{resolve_series_id, short_id};

pub async fn cancel_occurrence(repo: &impl Repository, command: CancelCommand, config: &Config) -> Result<()> {
    let series_id = resolve_series_id(repo, config.company_id, &command.id).await?;
    let template = repo.load_template(series_id).await?;
    let occurrence_at = parse_datetime(&command.at, template.timezone)?;
    let scope = select_scope(command.scope, "cancel", occurrence_at, template.timezone)?;

    if !command.force {
        let when = format_timezone_display(occurrence_at, template.timezone);
        let prompt = match scope {
            EditScope::Single => format!("Cancel '{}' on {}?", template.fields.title, when),
            EditScope::Future => format!(
                "Cancel '{}' on {} and every later occurrence?",
                template.fields.title, when
            ),
            EditScope::Series => format!(
                "Delete the series '{}' with all its occurrences?",
                template.fields.title
            ),
        };
        let confirmation = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Nothing cancelled.");
            return Ok(());
        }
    }

    let outcome = SeriesEditor::new(repo)
        .cancel(series_id, scope, occurrence_at)
        .await?;

    if outcome.deleted {
        println!(
            "{} series {}.",
            "Deleted".red(),
            short_id(outcome.series_id).yellow()
        );
    } else if scope == EditScope::Future {
        println!(
            "{} series {} before this occurrence.",
            "Ended".yellow(),
            short_id(outcome.series_id).yellow()
        );
    } else {
        println!(
            "{} occurrence of series {}.",
            "Cancelled".yellow(),
            short_id(outcome.series_id).yellow()
        );
    }

    Ok(())
}
