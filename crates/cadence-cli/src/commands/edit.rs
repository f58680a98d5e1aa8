use anyhow::{anyhow, Result};
use cadence_core::codec;
use cadence_core::editor::{EditOutcome, SeriesEditor};
use cadence_core::error::CoreError;
use cadence_core::models::{EditScope, SeriesEdit};
use cadence_core::repository::Repository;
use owo_colors::OwoColorize;

use crate::cli::EditCommand;
use crate::commands::select_scope;
use crate::config::Config;
use crate::parser::parse_datetime;
use crate::util::{resolve_series_id, short_id};

pub async fn edit_occurrence(repo: &impl Repository, command: EditCommand, config: &Config) -> Result<()> {
    let series_id = resolve_series_id(repo, config.company_id, &command.id).await?;
    let template = repo.load_template(series_id).await?;
    let occurrence_at = parse_datetime(&command.at, template.timezone)?;

    let rule = match &command.rule {
        Some(raw) => Some(codec::decode(raw, template.timezone)?.ok_or_else(|| {
            anyhow!(CoreError::InvalidRule("rule string is empty".to_string()))
        })?),
        None => None,
    };

    let mut fields = command.fields.into_patch();
    fields.title = command.title;
    fields.status = command.status;
    let edit = SeriesEdit { fields, rule };
    if edit.fields.is_empty() && edit.rule.is_none() {
        println!("No changes specified.");
        return Ok(());
    }

    let scope = select_scope(command.scope, "edit", occurrence_at, template.timezone)?;
    let outcome = SeriesEditor::new(repo)
        .edit(series_id, scope, occurrence_at, edit)
        .await?;

    print_outcome(scope, &outcome);
    Ok(())
}

fn print_outcome(scope: EditScope, outcome: &EditOutcome) {
    match (scope, outcome.new_series_id) {
        (EditScope::Future, Some(new_id)) => println!(
            "{} series {}; future occurrences now belong to {}.",
            "Split".green(),
            short_id(outcome.series_id).yellow(),
            short_id(new_id).yellow()
        ),
        (EditScope::Single, _) => println!(
            "{} occurrence of series {}.",
            "Updated".green(),
            short_id(outcome.series_id).yellow()
        ),
        _ => println!(
            "{} series {}.",
            "Updated".green(),
            short_id(outcome.series_id).yellow()
        ),
    }
}
