use anyhow::Result;
use cadence_core::materialization::Materializer;
use cadence_core::repository::Repository;
use owo_colors::OwoColorize;

use crate::cli::ShowCommand;
use crate::config::Config;
use crate::util::{resolve_series_id, resolve_window, short_id};
use crate::views::table::{describe_rule, display_occurrences, ViewOccurrence};

pub async fn show_series(repo: &impl Repository, command: ShowCommand, config: &Config) -> Result<()> {
    let series_id = resolve_series_id(repo, config.company_id, &command.id).await?;
    let template = repo.load_template(series_id).await?;
    let window = resolve_window(&command.window, template.timezone, config.agenda_days)?;

    let materializer = Materializer::new(repo, config.engine);
    let occurrences = materializer.materialize(&template, window).await?;

    println!(
        "{} {}",
        short_id(template.id).yellow(),
        template.fields.title.bold()
    );
    println!(
        "  {} ({})",
        describe_rule(&template.rule),
        template.timezone.name()
    );
    if let Some(description) = &template.fields.description {
        println!("  {}", description.dimmed());
    }
    println!();

    let views: Vec<ViewOccurrence> = occurrences
        .into_iter()
        .map(|occurrence| ViewOccurrence {
            occurrence,
            timezone: template.timezone,
        })
        .collect();
    display_occurrences(&views);

    Ok(())
}
