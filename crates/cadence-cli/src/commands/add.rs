use anyhow::{anyhow, Result};
use cadence_core::codec;
use cadence_core::editor::SeriesEditor;
use cadence_core::error::CoreError;
use cadence_core::models::{NewSeriesData, RecurrenceRule};
use cadence_core::recurrence::RecurrenceManager;
use cadence_core::repository::Repository;
use chrono::Utc;
use chrono_tz::Tz;
use owo_colors::OwoColorize;

use crate::cli::AddCommand;
use crate::config::Config;
use crate::parser::{parse_datetime, parse_until, parse_weekdays};
use crate::timezone::{format_timezone_display, normalize_timezone_input};
use crate::util::short_id;
use crate::views::table::describe_rule;

pub async fn add_series(repo: &impl Repository, command: AddCommand, config: &Config) -> Result<()> {
    let tz = normalize_timezone_input(
        command
            .timezone
            .as_deref()
            .unwrap_or(&config.default_timezone),
    )?;
    let anchor_start = parse_datetime(&command.start, tz)?;
    let rule = build_rule(&command, tz)?;

    let data = NewSeriesData {
        company_id: config.company_id,
        anchor_start,
        timezone: tz.name().to_string(),
        rule,
        recurrence_start: None,
        fields: command.fields.into_payload(command.title),
    };

    let series = SeriesEditor::new(repo).create_series(data).await?;

    println!(
        "{} {} {}",
        "Created series".green(),
        short_id(series.id).yellow(),
        series.fields.title.bold()
    );
    println!("  Recurs: {}", describe_rule(&series.rule));

    let manager = RecurrenceManager::for_template(&series)?;
    let horizon = config.engine.preview_horizon();
    let next = manager
        .first_occurrence()
        .filter(|first| *first >= Utc::now())
        .or_else(|| manager.next_occurrence_after(Utc::now(), horizon));
    match next {
        Some(next) => println!("  Next:   {}", format_timezone_display(next, series.timezone)),
        None => println!("  {}", "No upcoming occurrences.".dimmed()),
    }

    Ok(())
}

fn build_rule(command: &AddCommand, tz: Tz) -> Result<RecurrenceRule> {
    if let Some(raw) = &command.rule {
        return codec::decode(raw, tz)?
            .ok_or_else(|| anyhow!(CoreError::InvalidRule("rule string is empty".to_string())));
    }

    let frequency = command
        .every
        .ok_or_else(|| anyhow!(CoreError::InvalidInput("--every or --rule is required".to_string())))?;
    let mut rule = RecurrenceRule::new(frequency).interval(command.interval);

    if let Some(days) = &command.on {
        rule = rule.on(parse_weekdays(days)?);
    }
    if let Some(count) = command.count {
        rule = rule.count(count);
    }
    if let Some(until) = &command.until {
        rule = rule.until(parse_until(until, tz)?);
    }

    Ok(rule)
}
