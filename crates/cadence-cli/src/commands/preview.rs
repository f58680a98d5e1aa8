use anyhow::{anyhow, Result};
use cadence_core::codec;
use cadence_core::error::CoreError;
use cadence_core::recurrence::RecurrenceManager;
use chrono::Duration;
use owo_colors::OwoColorize;

use crate::cli::PreviewCommand;
use crate::config::Config;
use crate::parser::parse_datetime;
use crate::timezone::{format_timezone_display, normalize_timezone_input};
use crate::views::table::describe_rule;

/// Prints the first occurrences of a rule without touching the database.
pub fn preview_rule(command: PreviewCommand, config: &Config) -> Result<()> {
    let tz = normalize_timezone_input(
        command
            .timezone
            .as_deref()
            .unwrap_or(&config.default_timezone),
    )?;
    let start = parse_datetime(&command.start, tz)?;
    let rule = codec::decode(&command.rule, tz)?
        .ok_or_else(|| anyhow!(CoreError::InvalidRule("rule string is empty".to_string())))?;

    let manager = RecurrenceManager::new(start.with_timezone(&tz), rule, start, None)?;
    let horizon = config.engine.preview_horizon();
    // The anchor itself is the first occurrence
    let occurrences =
        manager.next_occurrences(start - Duration::seconds(1), command.count, horizon);

    println!("{} {}", "Preview:".bold(), describe_rule(&rule));
    if occurrences.is_empty() {
        println!(
            "  {}",
            format!("No occurrences within {} days.", config.engine.preview_horizon_days).dimmed()
        );
    }
    for (i, at) in occurrences.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, format_timezone_display(*at, tz));
    }

    Ok(())
}
