use clap::Parser;
use cadence_core::db;
use cadence_core::error::CoreError;
use cadence_core::repository::SqliteRepository;
use owo_colors::{OwoColorize, Style};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod parser;
mod timezone;
mod util;
mod views;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CADENCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    let config = config::Config::new().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid configuration, using defaults");
        config::Config::default()
    });

    let result = match cli.command {
        // Preview never touches storage
        cli::Commands::Preview(command) => commands::preview::preview_rule(command, &config),
        command => run(command, &config).await,
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

async fn run(command: cli::Commands, config: &config::Config) -> anyhow::Result<()> {
    let db_pool = db::establish_connection(&config.database_path).await?;
    let repository = SqliteRepository::new(db_pool);

    match command {
        cli::Commands::Add(command) => commands::add::add_series(&repository, command, config).await,
        cli::Commands::List => commands::list::list_series(&repository, config).await,
        cli::Commands::Show(command) => {
            commands::show::show_series(&repository, command, config).await
        }
        cli::Commands::Agenda(args) => {
            commands::agenda::show_agenda(&repository, args, config).await
        }
        cli::Commands::Edit(command) => {
            commands::edit::edit_occurrence(&repository, command, config).await
        }
        cli::Commands::Cancel(command) => {
            commands::cancel::cancel_occurrence(&repository, command, config).await
        }
        cli::Commands::Restore(command) => {
            commands::restore::restore_occurrence(&repository, command, config).await
        }
        cli::Commands::Preview(command) => commands::preview::preview_rule(command, config),
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    match err.downcast_ref::<CoreError>() {
        Some(CoreError::InvalidRule(s)) => {
            eprintln!("{} Invalid recurrence rule: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::InvalidTimezone(s)) => {
            eprintln!("{} {}", "Error:".style(error_style), s);
        }
        Some(CoreError::InvalidInput(s)) => {
            eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::SeriesNotFound(id)) => {
            eprintln!(
                "{} Series '{}' not found.",
                "Error:".style(error_style),
                id.yellow()
            );
        }
        Some(CoreError::OccurrenceNotFound {
            series_id,
            occurrence_at,
        }) => {
            eprintln!(
                "{} Series '{}' has no occurrence at {}.",
                "Error:".style(error_style),
                util::short_id(*series_id).yellow(),
                occurrence_at.to_rfc3339().yellow()
            );
            eprintln!("Use `cadence show {}` to list its occurrences.", util::short_id(*series_id));
        }
        Some(CoreError::SplitIncomplete { reason, .. }) => {
            eprintln!(
                "{} The series changed while it was being edited ({}). Nothing was saved; try again.",
                "Error:".style(error_style),
                reason
            );
        }
        Some(core_error) if core_error.is_storage() => {
            eprintln!(
                "{} Storage unavailable: {:#}",
                "Error:".style(error_style),
                err
            );
        }
        _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
    }
}
