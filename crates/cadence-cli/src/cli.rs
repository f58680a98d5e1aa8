use cadence_core::models::{EditScope, Frequency, Priority, Status};
use clap::{Args, Parser, Subcommand};

/// Recurring events and tasks from the command line
#[derive(Parser, Debug)]
#[command(name = "cadence", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a recurring series
    Add(AddCommand),
    /// List the series of the configured company
    List,
    /// Show the occurrences of one series
    Show(ShowCommand),
    /// Show the occurrences of every series
    Agenda(WindowArgs),
    /// Edit one occurrence, this and future occurrences, or the whole series
    Edit(EditCommand),
    /// Cancel one occurrence, this and future occurrences, or the whole series
    Cancel(CancelCommand),
    /// Drop the edits or cancellation of one occurrence
    Restore(RestoreCommand),
    /// Preview a rule without saving anything
    Preview(PreviewCommand),
}

/// Fields shared by `add` and `edit`
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, conflicts_with = "description")]
    pub description_clear: bool,

    #[arg(long)]
    pub location: Option<String>,
    #[arg(long, conflicts_with = "location")]
    pub location_clear: bool,

    #[arg(long)]
    pub color: Option<String>,
    #[arg(long, conflicts_with = "color")]
    pub color_clear: bool,

    /// none, low, medium or high
    #[arg(long)]
    pub priority: Option<Priority>,
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// The title every occurrence inherits
    pub title: String,

    /// First occurrence (e.g. '2025-01-06 09:00', 'next monday 9am')
    #[arg(long)]
    pub start: String,

    /// Recurrence frequency
    #[arg(long, required_unless_present = "rule", conflicts_with = "rule")]
    pub every: Option<Frequency>,

    /// Repeat every N units of the frequency
    #[arg(long, default_value_t = 1)]
    pub interval: u32,

    /// Days of week for weekly rules (mon,tue,wed,thu,fri,sat,sun)
    #[arg(long, requires = "every")]
    pub on: Option<String>,

    /// Total number of occurrences
    #[arg(long, conflicts_with = "until", requires = "every")]
    pub count: Option<u32>,

    /// Last day an occurrence may fall on
    #[arg(long, requires = "every")]
    pub until: Option<String>,

    /// Raw rule string (e.g. 'FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10')
    #[arg(long)]
    pub rule: Option<String>,

    /// IANA timezone the series keeps its wall-clock time in
    #[arg(long)]
    pub timezone: Option<String>,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Start of the window (default: today)
    #[arg(long)]
    pub from: Option<String>,
    /// End of the window, exclusive (default: from + agenda_days)
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// Series ID or unique prefix
    pub id: String,
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct EditCommand {
    /// Series ID or unique prefix
    pub id: String,

    /// The occurrence's scheduled time
    #[arg(long)]
    pub at: String,

    /// single, future or series (prompted if omitted)
    #[arg(long)]
    pub scope: Option<EditScope>,

    #[arg(long)]
    pub title: Option<String>,

    /// pending, completed or cancelled
    #[arg(long)]
    pub status: Option<Status>,

    /// Replace the recurrence rule (future and series scopes)
    #[arg(long)]
    pub rule: Option<String>,

    #[command(flatten)]
    pub fields: FieldArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct CancelCommand {
    /// Series ID or unique prefix
    pub id: String,

    /// The occurrence's scheduled time
    #[arg(long)]
    pub at: String,

    /// single, future or series (prompted if omitted)
    #[arg(long)]
    pub scope: Option<EditScope>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RestoreCommand {
    /// Series ID or unique prefix
    pub id: String,

    /// The occurrence's scheduled time
    #[arg(long)]
    pub at: String,
}

#[derive(Parser, Debug, Clone)]
pub struct PreviewCommand {
    /// Rule string (e.g. 'FREQ=MONTHLY;COUNT=6')
    pub rule: String,

    /// First occurrence
    #[arg(long)]
    pub start: String,

    /// Number of occurrences to show
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    #[arg(long)]
    pub timezone: Option<String>,
}
