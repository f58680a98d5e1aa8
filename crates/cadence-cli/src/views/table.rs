use cadence_core::models::{Frequency, Occurrence, Priority, RecurrenceRule, Status, Termination};
use chrono::{DateTime, Utc};
use chrono_humanize::Humanize;
use chrono_tz::Tz;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use uuid::Uuid;

use crate::timezone::format_timezone_display;
use crate::util::short_id;

#[derive(Debug, Clone)]
pub struct ViewSeries {
    pub id: Uuid,
    pub title: String,
    pub rule: RecurrenceRule,
    pub timezone: Tz,
    pub priority: Priority,
    pub next_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ViewOccurrence {
    pub occurrence: Occurrence,
    pub timezone: Tz,
}

/// Human-readable rule, e.g. `every 2 weeks on Mon, Wed, 10 times`
pub fn describe_rule(rule: &RecurrenceRule) -> String {
    let unit = match rule.frequency {
        Frequency::Daily => "day",
        Frequency::Weekly => "week",
        Frequency::Monthly => "month",
        Frequency::Yearly => "year",
    };
    let mut text = if rule.interval <= 1 {
        format!("every {}", unit)
    } else {
        format!("every {} {}s", rule.interval, unit)
    };

    if !rule.by_weekday.is_empty() {
        let days: Vec<String> = rule.by_weekday.iter().map(|d| format!("{:?}", d)).collect();
        text.push_str(&format!(" on {}", days.join(", ")));
    }

    match rule.termination {
        Termination::Unbounded => {}
        Termination::Count(1) => text.push_str(", once"),
        Termination::Count(n) => text.push_str(&format!(", {} times", n)),
        Termination::Until(until) => {
            text.push_str(&format!(", until {}", until.format("%Y-%m-%d")))
        }
    }
    text
}

fn priority_cell(text: String, priority: Priority) -> Cell {
    let cell = Cell::new(text);
    match priority {
        Priority::High => cell.fg(Color::Red).add_attribute(Attribute::Bold),
        Priority::Medium => cell.fg(Color::Yellow),
        Priority::Low => cell.fg(Color::Green),
        Priority::None => cell,
    }
}

pub fn display_series(series: &[ViewSeries]) {
    if series.is_empty() {
        println!("No series found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Recurs", "Timezone", "Next"]);

    for item in series {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(item.id)));
        row.add_cell(priority_cell(item.title.clone(), item.priority));
        row.add_cell(Cell::new(describe_rule(&item.rule)));
        row.add_cell(Cell::new(item.timezone.name()));

        let next_cell = match item.next_at {
            Some(next_at) => Cell::new(format!(
                "{} ({})",
                format_timezone_display(next_at, item.timezone),
                next_at.humanize()
            )),
            None => Cell::new("Ended").fg(Color::DarkGrey),
        };
        row.add_cell(next_cell);
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_occurrences(occurrences: &[ViewOccurrence]) {
    if occurrences.is_empty() {
        println!("No occurrences found.");
        return;
    }

    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["When", "In", "Series", "Title", "Status", "Location"]);

    for view in occurrences {
        let occurrence = &view.occurrence;
        let fields = &occurrence.fields;
        let mut row = Row::new();

        let when = Cell::new(format_timezone_display(occurrence.scheduled_at, view.timezone));
        row.add_cell(if occurrence.scheduled_at < now {
            when.fg(Color::DarkGrey)
        } else {
            when
        });
        row.add_cell(Cell::new(occurrence.scheduled_at.humanize()));
        row.add_cell(Cell::new(short_id(occurrence.series_id)));

        // ✎ marks an occurrence with its own edits
        let title = if occurrence.is_override() {
            format!("{} ✎", fields.title)
        } else {
            fields.title.clone()
        };
        let title_cell = match fields.status {
            Status::Completed | Status::Cancelled => Cell::new(title)
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey),
            Status::Pending => priority_cell(title, fields.priority),
        };
        row.add_cell(title_cell);

        let status_cell = Cell::new(fields.status.to_string());
        row.add_cell(match fields.status {
            Status::Completed => status_cell.fg(Color::Green),
            Status::Cancelled => status_cell.fg(Color::DarkGrey),
            Status::Pending => status_cell,
        });
        row.add_cell(Cell::new(fields.location.as_deref().unwrap_or("")));
        table.add_row(row);
    }

    println!("{table}");
}
