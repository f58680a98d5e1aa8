use anyhow::Result;
use cadence_core::models::{EditScope, PayloadPatch, TemplatePayload};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dialoguer::Select;
use owo_colors::OwoColorize;

use crate::cli::FieldArgs;
use crate::timezone::format_timezone_display;

pub mod add;
pub mod agenda;
pub mod cancel;
pub mod edit;
pub mod list;
pub mod preview;
pub mod restore;
pub mod show;

/// Returns the scope given on the command line, or asks for one.
pub(crate) fn select_scope(
    scope: Option<EditScope>,
    action: &str,
    occurrence_at: DateTime<Utc>,
    tz: Tz,
) -> Result<EditScope> {
    if let Some(scope) = scope {
        return Ok(scope);
    }

    let options = vec![
        format!(
            "This occurrence only ({})",
            format_timezone_display(occurrence_at, tz)
        ),
        "This and future occurrences".to_string(),
        "Entire series".to_string(),
    ];

    println!("{}", "This occurrence is part of a recurring series.".yellow());
    let selection = Select::new()
        .with_prompt(format!("What would you like to {}?", action))
        .items(&options)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => EditScope::Single,
        1 => EditScope::Future,
        _ => EditScope::Series,
    })
}

fn clearable(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

impl FieldArgs {
    pub(crate) fn into_patch(self) -> PayloadPatch {
        PayloadPatch {
            description: clearable(self.description, self.description_clear),
            location: clearable(self.location, self.location_clear),
            color: clearable(self.color, self.color_clear),
            priority: self.priority,
            ..PayloadPatch::default()
        }
    }

    pub(crate) fn into_payload(self, title: String) -> TemplatePayload {
        self.into_patch().apply(&TemplatePayload::titled(title))
    }
}
