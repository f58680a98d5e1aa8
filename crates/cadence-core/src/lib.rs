//! # Cadence Core Library
//!
//! A recurring schedule engine: turns a template event or task plus a
//! recurrence rule into a concrete, time-bounded sequence of occurrences, and
//! lets callers edit or cancel one occurrence, this and future occurrences, or
//! the whole series without losing history.
//!
//! ## Core Modules
//!
//! - [`codec`]: Rule string encoding and decoding
//! - [`recurrence`]: Occurrence expansion
//! - [`materialization`]: Merging expansions with overrides and exceptions
//! - [`editor`]: Scoped edits, cancellation and the series split
//! - [`repository`]: Storage traits and the SQLite implementation
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures
//! - [`timezone`]: Timezone utilities and validation
//! - [`config`]: Engine tunables
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     config::EngineConfig,
//!     db,
//!     editor::SeriesEditor,
//!     materialization::Materializer,
//!     models::{EditScope, Frequency, NewSeriesData, PayloadPatch, RecurrenceRule, SeriesEdit, TemplatePayload, Window},
//!     repository::SqliteRepository,
//! };
//! use chrono::{Duration, TimeZone, Utc};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("cadence.db").await?;
//!     let repo = SqliteRepository::new(pool);
//!     let editor = SeriesEditor::new(&repo);
//!
//!     let start = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
//!     let series = editor
//!         .create_series(NewSeriesData {
//!             company_id: Uuid::nil(),
//!             anchor_start: start,
//!             timezone: "America/New_York".to_string(),
//!             rule: RecurrenceRule::new(Frequency::Weekly),
//!             recurrence_start: None,
//!             fields: TemplatePayload::titled("Standup"),
//!         })
//!         .await?;
//!
//!     // Rename every occurrence from the third one on
//!     let edit = SeriesEdit { fields: PayloadPatch::title("Sync"), rule: None };
//!     editor
//!         .edit(series.id, EditScope::Future, start + Duration::weeks(2), edit)
//!         .await?;
//!
//!     let materializer = Materializer::new(&repo, EngineConfig::default());
//!     let window = Window::new(start, start + Duration::weeks(4))?;
//!     let agenda = materializer.materialize_company(Uuid::nil(), window).await?;
//!     for occurrence in agenda.occurrences {
//!         println!("{} {}", occurrence.scheduled_at, occurrence.fields.title);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod db;
pub mod editor;
pub mod error;
pub mod materialization;
pub mod models;
pub mod recurrence;
pub mod repository;
pub mod timezone;
