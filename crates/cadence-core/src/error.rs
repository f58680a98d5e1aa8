use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Storage unavailable")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Series split for {series_id} did not complete: {reason}")]
    SplitIncomplete { series_id: Uuid, reason: String },

    #[error("Series {series_id} has no occurrence at {occurrence_at}")]
    OccurrenceNotFound {
        series_id: Uuid,
        occurrence_at: DateTime<Utc>,
    },

    #[error("Series not found: {0}")]
    SeriesNotFound(Uuid),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether the error came from the storage collaborator rather than from
    /// the engine rejecting the request.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CoreError::StorageUnavailable(_) | CoreError::SplitIncomplete { .. }
        )
    }
}
