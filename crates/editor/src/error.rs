use griddoc_common::{Action, ValidationError};
use griddoc_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EditorError {
    /// Rejected before any store call; nothing changed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not permitted to {action} {target}")]
    Forbidden { action: Action, target: String },

    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    /// A fetch failed. Loads are all-or-nothing, so no partial state exists.
    #[error("failed to read from store: {0}")]
    Read(#[source] StoreError),

    /// An upsert or delete failed. In-memory state is kept as it was.
    #[error("failed to write to store: {0}")]
    Write(#[source] StoreError),
}

impl EditorError {
    pub fn forbidden(action: Action, target: impl Into<String>) -> Self {
        Self::Forbidden { action, target: target.into() }
    }

    /// Stable machine-readable code for CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Forbidden { .. } => "forbidden",
            Self::DocumentNotFound(_) => "not_found",
            Self::Read(error) | Self::Write(error) if error.is_not_found() => "not_found",
            Self::Read(_) => "store_read_failed",
            Self::Write(_) => "store_write_failed",
        }
    }
}
