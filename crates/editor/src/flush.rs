// Persisting the in-memory document.
//
// A flush serializes every cell and multiline entry under the session lock,
// releases the lock, then writes cells before multiline entries. Edits made
// while the write is in flight land in memory and keep the session dirty.

use griddoc_common::{CellRecord, MultilineRecord};
use griddoc_store::{Store, StoreError};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::session::EditorSession;

/// Who asked for the flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Autosave: only the status indicator moves.
    Silent,
    /// Explicit save: a [`Notice`] is published as well.
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// Another flush was already in flight.
    Skipped,
    Saved { cells: usize, multiline: usize },
    Failed { message: String },
}

/// User-facing save notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Saved { cells: usize, multiline: usize },
    SaveFailed { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct FlushBatch {
    pub cells: Vec<CellRecord>,
    pub multiline: Vec<MultilineRecord>,
}

impl FlushBatch {
    /// Write the batch, parents before children.
    pub async fn write<S: Store>(&self, store: &S) -> Result<(), StoreError> {
        if !self.cells.is_empty() {
            store.upsert_cells(&self.cells).await?;
        }
        if !self.multiline.is_empty() {
            store.upsert_multiline(&self.multiline).await?;
        }
        Ok(())
    }
}

pub async fn flush<S: Store>(
    store: &S,
    session: &Mutex<EditorSession>,
    mode: FlushMode,
    notices: &broadcast::Sender<Notice>,
) -> FlushOutcome {
    let (batch, document_id) = {
        let mut guard = session.lock().await;
        match guard.begin_flush() {
            Some(batch) => (batch, guard.document().id),
            None => {
                debug!("flush skipped: save already in flight");
                return FlushOutcome::Skipped;
            }
        }
    };

    let result = batch.write(store).await;
    session.lock().await.complete_flush(result.as_ref().map(|_| ()).map_err(ToString::to_string));

    let outcome = match result {
        Ok(()) => {
            let (cells, multiline) = (batch.cells.len(), batch.multiline.len());
            match mode {
                FlushMode::Silent => {
                    debug!(document_id = %document_id, cells, multiline, "autosaved");
                }
                FlushMode::Verbose => {
                    info!(document_id = %document_id, cells, multiline, "document saved");
                }
            }
            FlushOutcome::Saved { cells, multiline }
        }
        Err(error) => {
            warn!(document_id = %document_id, error = %error, ?mode, "flush failed");
            FlushOutcome::Failed { message: error.to_string() }
        }
    };

    if mode == FlushMode::Verbose {
        let notice = match &outcome {
            FlushOutcome::Saved { cells, multiline } => {
                Some(Notice::Saved { cells: *cells, multiline: *multiline })
            }
            FlushOutcome::Failed { message } => {
                Some(Notice::SaveFailed { message: message.clone() })
            }
            FlushOutcome::Skipped => None,
        };
        if let Some(notice) = notice {
            // No subscribers is fine.
            let _ = notices.send(notice);
        }
    }
    outcome
}
