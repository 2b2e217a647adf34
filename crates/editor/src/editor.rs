// Editor: one open document plus its autosave task.
//
// Value edits go straight into the session and arm the autosave timer.
// Structural operations wait for any in-flight save, flush pending edits,
// run against the store, then re-hydrate the session from the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use griddoc_common::{
    CellValue, Column, DataType, FileAttachment, Row, SaveStatus, SubColumn, Viewer,
};
use griddoc_store::{CascadeReport, Store};
use tokio::sync::{broadcast, mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::admin::{self, ColumnPatch, NewAttachment, NewColumn};
use crate::autosave;
use crate::error::EditorError;
use crate::flush::{flush, FlushMode, FlushOutcome, Notice};
use crate::session::EditorSession;

const NOTICE_CAPACITY: usize = 16;

pub struct Editor<S: Store> {
    store: Arc<S>,
    session: Arc<Mutex<EditorSession>>,
    document_id: Uuid,
    viewer: Viewer,
    status: watch::Receiver<SaveStatus>,
    notices: broadcast::Sender<Notice>,
    shutdown: watch::Sender<bool>,
    autosave: Option<JoinHandle<()>>,
}

impl<S: Store> Editor<S> {
    /// Load `document_id` and start autosaving after `quiet_period` of
    /// inactivity.
    pub async fn open(
        store: Arc<S>,
        document_id: Uuid,
        viewer: Viewer,
        quiet_period: Duration,
    ) -> Result<Self, EditorError> {
        let mut session = EditorSession::load(&*store, document_id, viewer).await?;
        let (edit_tx, edit_rx) = mpsc::unbounded_channel();
        session.attach_autosave(edit_tx);
        let status = session.subscribe();
        let session = Arc::new(Mutex::new(session));

        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = autosave::spawn(
            Arc::clone(&store),
            Arc::clone(&session),
            notices.clone(),
            quiet_period,
            edit_rx,
            shutdown_rx,
        );

        let quiet_ms = quiet_period.as_millis() as u64;
        debug!(document_id = %document_id, quiet_ms, "editor opened");
        Ok(Self {
            store,
            session,
            document_id,
            viewer,
            status,
            notices,
            shutdown,
            autosave: Some(task),
        })
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Lock the session for reading or direct edits.
    pub async fn session(&self) -> MutexGuard<'_, EditorSession> {
        self.session.lock().await
    }

    pub fn status(&self) -> SaveStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    // ── Value edits ────────────────────────────────────────────────

    pub async fn set_cell(
        &self,
        row_id: Uuid,
        column_id: Uuid,
        value: CellValue,
    ) -> Result<(), EditorError> {
        self.session.lock().await.set_cell(row_id, column_id, value)
    }

    pub async fn set_cell_input(
        &self,
        row_id: Uuid,
        column_id: Uuid,
        input: &str,
    ) -> Result<(), EditorError> {
        self.session.lock().await.set_cell_input(row_id, column_id, input)
    }

    pub async fn add_multiline_record(
        &self,
        row_id: Uuid,
        column_id: Uuid,
    ) -> Result<i32, EditorError> {
        self.session.lock().await.add_multiline_record(row_id, column_id)
    }

    pub async fn set_multiline_value(
        &self,
        row_id: Uuid,
        column_id: Uuid,
        order_index: i32,
        sub_column_id: Uuid,
        value: CellValue,
    ) -> Result<(), EditorError> {
        self.session.lock().await.set_multiline_value(
            row_id,
            column_id,
            order_index,
            sub_column_id,
            value,
        )
    }

    /// Explicit save. Publishes a [`Notice`] with the result.
    pub async fn save(&self) -> FlushOutcome {
        flush(&*self.store, &self.session, FlushMode::Verbose, &self.notices).await
    }

    /// Stop autosaving. Pending edits that were not saved stay unsaved; a
    /// flush already running completes first.
    pub async fn close(mut self) -> SaveStatus {
        self.shutdown.send_replace(true);
        if let Some(task) = self.autosave.take() {
            if let Err(error) = task.await {
                warn!(document_id = %self.document_id, error = %error, "autosave task failed");
            }
        }
        let status = self.session.lock().await.status();
        debug!(document_id = %self.document_id, status = status.as_str(), "editor closed");
        status
    }

    // ── Structural operations ──────────────────────────────────────

    /// Wait until no save is in flight, then hold the session.
    async fn quiesce(&self) -> MutexGuard<'_, EditorSession> {
        let mut status = self.status.clone();
        loop {
            status.borrow_and_update();
            let guard = self.session.lock().await;
            if guard.status() != SaveStatus::Saving {
                return guard;
            }
            drop(guard);
            if status.changed().await.is_err() {
                return self.session.lock().await;
            }
        }
    }

    async fn structural<T, F, Fut>(&self, op: F) -> Result<T, EditorError>
    where
        F: FnOnce(Arc<S>) -> Fut,
        Fut: Future<Output = Result<T, EditorError>>,
    {
        let mut session = self.quiesce().await;

        if matches!(session.status(), SaveStatus::Dirty | SaveStatus::Error) {
            if let Some(batch) = session.begin_flush() {
                let result = batch.write(&*self.store).await;
                session.complete_flush(result.as_ref().map(|_| ()).map_err(ToString::to_string));
                result.map_err(EditorError::Write)?;
            }
        }

        let value = op(Arc::clone(&self.store)).await?;
        if let Err(error) = session.reload(&*self.store).await {
            warn!(document_id = %self.document_id, error = %error, "reload after change failed");
            return Err(error);
        }
        Ok(value)
    }

    fn author(&self) -> Option<Uuid> {
        self.viewer.user_id()
    }

    pub async fn rename_document(&self, name: &str) -> Result<(), EditorError> {
        let id = self.document_id;
        let name = name.to_string();
        self.structural(|store| async move {
            admin::rename_document(&*store, id, &name).await.map(|_| ())
        })
        .await
    }

    pub async fn add_column(&self, new: NewColumn) -> Result<Column, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move { admin::add_column(&*store, id, new).await }).await
    }

    pub async fn update_column(
        &self,
        column_id: Uuid,
        patch: ColumnPatch,
    ) -> Result<Column, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move {
            admin::update_column(&*store, id, column_id, patch).await
        })
        .await
    }

    pub async fn reorder_columns(&self, ordering: &[Uuid]) -> Result<Vec<Column>, EditorError> {
        let id = self.document_id;
        let ordering = ordering.to_vec();
        self.structural(|store| async move {
            admin::reorder_columns(&*store, id, &ordering).await
        })
        .await
    }

    pub async fn duplicate_column(&self, column_id: Uuid) -> Result<Column, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move {
            admin::duplicate_column(&*store, id, column_id).await
        })
        .await
    }

    pub async fn delete_column(&self, column_id: Uuid) -> Result<CascadeReport, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move {
            admin::delete_column(&*store, id, column_id).await
        })
        .await
    }

    pub async fn add_sub_column(
        &self,
        parent_column_id: Uuid,
        label: &str,
        data_type: DataType,
    ) -> Result<SubColumn, EditorError> {
        let id = self.document_id;
        let label = label.to_string();
        self.structural(|store| async move {
            admin::add_sub_column(&*store, id, parent_column_id, &label, data_type).await
        })
        .await
    }

    pub async fn delete_sub_column(
        &self,
        sub_column_id: Uuid,
    ) -> Result<CascadeReport, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move {
            admin::delete_sub_column(&*store, id, sub_column_id).await
        })
        .await
    }

    pub async fn add_row(&self) -> Result<Row, EditorError> {
        let (id, author) = (self.document_id, self.author());
        self.structural(|store| async move { admin::add_row(&*store, id, author).await }).await
    }

    pub async fn duplicate_row(&self, row_id: Uuid) -> Result<Row, EditorError> {
        let (id, author) = (self.document_id, self.author());
        self.structural(|store| async move {
            admin::duplicate_row(&*store, id, row_id, author).await
        })
        .await
    }

    pub async fn delete_row(&self, row_id: Uuid) -> Result<CascadeReport, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move { admin::delete_row(&*store, id, row_id).await }).await
    }

    /// Remove one record of a multiline cell. Unsaved edits are flushed
    /// first so the record exists in the store.
    pub async fn remove_multiline_record(
        &self,
        row_id: Uuid,
        column_id: Uuid,
        order_index: i32,
    ) -> Result<CascadeReport, EditorError> {
        let cell_id = self
            .session
            .lock()
            .await
            .cell(row_id, column_id)
            .map(|cell| cell.id);
        let Some(cell_id) = cell_id else {
            return Ok(CascadeReport::default());
        };
        let id = self.document_id;
        self.structural(|store| async move {
            admin::remove_multiline_record(&*store, id, cell_id, order_index).await
        })
        .await
    }

    pub async fn attach_file(&self, new: NewAttachment) -> Result<FileAttachment, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move { admin::attach_file(&*store, id, new).await }).await
    }

    pub async fn detach_file(&self, file_id: Uuid) -> Result<CascadeReport, EditorError> {
        let id = self.document_id;
        self.structural(|store| async move { admin::detach_file(&*store, id, file_id).await })
            .await
    }
}

impl<S: Store> Drop for Editor<S> {
    fn drop(&mut self) {
        // Cancels the pending deadline; the task exits on its own.
        self.shutdown.send_replace(true);
    }
}
