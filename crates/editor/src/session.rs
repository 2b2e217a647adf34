// Editor session: the explicit state container for one open document.
//
// Holds the hydrated structure (columns, sub-columns, rows), the cell index,
// multiline entries and attachment metadata, plus the save tracker. Every
// value edit goes through here so the tracker and the autosave signal stay
// in step with the data.

use std::collections::BTreeMap;

use griddoc_common::{
    apply_view, validation, Action, AttachmentTarget, CellData, CellIndex, CellRecord, CellValue,
    Column, DataType, Document, FileAttachment, MultilineData, MultilineRecord, Row, SaveStatus,
    SaveTracker, SubColumn, ValidationError, ViewQuery, Viewer,
};
use griddoc_store::{Store, StoreError};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use crate::error::EditorError;
use crate::flush::FlushBatch;

/// Everything fetched for one document, decoded.
struct Snapshot {
    document: Document,
    columns: Vec<Column>,
    sub_columns: Vec<SubColumn>,
    rows: Vec<Row>,
    cells: Vec<CellData>,
    multiline: Vec<MultilineData>,
    files: Vec<FileAttachment>,
}

fn corrupt(error: impl std::fmt::Display) -> EditorError {
    EditorError::Read(StoreError::Corrupt(error.to_string()))
}

impl Snapshot {
    /// Fetch the whole document. Any failure aborts the load.
    async fn fetch<S: Store>(store: &S, document_id: Uuid) -> Result<Self, EditorError> {
        let document = store
            .fetch_document(document_id)
            .await
            .map_err(EditorError::Read)?
            .ok_or(EditorError::DocumentNotFound(document_id))?;

        let columns = store.fetch_columns(document_id).await.map_err(EditorError::Read)?;
        let column_ids: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
        let sub_columns = store.fetch_sub_columns(&column_ids).await.map_err(EditorError::Read)?;
        let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;

        let row_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let cells = store
            .fetch_cells_by_row_ids(&row_ids)
            .await
            .map_err(EditorError::Read)?
            .into_iter()
            .map(CellData::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        let cell_ids: Vec<Uuid> = cells.iter().map(|c| c.id).collect();
        let multiline = store
            .fetch_multiline_by_cell_ids(&cell_ids)
            .await
            .map_err(EditorError::Read)?
            .into_iter()
            .map(MultilineData::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        let multiline_ids: Vec<Uuid> = multiline.iter().map(|m| m.id).collect();
        let files =
            store.fetch_files(&cell_ids, &multiline_ids).await.map_err(EditorError::Read)?;

        Ok(Self { document, columns, sub_columns, rows, cells, multiline, files })
    }
}

pub struct EditorSession {
    document: Document,
    columns: Vec<Column>,
    sub_columns: Vec<SubColumn>,
    rows: Vec<Row>,
    index: CellIndex,
    multiline: Vec<MultilineData>,
    files: Vec<FileAttachment>,
    tracker: SaveTracker,
    viewer: Viewer,
    status_tx: watch::Sender<SaveStatus>,
    edit_signal: Option<mpsc::UnboundedSender<()>>,
}

impl EditorSession {
    /// Load a document for `viewer`. Nothing is returned unless every fetch
    /// succeeds.
    pub async fn load<S: Store>(
        store: &S,
        document_id: Uuid,
        viewer: Viewer,
    ) -> Result<Self, EditorError> {
        let snapshot = Snapshot::fetch(store, document_id).await?;
        if !snapshot.document.default_permissions.allows(Action::Read, viewer) {
            return Err(EditorError::forbidden(
                Action::Read,
                format!("document {}", snapshot.document.name),
            ));
        }

        let (status_tx, _) = watch::channel(SaveStatus::Saved);
        let mut session = Self {
            document: snapshot.document,
            columns: Vec::new(),
            sub_columns: Vec::new(),
            rows: Vec::new(),
            index: CellIndex::default(),
            multiline: Vec::new(),
            files: Vec::new(),
            tracker: SaveTracker::new(),
            viewer,
            status_tx,
            edit_signal: None,
        };
        session.install(snapshot.columns, snapshot.sub_columns, snapshot.rows, snapshot.cells);
        session.multiline = snapshot.multiline;
        session.files = snapshot.files;
        session.tracker.hydrate();
        session.publish();

        debug!(
            document_id = %document_id,
            columns = session.columns.len(),
            rows = session.rows.len(),
            cells = session.index.len(),
            "document loaded"
        );
        Ok(session)
    }

    /// Re-hydrate from the store after a structural change. On failure the
    /// current state is kept.
    pub async fn reload<S: Store>(&mut self, store: &S) -> Result<(), EditorError> {
        let snapshot = Snapshot::fetch(store, self.document.id).await?;
        self.document = snapshot.document;
        self.install(snapshot.columns, snapshot.sub_columns, snapshot.rows, snapshot.cells);
        self.multiline = snapshot.multiline;
        self.files = snapshot.files;
        self.tracker.hydrate();
        self.publish();
        Ok(())
    }

    fn install(
        &mut self,
        columns: Vec<Column>,
        sub_columns: Vec<SubColumn>,
        rows: Vec<Row>,
        cells: Vec<CellData>,
    ) {
        self.columns = columns;
        self.sub_columns = sub_columns;
        self.rows = rows;
        self.index = CellIndex::build(cells);
    }

    pub(crate) fn attach_autosave(&mut self, signal: mpsc::UnboundedSender<()>) {
        self.edit_signal = Some(signal);
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, column_id: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    /// Columns the viewer may read, in display order.
    pub fn visible_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| self.can(Action::Read, c)).collect()
    }

    /// Sub-columns of `column_id` in display order.
    pub fn sub_columns(&self, column_id: Uuid) -> Vec<&SubColumn> {
        self.sub_columns.iter().filter(|s| s.parent_column_id == column_id).collect()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn index(&self) -> &CellIndex {
        &self.index
    }

    pub fn cell(&self, row_id: Uuid, column_id: Uuid) -> Option<&CellData> {
        self.index.get(row_id, column_id)
    }

    /// Multiline entries of a cell grouped by record position.
    pub fn multiline_records(&self, cell_id: Uuid) -> BTreeMap<i32, Vec<&MultilineData>> {
        let mut records: BTreeMap<i32, Vec<&MultilineData>> = BTreeMap::new();
        for entry in self.multiline.iter().filter(|m| m.cell_id == cell_id) {
            records.entry(entry.order_index).or_default().push(entry);
        }
        records
    }

    pub fn files_for(&self, target: AttachmentTarget) -> Vec<&FileAttachment> {
        self.files.iter().filter(|f| f.target == target).collect()
    }

    pub fn status(&self) -> SaveStatus {
        self.tracker.status()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.tracker.last_error()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status_tx.subscribe()
    }

    pub fn can(&self, action: Action, column: &Column) -> bool {
        column.effective_permissions(&self.document).allows(action, self.viewer)
    }

    // ── Views ──────────────────────────────────────────────────────

    /// Rows matching `query`, restricted to what the viewer can read.
    /// Filters and sorts on unreadable columns are ignored.
    pub fn view(&self, query: &ViewQuery) -> Vec<&Row> {
        let visible: Vec<Column> = self.visible_columns().into_iter().cloned().collect();
        let readable = |id: Uuid| visible.iter().any(|c| c.id == id);
        let scoped = ViewQuery {
            search: query.search.clone(),
            filters: query.filters.iter().filter(|f| readable(f.column_id)).cloned().collect(),
            sort: query.sort.filter(|s| readable(s.column_id)),
        };
        apply_view(&self.rows, &self.index, &visible, &scoped)
    }

    // ── Edits ──────────────────────────────────────────────────────

    fn writable_column(&self, column_id: Uuid) -> Result<&Column, EditorError> {
        let column =
            self.column(column_id).ok_or(ValidationError::UnknownColumn(column_id))?;
        if !self.can(Action::Write, column) {
            return Err(EditorError::forbidden(Action::Write, format!("column {}", column.label)));
        }
        Ok(column)
    }

    fn require_row(&self, row_id: Uuid) -> Result<(), EditorError> {
        if self.rows.iter().any(|r| r.id == row_id) {
            Ok(())
        } else {
            Err(ValidationError::UnknownRow(row_id).into())
        }
    }

    /// Set the value at (row, column). Creates the cell when absent.
    pub fn set_cell(
        &mut self,
        row_id: Uuid,
        column_id: Uuid,
        value: CellValue,
    ) -> Result<(), EditorError> {
        self.require_row(row_id)?;
        let column = self.writable_column(column_id)?;
        if value.data_type() != column.data_type {
            return Err(ValidationError::TypeMismatch {
                column_id,
                expected: column.data_type,
                actual: value.data_type(),
            }
            .into());
        }

        match self.index.get_mut(row_id, column_id) {
            Some(cell) if cell.value == value => return Ok(()),
            Some(cell) => cell.value = value,
            None => self.index.insert(CellData::new(row_id, column_id, value)),
        }
        self.mark_edited();
        Ok(())
    }

    /// Parse `input` as the column's type and set it.
    pub fn set_cell_input(
        &mut self,
        row_id: Uuid,
        column_id: Uuid,
        input: &str,
    ) -> Result<(), EditorError> {
        let data_type = self.writable_column(column_id)?.data_type;
        let value = CellValue::parse(data_type, input).ok_or_else(|| {
            ValidationError::Unparseable { input: input.to_string(), expected: data_type }
        })?;
        self.set_cell(row_id, column_id, value)
    }

    fn multiline_column(&self, column_id: Uuid) -> Result<&Column, EditorError> {
        let column = self.writable_column(column_id)?;
        if column.data_type != DataType::Multiline {
            return Err(ValidationError::NotMultiline(column_id).into());
        }
        Ok(column)
    }

    /// The container cell at (row, column), created on demand.
    fn container_cell(&mut self, row_id: Uuid, column_id: Uuid) -> Uuid {
        if let Some(cell) = self.index.get(row_id, column_id) {
            return cell.id;
        }
        let cell = CellData::new(row_id, column_id, CellValue::Multiline);
        let id = cell.id;
        self.index.insert(cell);
        id
    }

    /// Append an empty record to a multiline cell. Returns its position.
    pub fn add_multiline_record(
        &mut self,
        row_id: Uuid,
        column_id: Uuid,
    ) -> Result<i32, EditorError> {
        self.require_row(row_id)?;
        self.multiline_column(column_id)?;

        let cell_id = self.container_cell(row_id, column_id);
        let order_index = validation::next_order_index(
            self.multiline.iter().filter(|m| m.cell_id == cell_id).map(|m| m.order_index),
        );
        let fields: Vec<MultilineData> = self
            .sub_columns(column_id)
            .into_iter()
            .filter_map(|sub| {
                let value = CellValue::empty(sub.data_type)?;
                Some(MultilineData::new(cell_id, sub.id, order_index, value))
            })
            .collect();
        self.multiline.extend(fields);
        self.mark_edited();
        Ok(order_index)
    }

    /// Set one field of one multiline record.
    pub fn set_multiline_value(
        &mut self,
        row_id: Uuid,
        column_id: Uuid,
        order_index: i32,
        sub_column_id: Uuid,
        value: CellValue,
    ) -> Result<(), EditorError> {
        self.require_row(row_id)?;
        self.multiline_column(column_id)?;
        let sub = self
            .sub_columns
            .iter()
            .find(|s| s.id == sub_column_id && s.parent_column_id == column_id)
            .ok_or(ValidationError::UnknownSubColumn(sub_column_id))?;
        if value.data_type() != sub.data_type {
            return Err(ValidationError::TypeMismatch {
                column_id: sub_column_id,
                expected: sub.data_type,
                actual: value.data_type(),
            }
            .into());
        }

        let cell_id = self.container_cell(row_id, column_id);
        let existing = self.multiline.iter_mut().find(|m| {
            m.cell_id == cell_id && m.sub_column_id == sub_column_id && m.order_index == order_index
        });
        match existing {
            Some(entry) if entry.value == value => return Ok(()),
            Some(entry) => entry.value = value,
            None => self
                .multiline
                .push(MultilineData::new(cell_id, sub_column_id, order_index, value)),
        }
        self.mark_edited();
        Ok(())
    }

    fn mark_edited(&mut self) {
        if self.tracker.mark_edited() {
            if let Some(signal) = &self.edit_signal {
                // The receiver only goes away once the editor is closing.
                let _ = signal.send(());
            }
        }
        self.publish();
    }

    // ── Flush hooks ────────────────────────────────────────────────

    /// Enter `saving` and serialize everything in memory. `None` while a
    /// flush is already running.
    pub(crate) fn begin_flush(&mut self) -> Option<FlushBatch> {
        if !self.tracker.begin_save() {
            return None;
        }
        self.publish();
        Some(FlushBatch {
            cells: self.index.cells().iter().map(CellRecord::from).collect(),
            multiline: self.multiline.iter().map(MultilineRecord::from).collect(),
        })
    }

    pub(crate) fn complete_flush(&mut self, outcome: Result<(), String>) {
        self.tracker.finish_save(outcome);
        self.publish();
    }

    fn publish(&self) {
        let status = self.tracker.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
