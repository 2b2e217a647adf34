// In-memory store backing tests and offline sessions.
//
// Mirrors the Postgres schema's integrity rules: referenced parents must
// exist, at most one cell per (row, column), and cascades remove every
// dependent record under a single write lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use griddoc_common::{
    AttachmentTarget, CellRecord, Column, DataType, Document, FileAttachment, MultilineRecord,
    Row, SubColumn,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CascadeReport, Store, StoreError};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<Uuid, Document>,
    columns: HashMap<Uuid, Column>,
    sub_columns: HashMap<Uuid, SubColumn>,
    rows: HashMap<Uuid, Row>,
    cells: HashMap<Uuid, CellRecord>,
    multiline: HashMap<Uuid, MultilineRecord>,
    files: HashMap<Uuid, FileAttachment>,
    faults: Faults,
    /// Size of every `upsert_cells` batch, in call order.
    cell_batches: Vec<usize>,
    /// Name of every successful write call, in call order.
    write_log: Vec<&'static str>,
}

#[derive(Default, Clone, Copy)]
struct Faults {
    fail_reads: bool,
    fail_writes: bool,
    write_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with `StoreError::Unavailable`.
    pub async fn set_fail_reads(&self, fail: bool) {
        self.inner.write().await.faults.fail_reads = fail;
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.inner.write().await.faults.fail_writes = fail;
    }

    /// Delay every write by `delay` before it touches state.
    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        self.inner.write().await.faults.write_delay = delay;
    }

    pub async fn cell_batches(&self) -> Vec<usize> {
        self.inner.read().await.cell_batches.clone()
    }

    pub async fn write_log(&self) -> Vec<&'static str> {
        self.inner.read().await.write_log.clone()
    }

    pub async fn cell_count(&self) -> usize {
        self.inner.read().await.cells.len()
    }

    pub async fn multiline_count(&self) -> usize {
        self.inner.read().await.multiline.len()
    }

    async fn read_guard(&self) -> Result<tokio::sync::RwLockReadGuard<'_, MemoryState>, StoreError> {
        let state = self.inner.read().await;
        if state.faults.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(state)
    }

    async fn write_guard(
        &self,
    ) -> Result<tokio::sync::RwLockWriteGuard<'_, MemoryState>, StoreError> {
        let faults = self.inner.read().await.faults;
        if let Some(delay) = faults.write_delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.inner.write().await;
        if state.faults.fail_writes {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(state)
    }
}

fn sorted_by_order<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (i32, Uuid),
{
    items.sort_by_key(|item| key(item));
    items
}

impl MemoryState {
    fn purge_files<F>(&mut self, mut matches: F, report: &mut CascadeReport)
    where
        F: FnMut(&AttachmentTarget) -> bool,
    {
        let doomed: Vec<Uuid> =
            self.files.values().filter(|file| matches(&file.target)).map(|file| file.id).collect();
        for id in doomed {
            if let Some(file) = self.files.remove(&id) {
                report.files.push(file.storage_path);
            }
        }
    }

    fn purge_multiline(&mut self, ids: &HashSet<Uuid>, report: &mut CascadeReport) {
        self.purge_files(
            |target| matches!(target, AttachmentTarget::Multiline(id) if ids.contains(id)),
            report,
        );
        let before = self.multiline.len();
        self.multiline.retain(|id, _| !ids.contains(id));
        report.multiline += before - self.multiline.len();
    }

    fn purge_cells(&mut self, ids: &HashSet<Uuid>, report: &mut CascadeReport) {
        let entries: HashSet<Uuid> = self
            .multiline
            .values()
            .filter(|entry| ids.contains(&entry.cell_id))
            .map(|entry| entry.id)
            .collect();
        self.purge_multiline(&entries, report);
        self.purge_files(
            |target| matches!(target, AttachmentTarget::Cell(id) if ids.contains(id)),
            report,
        );
        let before = self.cells.len();
        self.cells.retain(|id, _| !ids.contains(id));
        report.cells += before - self.cells.len();
    }

    fn purge_sub_columns(&mut self, ids: &HashSet<Uuid>, report: &mut CascadeReport) {
        let entries: HashSet<Uuid> = self
            .multiline
            .values()
            .filter(|entry| ids.contains(&entry.sub_column_id))
            .map(|entry| entry.id)
            .collect();
        self.purge_multiline(&entries, report);
        let before = self.sub_columns.len();
        self.sub_columns.retain(|id, _| !ids.contains(id));
        report.sub_columns += before - self.sub_columns.len();
    }

    fn purge_columns(&mut self, ids: &HashSet<Uuid>, report: &mut CascadeReport) {
        let cells: HashSet<Uuid> = self
            .cells
            .values()
            .filter(|cell| ids.contains(&cell.column_id))
            .map(|cell| cell.id)
            .collect();
        self.purge_cells(&cells, report);
        let subs: HashSet<Uuid> = self
            .sub_columns
            .values()
            .filter(|sub| ids.contains(&sub.parent_column_id))
            .map(|sub| sub.id)
            .collect();
        self.purge_sub_columns(&subs, report);
        let before = self.columns.len();
        self.columns.retain(|id, _| !ids.contains(id));
        report.columns += before - self.columns.len();
    }

    fn purge_rows(&mut self, ids: &HashSet<Uuid>, report: &mut CascadeReport) {
        let cells: HashSet<Uuid> = self
            .cells
            .values()
            .filter(|cell| ids.contains(&cell.row_id))
            .map(|cell| cell.id)
            .collect();
        self.purge_cells(&cells, report);
        let before = self.rows.len();
        self.rows.retain(|id, _| !ids.contains(id));
        report.rows += before - self.rows.len();
    }
}

impl Store for MemoryStore {
    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let state = self.read_guard().await?;
        let mut documents: Vec<Document> =
            state.documents.values().filter(|doc| doc.is_active).cloned().collect();
        documents.sort_by(|a, b| {
            b.is_pinned.cmp(&a.is_pinned).then(b.updated_at.cmp(&a.updated_at)).then(a.id.cmp(&b.id))
        });
        Ok(documents)
    }

    async fn fetch_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.read_guard().await?.documents.get(&id).cloned())
    }

    async fn fetch_columns(&self, document_id: Uuid) -> Result<Vec<Column>, StoreError> {
        let state = self.read_guard().await?;
        let columns =
            state.columns.values().filter(|c| c.document_id == document_id).cloned().collect();
        Ok(sorted_by_order(columns, |c: &Column| (c.order_index, c.id)))
    }

    async fn fetch_sub_columns(&self, column_ids: &[Uuid]) -> Result<Vec<SubColumn>, StoreError> {
        let state = self.read_guard().await?;
        let subs = state
            .sub_columns
            .values()
            .filter(|s| column_ids.contains(&s.parent_column_id))
            .cloned()
            .collect();
        Ok(sorted_by_order(subs, |s: &SubColumn| (s.order_index, s.id)))
    }

    async fn fetch_rows(&self, document_id: Uuid) -> Result<Vec<Row>, StoreError> {
        let state = self.read_guard().await?;
        let rows = state.rows.values().filter(|r| r.document_id == document_id).cloned().collect();
        Ok(sorted_by_order(rows, |r: &Row| (r.order_index, r.id)))
    }

    async fn fetch_cells_by_row_ids(&self, row_ids: &[Uuid]) -> Result<Vec<CellRecord>, StoreError> {
        let state = self.read_guard().await?;
        let mut cells: Vec<CellRecord> =
            state.cells.values().filter(|c| row_ids.contains(&c.row_id)).cloned().collect();
        cells.sort_by_key(|c| (c.row_id, c.column_id));
        Ok(cells)
    }

    async fn fetch_multiline_by_cell_ids(
        &self,
        cell_ids: &[Uuid],
    ) -> Result<Vec<MultilineRecord>, StoreError> {
        let state = self.read_guard().await?;
        let mut entries: Vec<MultilineRecord> =
            state.multiline.values().filter(|m| cell_ids.contains(&m.cell_id)).cloned().collect();
        entries.sort_by_key(|m| (m.cell_id, m.order_index, m.sub_column_id));
        Ok(entries)
    }

    async fn fetch_files(
        &self,
        cell_ids: &[Uuid],
        multiline_ids: &[Uuid],
    ) -> Result<Vec<FileAttachment>, StoreError> {
        let state = self.read_guard().await?;
        let files = state
            .files
            .values()
            .filter(|file| match file.target {
                AttachmentTarget::Cell(id) => cell_ids.contains(&id),
                AttachmentTarget::Multiline(id) => multiline_ids.contains(&id),
            })
            .cloned()
            .collect();
        Ok(sorted_by_order(files, |f: &FileAttachment| (f.order_index, f.id)))
    }

    async fn upsert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        state.documents.insert(document.id, document.clone());
        state.write_log.push("documents");
        Ok(())
    }

    async fn upsert_columns(&self, columns: &[Column]) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        for column in columns {
            if !state.documents.contains_key(&column.document_id) {
                return Err(StoreError::not_found("document", column.document_id));
            }
        }
        for column in columns {
            state.columns.insert(column.id, column.clone());
        }
        state.write_log.push("columns");
        Ok(())
    }

    async fn upsert_sub_columns(&self, sub_columns: &[SubColumn]) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        for sub in sub_columns {
            if !state.columns.contains_key(&sub.parent_column_id) {
                return Err(StoreError::not_found("column", sub.parent_column_id));
            }
            if sub.data_type == DataType::Multiline {
                return Err(StoreError::Conflict(format!(
                    "sub-column {} cannot be multiline",
                    sub.id
                )));
            }
        }
        for sub in sub_columns {
            state.sub_columns.insert(sub.id, sub.clone());
        }
        state.write_log.push("sub_columns");
        Ok(())
    }

    async fn upsert_rows(&self, rows: &[Row]) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        for row in rows {
            if !state.documents.contains_key(&row.document_id) {
                return Err(StoreError::not_found("document", row.document_id));
            }
        }
        for row in rows {
            state.rows.insert(row.id, row.clone());
        }
        state.write_log.push("rows");
        Ok(())
    }

    async fn upsert_cells(&self, cells: &[CellRecord]) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        let mut batch_keys = HashSet::new();
        for cell in cells {
            if !state.rows.contains_key(&cell.row_id) {
                return Err(StoreError::not_found("row", cell.row_id));
            }
            if !state.columns.contains_key(&cell.column_id) {
                return Err(StoreError::not_found("column", cell.column_id));
            }
            if let Err(error) = cell.slots.decode() {
                return Err(StoreError::Corrupt(error.to_string()));
            }
            let clash = state.cells.values().any(|existing| {
                existing.id != cell.id
                    && existing.row_id == cell.row_id
                    && existing.column_id == cell.column_id
            });
            if clash || !batch_keys.insert((cell.row_id, cell.column_id)) {
                return Err(StoreError::Conflict(format!(
                    "a cell already exists for row {} column {}",
                    cell.row_id, cell.column_id
                )));
            }
        }
        for cell in cells {
            state.cells.insert(cell.id, cell.clone());
        }
        state.cell_batches.push(cells.len());
        state.write_log.push("cells");
        Ok(())
    }

    async fn upsert_multiline(&self, records: &[MultilineRecord]) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        for record in records {
            if !state.cells.contains_key(&record.cell_id) {
                return Err(StoreError::not_found("cell", record.cell_id));
            }
            if !state.sub_columns.contains_key(&record.sub_column_id) {
                return Err(StoreError::not_found("sub-column", record.sub_column_id));
            }
            if let Err(error) = record.slots.decode() {
                return Err(StoreError::Corrupt(error.to_string()));
            }
        }
        for record in records {
            state.multiline.insert(record.id, record.clone());
        }
        state.write_log.push("multiline");
        Ok(())
    }

    async fn insert_file(&self, file: &FileAttachment) -> Result<(), StoreError> {
        let mut state = self.write_guard().await?;
        match file.target {
            AttachmentTarget::Cell(id) if !state.cells.contains_key(&id) => {
                return Err(StoreError::not_found("cell", id));
            }
            AttachmentTarget::Multiline(id) if !state.multiline.contains_key(&id) => {
                return Err(StoreError::not_found("multiline entry", id));
            }
            _ => {}
        }
        if state.files.contains_key(&file.id) {
            return Err(StoreError::Conflict(format!("file {} already exists", file.id)));
        }
        state.files.insert(file.id, file.clone());
        state.write_log.push("files");
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut state = self.write_guard().await?;
        if !state.documents.contains_key(&id) {
            return Err(StoreError::not_found("document", id));
        }
        let mut report = CascadeReport::default();
        let rows: HashSet<Uuid> =
            state.rows.values().filter(|r| r.document_id == id).map(|r| r.id).collect();
        state.purge_rows(&rows, &mut report);
        let columns: HashSet<Uuid> =
            state.columns.values().filter(|c| c.document_id == id).map(|c| c.id).collect();
        state.purge_columns(&columns, &mut report);
        state.documents.remove(&id);
        report.documents = 1;
        state.write_log.push("delete_document");
        Ok(report)
    }

    async fn delete_column(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut state = self.write_guard().await?;
        if !state.columns.contains_key(&id) {
            return Err(StoreError::not_found("column", id));
        }
        let mut report = CascadeReport::default();
        state.purge_columns(&HashSet::from([id]), &mut report);
        state.write_log.push("delete_column");
        Ok(report)
    }

    async fn delete_sub_column(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut state = self.write_guard().await?;
        if !state.sub_columns.contains_key(&id) {
            return Err(StoreError::not_found("sub-column", id));
        }
        let mut report = CascadeReport::default();
        state.purge_sub_columns(&HashSet::from([id]), &mut report);
        state.write_log.push("delete_sub_column");
        Ok(report)
    }

    async fn delete_row(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut state = self.write_guard().await?;
        if !state.rows.contains_key(&id) {
            return Err(StoreError::not_found("row", id));
        }
        let mut report = CascadeReport::default();
        state.purge_rows(&HashSet::from([id]), &mut report);
        state.write_log.push("delete_row");
        Ok(report)
    }

    async fn delete_multiline(&self, ids: &[Uuid]) -> Result<CascadeReport, StoreError> {
        let mut state = self.write_guard().await?;
        let mut report = CascadeReport::default();
        let ids: HashSet<Uuid> = ids.iter().copied().collect();
        state.purge_multiline(&ids, &mut report);
        state.write_log.push("delete_multiline");
        Ok(report)
    }

    async fn delete_file(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut state = self.write_guard().await?;
        let file = state.files.remove(&id).ok_or_else(|| StoreError::not_found("file", id))?;
        state.write_log.push("delete_file");
        Ok(CascadeReport { files: vec![file.storage_path], ..CascadeReport::default() })
    }
}
