// griddoc-store: the remote data store contract plus its in-memory and
// Postgres backends.
//
// The store is the only place cascading deletes happen. Each structural
// delete runs as one atomic unit (a single write lock for the memory
// backend, a single transaction for Postgres).

use std::future::Future;

use griddoc_common::{
    CellRecord, Column, Document, FileAttachment, MultilineRecord, Row, SubColumn,
};
use serde::Serialize;
use uuid::Uuid;

pub mod db;
pub mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// What a cascading delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub documents: usize,
    pub columns: usize,
    pub sub_columns: usize,
    pub rows: usize,
    pub cells: usize,
    pub multiline: usize,
    /// Storage paths of removed attachments, for blob cleanup by the caller.
    pub files: Vec<String>,
}

/// Remote data store contract.
///
/// All methods return `Send` futures so editor sessions can drive them from
/// spawned tasks. Upserts are keyed by primary id (insert or replace).
pub trait Store: Send + Sync + 'static {
    /// Active documents, pinned first, then most recently updated.
    fn list_documents(&self) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    fn fetch_document(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Columns of a document ordered by `order_index`.
    fn fetch_columns(
        &self,
        document_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Column>, StoreError>> + Send;

    /// Sub-columns of the given parent columns ordered by `order_index`.
    fn fetch_sub_columns(
        &self,
        column_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<SubColumn>, StoreError>> + Send;

    /// Rows of a document ordered by `order_index`.
    fn fetch_rows(
        &self,
        document_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Row>, StoreError>> + Send;

    fn fetch_cells_by_row_ids(
        &self,
        row_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<CellRecord>, StoreError>> + Send;

    fn fetch_multiline_by_cell_ids(
        &self,
        cell_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<MultilineRecord>, StoreError>> + Send;

    /// Attachments hanging off any of the given cells or multiline entries.
    fn fetch_files(
        &self,
        cell_ids: &[Uuid],
        multiline_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<FileAttachment>, StoreError>> + Send;

    fn upsert_document(
        &self,
        document: &Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn upsert_columns(
        &self,
        columns: &[Column],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn upsert_sub_columns(
        &self,
        sub_columns: &[SubColumn],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn upsert_rows(&self, rows: &[Row]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Batch upsert. At most one cell may exist per (row, column).
    fn upsert_cells(
        &self,
        cells: &[CellRecord],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn upsert_multiline(
        &self,
        records: &[MultilineRecord],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn insert_file(
        &self,
        file: &FileAttachment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_document(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    fn delete_column(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    fn delete_sub_column(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    fn delete_row(&self, id: Uuid)
        -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    /// Delete multiline entries (and their attachments).
    fn delete_multiline(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;

    fn delete_file(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<CascadeReport, StoreError>> + Send;
}
