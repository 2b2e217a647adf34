// Structural operations.
//
// Each one validates first, then talks to the store directly and returns
// what was persisted. None of them are debounced. Cascading deletes are the
// store's job; these functions only pick the target.

pub mod columns;
pub mod documents;
pub mod multiline;
pub mod rows;

use std::collections::HashMap;

use griddoc_common::{CellRecord, Document, MultilineRecord};
use griddoc_store::Store;
use uuid::Uuid;

use crate::error::EditorError;

pub use columns::{
    add_column, add_sub_column, delete_column, delete_sub_column, duplicate_column,
    reorder_columns, update_column, ColumnPatch, NewColumn,
};
pub use documents::{
    create_document, delete_document, duplicate_document, list_documents, rename_document,
    set_pinned, update_document, DocumentList, DocumentPatch,
};
pub use multiline::{attach_file, detach_file, remove_multiline_record, NewAttachment};
pub use rows::{add_row, delete_row, duplicate_row};

pub(crate) async fn require_document<S: Store>(
    store: &S,
    document_id: Uuid,
) -> Result<Document, EditorError> {
    store
        .fetch_document(document_id)
        .await
        .map_err(EditorError::Read)?
        .ok_or(EditorError::DocumentNotFound(document_id))
}

/// Ids of every cell and multiline entry stored under a document.
pub(crate) async fn document_cell_ids<S: Store>(
    store: &S,
    document_id: Uuid,
) -> Result<(Vec<Uuid>, Vec<Uuid>), EditorError> {
    let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;
    let rows: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    if rows.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let cells: Vec<Uuid> = store
        .fetch_cells_by_row_ids(&rows)
        .await
        .map_err(EditorError::Read)?
        .iter()
        .map(|cell| cell.id)
        .collect();
    if cells.is_empty() {
        return Ok((cells, Vec::new()));
    }
    let entries: Vec<Uuid> = store
        .fetch_multiline_by_cell_ids(&cells)
        .await
        .map_err(EditorError::Read)?
        .iter()
        .map(|entry| entry.id)
        .collect();
    Ok((cells, entries))
}

/// Copies of `cells` and their multiline entries under fresh ids.
///
/// `rehome` gives each copied cell its new (row, column); cells it returns
/// `None` for are skipped. `sub_columns` maps old sub-column ids to new ones
/// (identity when absent).
pub(crate) async fn copy_cells<S, F>(
    store: &S,
    cells: &[CellRecord],
    sub_columns: &HashMap<Uuid, Uuid>,
    mut rehome: F,
) -> Result<(Vec<CellRecord>, Vec<MultilineRecord>), EditorError>
where
    S: Store,
    F: FnMut(&CellRecord) -> Option<(Uuid, Uuid)>,
{
    let mut cell_ids = HashMap::new();
    let mut copies = Vec::new();
    for cell in cells {
        let Some((row_id, column_id)) = rehome(cell) else {
            continue;
        };
        let id = Uuid::new_v4();
        cell_ids.insert(cell.id, id);
        copies.push(CellRecord { id, row_id, column_id, slots: cell.slots.clone() });
    }

    let source_ids: Vec<Uuid> = cell_ids.keys().copied().collect();
    let entries = if source_ids.is_empty() {
        Vec::new()
    } else {
        store.fetch_multiline_by_cell_ids(&source_ids).await.map_err(EditorError::Read)?
    };
    let entries = entries
        .into_iter()
        .filter_map(|entry| {
            let cell_id = *cell_ids.get(&entry.cell_id)?;
            let sub_column_id =
                sub_columns.get(&entry.sub_column_id).copied().unwrap_or(entry.sub_column_id);
            Some(MultilineRecord {
                id: Uuid::new_v4(),
                cell_id,
                sub_column_id,
                order_index: entry.order_index,
                slots: entry.slots,
            })
        })
        .collect();
    Ok((copies, entries))
}

/// Persist copied cells, parents before children.
pub(crate) async fn write_copies<S: Store>(
    store: &S,
    cells: &[CellRecord],
    multiline: &[MultilineRecord],
) -> Result<(), EditorError> {
    if !cells.is_empty() {
        store.upsert_cells(cells).await.map_err(EditorError::Write)?;
    }
    if !multiline.is_empty() {
        store.upsert_multiline(multiline).await.map_err(EditorError::Write)?;
    }
    Ok(())
}
