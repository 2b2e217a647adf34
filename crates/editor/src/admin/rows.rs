use std::collections::HashMap;

use chrono::Utc;
use griddoc_common::{validation, Row, ValidationError};
use griddoc_store::{CascadeReport, Store};
use tracing::info;
use uuid::Uuid;

use super::{copy_cells, require_document, write_copies};
use crate::error::EditorError;

/// Append an empty row at `max(order_index) + 1`.
pub async fn add_row<S: Store>(
    store: &S,
    document_id: Uuid,
    author: Option<Uuid>,
) -> Result<Row, EditorError> {
    require_document(store, document_id).await?;
    let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;
    let order_index = validation::next_order_index(rows.iter().map(|r| r.order_index));
    let row = Row::new(document_id, order_index, author);
    store.upsert_rows(std::slice::from_ref(&row)).await.map_err(EditorError::Write)?;
    info!(document_id = %document_id, row_id = %row.id, order_index, "row added");
    Ok(row)
}

pub async fn delete_row<S: Store>(
    store: &S,
    document_id: Uuid,
    row_id: Uuid,
) -> Result<CascadeReport, EditorError> {
    let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;
    if !rows.iter().any(|row| row.id == row_id) {
        return Err(ValidationError::UnknownRow(row_id).into());
    }
    let report = store.delete_row(row_id).await.map_err(EditorError::Write)?;
    info!(row_id = %row_id, cells = report.cells, files = report.files.len(), "row deleted");
    Ok(report)
}

/// Copy a row with all its values directly below the source. Later rows
/// move down by one.
pub async fn duplicate_row<S: Store>(
    store: &S,
    document_id: Uuid,
    row_id: Uuid,
    author: Option<Uuid>,
) -> Result<Row, EditorError> {
    let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;
    let source = rows
        .iter()
        .find(|r| r.id == row_id)
        .cloned()
        .ok_or(ValidationError::UnknownRow(row_id))?;

    let now = Utc::now();
    let copy = Row::new(document_id, source.order_index + 1, author);
    let mut updates: Vec<Row> = rows
        .into_iter()
        .filter(|r| r.order_index > source.order_index)
        .map(|mut r| {
            r.order_index += 1;
            r.updated_at = now;
            r
        })
        .collect();
    updates.push(copy.clone());

    let cells = store.fetch_cells_by_row_ids(&[source.id]).await.map_err(EditorError::Read)?;
    let (cells, multiline) =
        copy_cells(store, &cells, &HashMap::new(), |cell| Some((copy.id, cell.column_id))).await?;

    store.upsert_rows(&updates).await.map_err(EditorError::Write)?;
    write_copies(store, &cells, &multiline).await?;

    info!(
        document_id = %document_id,
        source_id = %row_id,
        row_id = %copy.id,
        cells = cells.len(),
        multiline = multiline.len(),
        "row duplicated"
    );
    Ok(copy)
}
