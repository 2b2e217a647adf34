use std::collections::HashMap;

use griddoc_common::{
    validation, Column, DataType, Permissions, SubColumn, ValidationError,
};
use griddoc_store::{CascadeReport, Store};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{copy_cells, require_document, write_copies};
use crate::error::EditorError;

/// A column to append.
#[derive(Debug, Clone)]
pub struct NewColumn {
    pub label: String,
    pub data_type: DataType,
    /// Choices for select columns; ignored for other types.
    pub options: Vec<String>,
}

impl NewColumn {
    pub fn new(label: impl Into<String>, data_type: DataType) -> Self {
        Self { label: label.into(), data_type, options: Vec::new() }
    }

    pub fn with_options<I, T>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

/// Column fields to change. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ColumnPatch {
    pub label: Option<String>,
    pub width: Option<i32>,
    pub background_color: Option<Option<String>>,
    pub text_color: Option<Option<String>>,
    pub config: Option<serde_json::Value>,
    /// `Some(None)` falls back to the document's permissions.
    pub permissions: Option<Option<Permissions>>,
}

async fn find_column<S: Store>(
    store: &S,
    document_id: Uuid,
    column_id: Uuid,
) -> Result<(Column, Vec<Column>), EditorError> {
    let columns = store.fetch_columns(document_id).await.map_err(EditorError::Read)?;
    let column = columns
        .iter()
        .find(|c| c.id == column_id)
        .cloned()
        .ok_or(ValidationError::UnknownColumn(column_id))?;
    Ok((column, columns))
}

/// Append a column at `max(order_index) + 1`.
pub async fn add_column<S: Store>(
    store: &S,
    document_id: Uuid,
    new: NewColumn,
) -> Result<Column, EditorError> {
    let label = validation::label(&new.label)?;
    require_document(store, document_id).await?;
    let existing = store.fetch_columns(document_id).await.map_err(EditorError::Read)?;
    let order_index = validation::next_order_index(existing.iter().map(|c| c.order_index));

    let mut column = Column::new(document_id, label, new.data_type, order_index);
    if new.data_type == DataType::Select && !new.options.is_empty() {
        column.config = json!({ "options": new.options });
    }
    store.upsert_columns(std::slice::from_ref(&column)).await.map_err(EditorError::Write)?;
    info!(
        document_id = %document_id,
        column_id = %column.id,
        data_type = %column.data_type,
        order_index,
        "column added"
    );
    Ok(column)
}

/// Change display fields of a column. The full record is written back.
pub async fn update_column<S: Store>(
    store: &S,
    document_id: Uuid,
    column_id: Uuid,
    patch: ColumnPatch,
) -> Result<Column, EditorError> {
    let label = patch.label.as_deref().map(validation::label).transpose()?;
    let (mut column, _) = find_column(store, document_id, column_id).await?;

    if let Some(label) = label {
        column.label = label;
    }
    if let Some(width) = patch.width {
        column.width = width;
    }
    if let Some(color) = patch.background_color {
        column.background_color = color;
    }
    if let Some(color) = patch.text_color {
        column.text_color = color;
    }
    if let Some(config) = patch.config {
        column.config = config;
    }
    if let Some(permissions) = patch.permissions {
        column.permissions = permissions;
    }

    store.upsert_columns(std::slice::from_ref(&column)).await.map_err(EditorError::Write)?;
    info!(document_id = %document_id, column_id = %column_id, "column updated");
    Ok(column)
}

/// Rewrite every column's `order_index` to its position in `ordering`.
///
/// `ordering` must list each current column exactly once. Only the order
/// changes; every other field is written back as stored.
pub async fn reorder_columns<S: Store>(
    store: &S,
    document_id: Uuid,
    ordering: &[Uuid],
) -> Result<Vec<Column>, EditorError> {
    let columns = store.fetch_columns(document_id).await.map_err(EditorError::Read)?;
    let current: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
    validation::permutation(&current, ordering)?;

    let mut by_id: HashMap<Uuid, Column> = columns.into_iter().map(|c| (c.id, c)).collect();
    let mut reordered = Vec::with_capacity(ordering.len());
    for (position, id) in ordering.iter().enumerate() {
        if let Some(mut column) = by_id.remove(id) {
            column.order_index = position as i32;
            reordered.push(column);
        }
    }

    store.upsert_columns(&reordered).await.map_err(EditorError::Write)?;
    info!(document_id = %document_id, columns = reordered.len(), "columns reordered");
    Ok(reordered)
}

pub async fn delete_column<S: Store>(
    store: &S,
    document_id: Uuid,
    column_id: Uuid,
) -> Result<CascadeReport, EditorError> {
    find_column(store, document_id, column_id).await?;
    let report = store.delete_column(column_id).await.map_err(EditorError::Write)?;
    info!(
        column_id = %column_id,
        cells = report.cells,
        multiline = report.multiline,
        files = report.files.len(),
        "column deleted"
    );
    Ok(report)
}

/// Copy a column right after its source, with its sub-columns and every
/// row's value. Later columns move up by one.
pub async fn duplicate_column<S: Store>(
    store: &S,
    document_id: Uuid,
    column_id: Uuid,
) -> Result<Column, EditorError> {
    let (source, columns) = find_column(store, document_id, column_id).await?;

    let shifted: Vec<Column> = columns
        .into_iter()
        .filter(|c| c.order_index > source.order_index)
        .map(|mut c| {
            c.order_index += 1;
            c
        })
        .collect();

    let mut copy = source.clone();
    copy.id = Uuid::new_v4();
    copy.label = format!("{} (copy)", source.label);
    copy.order_index = source.order_index + 1;

    let mut sub_column_map = HashMap::new();
    let sub_columns: Vec<SubColumn> = store
        .fetch_sub_columns(&[source.id])
        .await
        .map_err(EditorError::Read)?
        .into_iter()
        .map(|mut sub| {
            let id = Uuid::new_v4();
            sub_column_map.insert(sub.id, id);
            sub.id = id;
            sub.parent_column_id = copy.id;
            sub
        })
        .collect();

    let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;
    let row_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let cells = store.fetch_cells_by_row_ids(&row_ids).await.map_err(EditorError::Read)?;
    let (cells, multiline) = copy_cells(store, &cells, &sub_column_map, |cell| {
        (cell.column_id == source.id).then_some((cell.row_id, copy.id))
    })
    .await?;

    if !shifted.is_empty() {
        store.upsert_columns(&shifted).await.map_err(EditorError::Write)?;
    }
    store.upsert_columns(std::slice::from_ref(&copy)).await.map_err(EditorError::Write)?;
    if !sub_columns.is_empty() {
        store.upsert_sub_columns(&sub_columns).await.map_err(EditorError::Write)?;
    }
    write_copies(store, &cells, &multiline).await?;

    info!(
        document_id = %document_id,
        source_id = %column_id,
        column_id = %copy.id,
        cells = cells.len(),
        "column duplicated"
    );
    Ok(copy)
}

/// Append a field to a multiline column.
pub async fn add_sub_column<S: Store>(
    store: &S,
    document_id: Uuid,
    parent_column_id: Uuid,
    label: &str,
    data_type: DataType,
) -> Result<SubColumn, EditorError> {
    let label = validation::label(label)?;
    if data_type == DataType::Multiline {
        return Err(ValidationError::NestedContainer(data_type).into());
    }
    let (parent, _) = find_column(store, document_id, parent_column_id).await?;
    if parent.data_type != DataType::Multiline {
        return Err(ValidationError::NotMultiline(parent_column_id).into());
    }

    let existing =
        store.fetch_sub_columns(&[parent_column_id]).await.map_err(EditorError::Read)?;
    let order_index = validation::next_order_index(existing.iter().map(|s| s.order_index));
    let sub = SubColumn::new(parent_column_id, label, data_type, order_index);
    store.upsert_sub_columns(std::slice::from_ref(&sub)).await.map_err(EditorError::Write)?;
    info!(column_id = %parent_column_id, sub_column_id = %sub.id, "sub-column added");
    Ok(sub)
}

pub async fn delete_sub_column<S: Store>(
    store: &S,
    document_id: Uuid,
    sub_column_id: Uuid,
) -> Result<CascadeReport, EditorError> {
    let columns = store.fetch_columns(document_id).await.map_err(EditorError::Read)?;
    let parents: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
    let subs = if parents.is_empty() {
        Vec::new()
    } else {
        store.fetch_sub_columns(&parents).await.map_err(EditorError::Read)?
    };
    if !subs.iter().any(|sub| sub.id == sub_column_id) {
        return Err(ValidationError::UnknownSubColumn(sub_column_id).into());
    }
    let report = store.delete_sub_column(sub_column_id).await.map_err(EditorError::Write)?;
    info!(sub_column_id = %sub_column_id, multiline = report.multiline, "sub-column deleted");
    Ok(report)
}
