use chrono::Utc;
use griddoc_common::{validation, AttachmentTarget, FileAttachment, ValidationError};
use griddoc_store::{CascadeReport, Store};
use tracing::info;
use uuid::Uuid;

use super::document_cell_ids;
use crate::error::EditorError;

/// Remove every field of the record at `order_index` inside a multiline
/// cell, along with attachments hanging off those fields.
pub async fn remove_multiline_record<S: Store>(
    store: &S,
    document_id: Uuid,
    cell_id: Uuid,
    order_index: i32,
) -> Result<CascadeReport, EditorError> {
    let (cells, _) = document_cell_ids(store, document_id).await?;
    if !cells.contains(&cell_id) {
        return Err(ValidationError::UnknownCell(cell_id).into());
    }
    let ids: Vec<Uuid> = store
        .fetch_multiline_by_cell_ids(&[cell_id])
        .await
        .map_err(EditorError::Read)?
        .into_iter()
        .filter(|entry| entry.order_index == order_index)
        .map(|entry| entry.id)
        .collect();
    if ids.is_empty() {
        return Ok(CascadeReport::default());
    }

    let report = store.delete_multiline(&ids).await.map_err(EditorError::Write)?;
    info!(cell_id = %cell_id, order_index, multiline = report.multiline, "multiline record removed");
    Ok(report)
}

/// Metadata for a file already uploaded to blob storage.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub target: AttachmentTarget,
    pub storage_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
}

/// Record an attachment after the target's existing ones.
pub async fn attach_file<S: Store>(
    store: &S,
    document_id: Uuid,
    new: NewAttachment,
) -> Result<FileAttachment, EditorError> {
    let file_name = validation::label(&new.file_name)?;
    let (cells, entries) = document_cell_ids(store, document_id).await?;
    let (id, known) = match new.target {
        AttachmentTarget::Cell(id) => (id, cells.contains(&id)),
        AttachmentTarget::Multiline(id) => (id, entries.contains(&id)),
    };
    if !known {
        return Err(ValidationError::UnknownCell(id).into());
    }
    let existing = match new.target {
        AttachmentTarget::Cell(id) => store.fetch_files(&[id], &[]).await,
        AttachmentTarget::Multiline(id) => store.fetch_files(&[], &[id]).await,
    }
    .map_err(EditorError::Read)?;

    let file = FileAttachment {
        id: Uuid::new_v4(),
        target: new.target,
        storage_path: new.storage_path,
        file_name,
        mime_type: new.mime_type,
        size_bytes: new.size_bytes,
        uploaded_by: new.uploaded_by,
        uploaded_at: Utc::now(),
        order_index: validation::next_order_index(existing.iter().map(|f| f.order_index)),
    };
    store.insert_file(&file).await.map_err(EditorError::Write)?;
    info!(file_id = %file.id, target = ?file.target, size_bytes = file.size_bytes, "file attached");
    Ok(file)
}

/// Drop an attachment record. The returned report carries its storage path.
pub async fn detach_file<S: Store>(
    store: &S,
    document_id: Uuid,
    file_id: Uuid,
) -> Result<CascadeReport, EditorError> {
    let (cells, entries) = document_cell_ids(store, document_id).await?;
    let files = if cells.is_empty() {
        Vec::new()
    } else {
        store.fetch_files(&cells, &entries).await.map_err(EditorError::Read)?
    };
    if !files.iter().any(|file| file.id == file_id) {
        return Err(ValidationError::UnknownFile(file_id).into());
    }
    let report = store.delete_file(file_id).await.map_err(EditorError::Write)?;
    info!(file_id = %file_id, "file detached");
    Ok(report)
}
