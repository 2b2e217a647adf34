use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use griddoc_common::{validation, Action, Document, Permissions, Viewer};
use griddoc_store::{CascadeReport, Store};
use tracing::{info, warn};
use uuid::Uuid;

use super::{copy_cells, require_document, write_copies};
use crate::error::EditorError;

/// Active documents, pinned first, then most recently updated.
pub async fn list_documents<S: Store>(store: &S) -> Result<Vec<Document>, EditorError> {
    store.list_documents().await.map_err(EditorError::Read)
}

pub async fn create_document<S: Store>(
    store: &S,
    name: &str,
    owner: Option<Uuid>,
) -> Result<Document, EditorError> {
    let document = Document::new(validation::document_name(name)?, owner);
    store.upsert_document(&document).await.map_err(EditorError::Write)?;
    info!(document_id = %document.id, name = %document.name, "document created");
    Ok(document)
}

/// Fields to change on a document. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub theme: Option<BTreeMap<String, String>>,
    pub default_permissions: Option<Permissions>,
    pub is_active: Option<bool>,
}

pub async fn update_document<S: Store>(
    store: &S,
    document_id: Uuid,
    patch: DocumentPatch,
) -> Result<Document, EditorError> {
    let name = patch.name.as_deref().map(validation::document_name).transpose()?;
    let mut document = require_document(store, document_id).await?;

    if let Some(name) = name {
        document.name = name;
    }
    if let Some(description) = patch.description {
        document.description = description;
    }
    if let Some(theme) = patch.theme {
        document.theme = theme;
    }
    if let Some(permissions) = patch.default_permissions {
        document.default_permissions = permissions;
    }
    if let Some(active) = patch.is_active {
        document.is_active = active;
    }
    document.updated_at = Utc::now();

    store.upsert_document(&document).await.map_err(EditorError::Write)?;
    info!(document_id = %document_id, "document updated");
    Ok(document)
}

pub async fn rename_document<S: Store>(
    store: &S,
    document_id: Uuid,
    name: &str,
) -> Result<Document, EditorError> {
    let patch = DocumentPatch { name: Some(name.to_string()), ..DocumentPatch::default() };
    update_document(store, document_id, patch).await
}

/// Persist the pin flag, then return the stored document.
pub async fn set_pinned<S: Store>(
    store: &S,
    document_id: Uuid,
    pinned: bool,
) -> Result<Document, EditorError> {
    let mut document = require_document(store, document_id).await?;
    document.is_pinned = pinned;
    store.upsert_document(&document).await.map_err(EditorError::Write)?;
    info!(document_id = %document_id, pinned, "document pin changed");
    Ok(document)
}

/// Copy a document as `"<name> (copy)"`, unpinned.
///
/// With `include_data` the columns, sub-columns, rows, cells and multiline
/// entries are copied too, all under fresh ids. Attachments are not copied.
pub async fn duplicate_document<S: Store>(
    store: &S,
    document_id: Uuid,
    include_data: bool,
    owner: Option<Uuid>,
) -> Result<Document, EditorError> {
    let source = require_document(store, document_id).await?;
    let mut copy = Document::new(format!("{} (copy)", source.name), owner);
    copy.description = source.description.clone();
    copy.default_permissions = source.default_permissions.clone();
    copy.theme = source.theme.clone();

    if !include_data {
        store.upsert_document(&copy).await.map_err(EditorError::Write)?;
        info!(source_id = %document_id, document_id = %copy.id, "document duplicated");
        return Ok(copy);
    }

    let columns = store.fetch_columns(document_id).await.map_err(EditorError::Read)?;
    let column_ids: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
    let sub_columns = store.fetch_sub_columns(&column_ids).await.map_err(EditorError::Read)?;
    let rows = store.fetch_rows(document_id).await.map_err(EditorError::Read)?;
    let row_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let cells = store.fetch_cells_by_row_ids(&row_ids).await.map_err(EditorError::Read)?;

    let mut column_map = HashMap::new();
    let columns: Vec<_> = columns
        .into_iter()
        .map(|mut column| {
            let id = Uuid::new_v4();
            column_map.insert(column.id, id);
            column.id = id;
            column.document_id = copy.id;
            column
        })
        .collect();

    let mut sub_column_map = HashMap::new();
    let sub_columns: Vec<_> = sub_columns
        .into_iter()
        .filter_map(|mut sub| {
            let parent = *column_map.get(&sub.parent_column_id)?;
            let id = Uuid::new_v4();
            sub_column_map.insert(sub.id, id);
            sub.id = id;
            sub.parent_column_id = parent;
            Some(sub)
        })
        .collect();

    let now = Utc::now();
    let mut row_map = HashMap::new();
    let rows: Vec<_> = rows
        .into_iter()
        .map(|mut row| {
            let id = Uuid::new_v4();
            row_map.insert(row.id, id);
            row.id = id;
            row.document_id = copy.id;
            row.created_at = now;
            row.updated_at = now;
            row.created_by = owner;
            row.updated_by = owner;
            row
        })
        .collect();

    let (cells, multiline) = copy_cells(store, &cells, &sub_column_map, |cell| {
        Some((*row_map.get(&cell.row_id)?, *column_map.get(&cell.column_id)?))
    })
    .await?;

    store.upsert_document(&copy).await.map_err(EditorError::Write)?;
    if !columns.is_empty() {
        store.upsert_columns(&columns).await.map_err(EditorError::Write)?;
    }
    if !sub_columns.is_empty() {
        store.upsert_sub_columns(&sub_columns).await.map_err(EditorError::Write)?;
    }
    if !rows.is_empty() {
        store.upsert_rows(&rows).await.map_err(EditorError::Write)?;
    }
    write_copies(store, &cells, &multiline).await?;

    info!(
        source_id = %document_id,
        document_id = %copy.id,
        columns = columns.len(),
        rows = rows.len(),
        cells = cells.len(),
        "document duplicated with data"
    );
    Ok(copy)
}

/// Delete a document and everything under it. Requires the document's
/// `delete` audience.
pub async fn delete_document<S: Store>(
    store: &S,
    document_id: Uuid,
    viewer: Viewer,
) -> Result<CascadeReport, EditorError> {
    let document = require_document(store, document_id).await?;
    if !document.default_permissions.allows(Action::Delete, viewer) {
        return Err(EditorError::forbidden(Action::Delete, format!("document {}", document.name)));
    }
    let report = store.delete_document(document_id).await.map_err(EditorError::Write)?;
    info!(
        document_id = %document_id,
        columns = report.columns,
        rows = report.rows,
        cells = report.cells,
        files = report.files.len(),
        "document deleted"
    );
    Ok(report)
}

// ── Document list ──────────────────────────────────────────────────

/// The document list as shown to a user, with optimistic pinning.
#[derive(Debug, Clone, Default)]
pub struct DocumentList {
    documents: Vec<Document>,
}

impl DocumentList {
    pub async fn load<S: Store>(store: &S) -> Result<Self, EditorError> {
        let mut list = Self { documents: list_documents(store).await? };
        list.sort();
        Ok(list)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, document_id: Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == document_id)
    }

    /// Apply the pin flag locally, then persist it. On store failure the
    /// list is restored to its state before the call.
    pub async fn set_pinned<S: Store>(
        &mut self,
        store: &S,
        document_id: Uuid,
        pinned: bool,
    ) -> Result<(), EditorError> {
        let snapshot = self.documents.clone();
        let document = self
            .documents
            .iter_mut()
            .find(|d| d.id == document_id)
            .ok_or(EditorError::DocumentNotFound(document_id))?;
        document.is_pinned = pinned;
        let updated = document.clone();
        self.sort();

        match store.upsert_document(&updated).await {
            Ok(()) => {
                info!(document_id = %document_id, pinned, "document pin changed");
                Ok(())
            }
            Err(error) => {
                warn!(document_id = %document_id, error = %error, "pin failed, rolling back");
                self.documents = snapshot;
                Err(EditorError::Write(error))
            }
        }
    }

    /// Flip the pin flag. Returns the new value.
    pub async fn toggle_pin<S: Store>(
        &mut self,
        store: &S,
        document_id: Uuid,
    ) -> Result<bool, EditorError> {
        let pinned = !self
            .get(document_id)
            .ok_or(EditorError::DocumentNotFound(document_id))?
            .is_pinned;
        self.set_pinned(store, document_id, pinned).await?;
        Ok(pinned)
    }

    fn sort(&mut self) {
        self.documents.sort_by_key(|d| (!d.is_pinned, Reverse(d.updated_at)));
    }
}

#[cfg(test)]
mod tests {
    use griddoc_common::Audience;
    use griddoc_store::MemoryStore;

    use super::*;
    use crate::error::EditorError;
    use griddoc_common::ValidationError;

    #[tokio::test]
    async fn create_trims_and_rejects_blank_names() {
        let store = MemoryStore::new();
        let document = create_document(&store, "  Stock  ", None).await.unwrap();
        assert_eq!(document.name, "Stock");

        let error = create_document(&store, "   ", None).await.unwrap_err();
        assert!(matches!(error, EditorError::Validation(ValidationError::EmptyName)));
        assert_eq!(list_documents(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_persists() {
        let store = MemoryStore::new();
        let document = create_document(&store, "Stock", None).await.unwrap();
        rename_document(&store, document.id, "Inventory").await.unwrap();
        let stored = store.fetch_document(document.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Inventory");
    }

    #[tokio::test]
    async fn update_keeps_untouched_fields() {
        let store = MemoryStore::new();
        let document = create_document(&store, "Stock", None).await.unwrap();
        let patch = DocumentPatch {
            description: Some(Some("warehouse counts".into())),
            ..DocumentPatch::default()
        };
        let updated = update_document(&store, document.id, patch).await.unwrap();
        assert_eq!(updated.name, "Stock");
        assert_eq!(updated.description.as_deref(), Some("warehouse counts"));
        assert_eq!(updated.created_at, document.created_at);
    }

    #[tokio::test]
    async fn duplicate_without_data_copies_only_the_record() {
        let store = MemoryStore::new();
        let mut document = create_document(&store, "Stock", None).await.unwrap();
        document.is_pinned = true;
        store.upsert_document(&document).await.unwrap();

        let copy = duplicate_document(&store, document.id, false, None).await.unwrap();
        assert_ne!(copy.id, document.id);
        assert_eq!(copy.name, "Stock (copy)");
        assert!(!copy.is_pinned);
        assert!(store.fetch_columns(copy.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_delete_audience() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut document = create_document(&store, "Private", Some(owner)).await.unwrap();
        document.default_permissions.delete = vec![Audience::User(owner)];
        store.upsert_document(&document).await.unwrap();

        let error = delete_document(&store, document.id, Viewer::Anonymous).await.unwrap_err();
        assert!(matches!(error, EditorError::Forbidden { action: Action::Delete, .. }));

        let report = delete_document(&store, document.id, Viewer::User(owner)).await.unwrap();
        assert_eq!(report.documents, 1);
        assert!(store.fetch_document(document.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pinned_documents_sort_first() {
        let store = MemoryStore::new();
        let a = create_document(&store, "A", None).await.unwrap();
        let b = create_document(&store, "B", None).await.unwrap();

        let mut list = DocumentList::load(&store).await.unwrap();
        list.set_pinned(&store, a.id, true).await.unwrap();
        assert_eq!(list.documents()[0].id, a.id);
        assert!(store.fetch_document(a.id).await.unwrap().unwrap().is_pinned);

        assert!(!list.toggle_pin(&store, a.id).await.unwrap());
        assert!(list.documents().iter().all(|d| !d.is_pinned));
        assert!(list.get(b.id).is_some());
    }

    #[tokio::test]
    async fn failed_pin_rolls_back() {
        let store = MemoryStore::new();
        let document = create_document(&store, "Stock", None).await.unwrap();
        let mut list = DocumentList::load(&store).await.unwrap();

        store.set_fail_writes(true).await;
        let error = list.set_pinned(&store, document.id, true).await.unwrap_err();
        assert!(matches!(error, EditorError::Write(_)));
        assert!(!list.get(document.id).unwrap().is_pinned);
    }
}
