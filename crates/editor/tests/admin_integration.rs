use std::collections::HashSet;

use griddoc_common::{
    AttachmentTarget, CellData, CellRecord, CellValue, Column, DataType, Document, MultilineData,
    MultilineRecord, Row, SubColumn, Viewer,
};
use griddoc_editor::admin::{
    attach_file, create_document, delete_document, duplicate_document, list_documents,
    set_pinned, NewAttachment,
};
use griddoc_store::{MemoryStore, Store};
use uuid::Uuid;

struct Orders {
    store: MemoryStore,
    document: Document,
    columns: Vec<Column>,
    part: SubColumn,
    rows: Vec<Row>,
    cells: Vec<CellData>,
}

async fn orders() -> Orders {
    let store = MemoryStore::new();
    let document = create_document(&store, "Orders", None).await.expect("document");
    let customer = Column::new(document.id, "Customer", DataType::Text, 0);
    let lines = Column::new(document.id, "Lines", DataType::Multiline, 1);
    let part = SubColumn::new(lines.id, "Part", DataType::Text, 0);
    let rows = vec![Row::new(document.id, 0, None), Row::new(document.id, 1, None)];
    let cells = vec![
        CellData::new(rows[0].id, customer.id, CellValue::Text("Acme".into())),
        CellData::new(rows[0].id, lines.id, CellValue::Multiline),
        CellData::new(rows[1].id, customer.id, CellValue::Text("Globex".into())),
    ];
    let entry = MultilineData::new(cells[1].id, part.id, 0, CellValue::Text("bolt".into()));

    store.upsert_columns(&[customer.clone(), lines.clone()]).await.expect("columns");
    store.upsert_sub_columns(std::slice::from_ref(&part)).await.expect("sub-columns");
    store.upsert_rows(&rows).await.expect("rows");
    let records: Vec<CellRecord> = cells.iter().map(CellRecord::from).collect();
    store.upsert_cells(&records).await.expect("cells");
    store.upsert_multiline(&[MultilineRecord::from(&entry)]).await.expect("multiline");

    Orders { store, document, columns: vec![customer, lines], part, rows, cells }
}

#[tokio::test]
async fn duplicate_with_data_never_reuses_ids() {
    let o = orders().await;
    attach_file(
        &o.store,
        o.document.id,
        NewAttachment {
            target: AttachmentTarget::Cell(o.cells[0].id),
            storage_path: "blobs/contract.pdf".into(),
            file_name: "contract.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 2048,
            uploaded_by: None,
        },
    )
    .await
    .expect("attachment");

    let owner = Uuid::new_v4();
    let copy =
        duplicate_document(&o.store, o.document.id, true, Some(owner)).await.expect("duplicate");
    assert_eq!(copy.name, "Orders (copy)");
    assert_eq!(copy.owner_id, Some(owner));

    let columns = o.store.fetch_columns(copy.id).await.expect("columns");
    let rows = o.store.fetch_rows(copy.id).await.expect("rows");
    let column_ids: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
    let row_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let subs = o.store.fetch_sub_columns(&column_ids).await.expect("sub-columns");
    let cells = o.store.fetch_cells_by_row_ids(&row_ids).await.expect("cells");
    let cell_ids: Vec<Uuid> = cells.iter().map(|c| c.id).collect();
    let entries = o.store.fetch_multiline_by_cell_ids(&cell_ids).await.expect("multiline");
    let entry_ids: Vec<Uuid> = entries.iter().map(|m| m.id).collect();
    let files = o.store.fetch_files(&cell_ids, &entry_ids).await.expect("files");

    assert_eq!(columns.len(), 2);
    assert_eq!(rows.len(), 2);
    assert_eq!(subs.len(), 1);
    assert_eq!(cells.len(), 3);
    assert_eq!(entries.len(), 1);
    assert!(files.is_empty(), "attachments are not copied");

    let labels: Vec<&str> = columns.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["Customer", "Lines"]);

    let mut source_ids: HashSet<Uuid> = HashSet::from([o.document.id, o.part.id]);
    source_ids.extend(o.columns.iter().map(|c| c.id));
    source_ids.extend(o.rows.iter().map(|r| r.id));
    source_ids.extend(o.cells.iter().map(|c| c.id));

    for cell in &cells {
        assert!(!source_ids.contains(&cell.id));
        assert!(row_ids.contains(&cell.row_id));
        assert!(column_ids.contains(&cell.column_id));
    }
    assert!(column_ids.contains(&subs[0].parent_column_id));
    assert!(cell_ids.contains(&entries[0].cell_id));
    assert_eq!(entries[0].sub_column_id, subs[0].id);
    assert_eq!(entries[0].slots.decode().expect("decode"), CellValue::Text("bolt".into()));
}

#[tokio::test]
async fn delete_document_cascades_everything() {
    let o = orders().await;
    let report =
        delete_document(&o.store, o.document.id, Viewer::Anonymous).await.expect("delete");

    assert_eq!(report.documents, 1);
    assert_eq!(report.columns, 2);
    assert_eq!(report.sub_columns, 1);
    assert_eq!(report.rows, 2);
    assert_eq!(report.cells, 3);
    assert_eq!(report.multiline, 1);
    assert_eq!(o.store.cell_count().await, 0);
    assert_eq!(o.store.multiline_count().await, 0);
    assert!(list_documents(&o.store).await.expect("list").is_empty());
}

#[tokio::test]
async fn pinning_is_persisted_before_returning() {
    let o = orders().await;
    let other = create_document(&o.store, "Invoices", None).await.expect("document");

    let pinned = set_pinned(&o.store, o.document.id, true).await.expect("pin");
    assert!(pinned.is_pinned);

    let listed: Vec<Uuid> =
        list_documents(&o.store).await.expect("list").iter().map(|d| d.id).collect();
    assert_eq!(listed, vec![o.document.id, other.id]);
}
