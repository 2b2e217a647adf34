use chrono::Utc;
use griddoc_common::{
    AttachmentTarget, CellData, CellRecord, CellValue, Column, DataType, Document, FileAttachment,
    MultilineData, MultilineRecord, Row, SubColumn,
};
use griddoc_store::{
    db::{
        migrations,
        pool::{create_pg_pool, PoolConfig},
    },
    PgStore, Store, StoreError,
};
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let Some(database_url) = std::env::var("GRIDDOC_TEST_DATABASE_URL").ok() else {
        eprintln!("skipping pg store integration test: set GRIDDOC_TEST_DATABASE_URL to run it");
        return None;
    };
    let config = PoolConfig { min_connections: 1, max_connections: 2, ..PoolConfig::default() };
    let pool =
        create_pg_pool(&database_url, &config).await.expect("pool should connect to test database");
    migrations::run_migrations(&pool).await.expect("migrations should apply");
    Some(PgStore::new(pool))
}

#[tokio::test]
async fn cells_roundtrip_and_cascade_with_document() {
    let Some(store) = store().await else {
        return;
    };

    let document = Document::new("Integration", None);
    let qty = Column::new(document.id, "Qty", DataType::Number, 0);
    let parts = Column::new(document.id, "Parts", DataType::Multiline, 1);
    let part = SubColumn::new(parts.id, "Part", DataType::Text, 0);
    let row = Row::new(document.id, 0, None);
    let qty_cell = CellData::new(row.id, qty.id, CellValue::Number(4.5));
    let parts_cell = CellData::new(row.id, parts.id, CellValue::Multiline);
    let entry = MultilineData::new(parts_cell.id, part.id, 0, CellValue::Text("bolt".into()));

    store.upsert_document(&document).await.expect("document");
    store.upsert_columns(&[qty.clone(), parts.clone()]).await.expect("columns");
    store.upsert_sub_columns(&[part.clone()]).await.expect("sub-columns");
    store.upsert_rows(&[row.clone()]).await.expect("rows");
    store
        .upsert_cells(&[CellRecord::from(&qty_cell), CellRecord::from(&parts_cell)])
        .await
        .expect("cells");
    store.upsert_multiline(&[MultilineRecord::from(&entry)]).await.expect("multiline");
    store
        .insert_file(&FileAttachment {
            id: Uuid::new_v4(),
            target: AttachmentTarget::Multiline(entry.id),
            storage_path: format!("blobs/{}", entry.id),
            file_name: "invoice.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 12,
            uploaded_by: None,
            uploaded_at: Utc::now(),
            order_index: 0,
        })
        .await
        .expect("file");

    let fetched = store.fetch_document(document.id).await.expect("fetch").expect("present");
    assert_eq!(fetched.name, "Integration");
    assert_eq!(store.fetch_columns(document.id).await.expect("columns").len(), 2);

    let cells = store.fetch_cells_by_row_ids(&[row.id]).await.expect("cells");
    let qty_back = cells.into_iter().find(|c| c.id == qty_cell.id).expect("qty cell");
    assert_eq!(CellData::try_from(qty_back).expect("decode"), qty_cell);

    let duplicate = CellData::new(row.id, qty.id, CellValue::Number(1.0));
    let error = store.upsert_cells(&[CellRecord::from(&duplicate)]).await.expect_err("unique");
    assert!(matches!(error, StoreError::Conflict(_)), "{error:?}");

    let report = store.delete_document(document.id).await.expect("cascade");
    assert_eq!(report.documents, 1);
    assert_eq!(report.rows, 1);
    assert_eq!(report.columns, 2);
    assert_eq!(report.sub_columns, 1);
    assert_eq!(report.cells, 2);
    assert_eq!(report.multiline, 1);
    assert_eq!(report.files, vec![format!("blobs/{}", entry.id)]);
    assert!(store.fetch_document(document.id).await.expect("fetch").is_none());
}

#[tokio::test]
async fn deleting_missing_row_is_not_found() {
    let Some(store) = store().await else {
        return;
    };
    let error = store.delete_row(Uuid::new_v4()).await.expect_err("missing");
    assert!(error.is_not_found());
}

#[tokio::test]
async fn large_cell_batches_upsert_across_chunks() {
    let Some(store) = store().await else {
        return;
    };

    let document = Document::new("Bulk", None);
    let qty = Column::new(document.id, "Qty", DataType::Number, 0);
    let rows: Vec<Row> = (0..2_500).map(|i| Row::new(document.id, i, None)).collect();
    store.upsert_document(&document).await.expect("document");
    store.upsert_columns(std::slice::from_ref(&qty)).await.expect("columns");
    store.upsert_rows(&rows).await.expect("rows");

    let cells: Vec<CellData> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| CellData::new(row.id, qty.id, CellValue::Number(i as f64)))
        .collect();
    let mut records: Vec<CellRecord> = cells.iter().map(CellRecord::from).collect();
    let mut revised = cells[0].clone();
    revised.value = CellValue::Number(-1.0);
    records.push(CellRecord::from(&revised));
    store.upsert_cells(&records).await.expect("cells");

    let row_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let stored = store.fetch_cells_by_row_ids(&row_ids).await.expect("fetch cells");
    assert_eq!(stored.len(), 2_500);
    let first = stored.iter().find(|cell| cell.id == cells[0].id).expect("first cell");
    assert_eq!(first.slots.decode().expect("decode"), CellValue::Number(-1.0));

    store.delete_document(document.id).await.expect("cleanup");
}
