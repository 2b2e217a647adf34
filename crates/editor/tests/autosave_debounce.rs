use std::sync::Arc;
use std::time::Duration;

use griddoc_common::{
    CellData, CellRecord, CellValue, Column, DataType, Document, Row, SaveStatus, Viewer,
};
use griddoc_editor::{Editor, FlushOutcome, Notice};
use griddoc_store::{MemoryStore, Store};
use tokio::time::sleep;

const QUIET: Duration = Duration::from_millis(2_500);

struct Fixture {
    store: MemoryStore,
    document: Document,
    qty: Column,
    row: Row,
}

async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let document = Document::new("Stock", None);
    let qty = Column::new(document.id, "Qty", DataType::Number, 0);
    let row = Row::new(document.id, 0, None);
    store.upsert_document(&document).await.expect("document should persist");
    store.upsert_columns(std::slice::from_ref(&qty)).await.expect("column should persist");
    store.upsert_rows(std::slice::from_ref(&row)).await.expect("row should persist");
    let cell = CellData::new(row.id, qty.id, CellValue::Number(1.0));
    store.upsert_cells(&[CellRecord::from(&cell)]).await.expect("cell should persist");
    Fixture { store, document, qty, row }
}

async fn open(f: &Fixture) -> Editor<MemoryStore> {
    Editor::open(Arc::new(f.store.clone()), f.document.id, Viewer::Anonymous, QUIET)
        .await
        .expect("editor should open")
}

async fn stored_qty(f: &Fixture) -> CellValue {
    let records =
        f.store.fetch_cells_by_row_ids(&[f.row.id]).await.expect("cells should load");
    records[0].slots.decode().expect("stored cell should decode")
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_produces_one_flush_after_the_last() {
    let f = fixture().await;
    let editor = open(&f).await;
    let seeded = f.store.cell_batches().await.len();

    for (i, qty) in [2.0, 3.0, 4.0].into_iter().enumerate() {
        if i > 0 {
            sleep(Duration::from_secs(1)).await;
        }
        editor.set_cell(f.row.id, f.qty.id, CellValue::Number(qty)).await.expect("edit");
    }
    assert_eq!(editor.status(), SaveStatus::Dirty);

    // Last edit at t=2s; nothing may be written before t=4.5s.
    sleep(Duration::from_millis(2_400)).await;
    assert_eq!(f.store.cell_batches().await.len(), seeded);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(f.store.cell_batches().await.len(), seeded + 1);
    assert_eq!(stored_qty(&f).await, CellValue::Number(4.0));
    assert_eq!(editor.status(), SaveStatus::Saved);

    // Quiet afterwards: no periodic flushes.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(f.store.cell_batches().await.len(), seeded + 1);
}

#[tokio::test(start_paused = true)]
async fn silent_flush_publishes_no_notice() {
    let f = fixture().await;
    let editor = open(&f).await;
    let mut notices = editor.notices();

    editor.set_cell(f.row.id, f.qty.id, CellValue::Number(5.0)).await.expect("edit");
    sleep(QUIET + Duration::from_millis(100)).await;

    assert_eq!(editor.status(), SaveStatus::Saved);
    assert!(notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn explicit_save_publishes_notice() {
    let f = fixture().await;
    let editor = open(&f).await;
    let mut notices = editor.notices();

    editor.set_cell(f.row.id, f.qty.id, CellValue::Number(5.0)).await.expect("edit");
    let outcome = editor.save().await;

    assert_eq!(outcome, FlushOutcome::Saved { cells: 1, multiline: 0 });
    assert_eq!(notices.recv().await.expect("notice"), Notice::Saved { cells: 1, multiline: 0 });
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_autosave() {
    let f = fixture().await;
    let editor = open(&f).await;
    let seeded = f.store.cell_batches().await.len();

    editor.set_cell(f.row.id, f.qty.id, CellValue::Number(9.0)).await.expect("edit");
    let status = editor.close().await;
    assert_eq!(status, SaveStatus::Dirty);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(f.store.cell_batches().await.len(), seeded);
    assert_eq!(stored_qty(&f).await, CellValue::Number(1.0));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_editor_cancels_pending_autosave() {
    let f = fixture().await;
    let seeded = f.store.cell_batches().await.len();
    {
        let editor = open(&f).await;
        editor.set_cell(f.row.id, f.qty.id, CellValue::Number(9.0)).await.expect("edit");
    }
    sleep(Duration::from_secs(10)).await;
    assert_eq!(f.store.cell_batches().await.len(), seeded);
}

#[tokio::test(start_paused = true)]
async fn save_while_saving_is_skipped_and_late_edits_stay_dirty() {
    let f = fixture().await;
    let editor = open(&f).await;
    f.store.set_write_delay(Some(Duration::from_secs(1))).await;

    editor.set_cell(f.row.id, f.qty.id, CellValue::Number(2.0)).await.expect("edit");
    let (first, second) = tokio::join!(editor.save(), async {
        sleep(Duration::from_millis(100)).await;
        assert_eq!(editor.status(), SaveStatus::Saving);
        editor.set_cell(f.row.id, f.qty.id, CellValue::Number(3.0)).await.expect("edit");
        editor.save().await
    });

    assert_eq!(first, FlushOutcome::Saved { cells: 1, multiline: 0 });
    assert_eq!(second, FlushOutcome::Skipped);
    assert_eq!(editor.status(), SaveStatus::Dirty);

    // The late edit is picked up by the next autosave.
    sleep(QUIET + Duration::from_secs(2)).await;
    assert_eq!(editor.status(), SaveStatus::Saved);
    assert_eq!(stored_qty(&f).await, CellValue::Number(3.0));
}

#[tokio::test(start_paused = true)]
async fn failed_autosave_keeps_edits_until_retry() {
    let f = fixture().await;
    let editor = open(&f).await;
    f.store.set_fail_writes(true).await;

    editor.set_cell(f.row.id, f.qty.id, CellValue::Number(7.0)).await.expect("edit");
    sleep(QUIET + Duration::from_millis(100)).await;
    assert_eq!(editor.status(), SaveStatus::Error);
    {
        let session = editor.session().await;
        assert_eq!(
            session.cell(f.row.id, f.qty.id).expect("cell").value,
            CellValue::Number(7.0)
        );
        assert!(session.last_error().is_some());
    }

    f.store.set_fail_writes(false).await;
    assert!(matches!(editor.save().await, FlushOutcome::Saved { .. }));
    assert_eq!(editor.status(), SaveStatus::Saved);
    assert_eq!(stored_qty(&f).await, CellValue::Number(7.0));
}
