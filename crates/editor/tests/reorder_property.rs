use griddoc_common::{Column, DataType, Document};
use griddoc_editor::admin::{add_column, reorder_columns, update_column, ColumnPatch, NewColumn};
use griddoc_store::{MemoryStore, Store};
use proptest::prelude::*;
use uuid::Uuid;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime")
}

fn permutation() -> impl Strategy<Value = Vec<usize>> {
    (1usize..7).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

async fn seeded(n: usize) -> (MemoryStore, Document, Vec<Column>) {
    let store = MemoryStore::new();
    let document = Document::new("Sheet", None);
    store.upsert_document(&document).await.expect("document should persist");

    let mut columns = Vec::with_capacity(n);
    for i in 0..n {
        let data_type = DataType::ALL[i % DataType::ALL.len()];
        let column = add_column(&store, document.id, NewColumn::new(format!("C{i}"), data_type))
            .await
            .expect("column should be added");
        let patch = ColumnPatch {
            width: Some(100 + i as i32 * 10),
            background_color: Some(Some(format!("#00000{i}"))),
            ..ColumnPatch::default()
        };
        columns.push(
            update_column(&store, document.id, column.id, patch).await.expect("column update"),
        );
    }
    (store, document, columns)
}

proptest! {
    #[test]
    fn reorder_changes_only_order_index(order in permutation()) {
        let rt = runtime();
        let (before, after, ordering) = rt.block_on(async {
            let (store, document, columns) = seeded(order.len()).await;
            let ordering: Vec<Uuid> = order.iter().map(|&i| columns[i].id).collect();
            reorder_columns(&store, document.id, &ordering).await.expect("reorder");
            let after = store.fetch_columns(document.id).await.expect("columns");
            (columns, after, ordering)
        });

        let ids: Vec<Uuid> = after.iter().map(|c| c.id).collect();
        prop_assert_eq!(&ids, &ordering);
        for (position, column) in after.iter().enumerate() {
            let original = before.iter().find(|c| c.id == column.id).expect("same column");
            prop_assert_eq!(column.order_index, position as i32);
            let mut expected = original.clone();
            expected.order_index = column.order_index;
            prop_assert_eq!(column, &expected);
        }
    }

    #[test]
    fn non_permutations_are_rejected(n in 2usize..6, drop_at in 0usize..6) {
        let rt = runtime();
        let result = rt.block_on(async {
            let (store, document, columns) = seeded(n).await;
            let mut ordering: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
            ordering.remove(drop_at % n);
            ordering.push(ordering[0]);
            let result = reorder_columns(&store, document.id, &ordering).await;
            let unchanged = store.fetch_columns(document.id).await.expect("columns") == columns;
            (result.is_err(), unchanged)
        });
        prop_assert_eq!(result, (true, true));
    }
}
