// `griddoc set`: edit one value through an editor session and save it.

use std::sync::Arc;

use clap::Args;
use griddoc_common::{CellValue, SubColumn, ValidationError};
use griddoc_editor::{Editor, EditorError, FlushOutcome};
use griddoc_store::{Store, StoreError};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{resolve, Context};
use crate::exit_code::{LookupError, UsageError};

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Document name or id.
    pub document: String,
    /// Row number (1-based) or id.
    pub row: String,
    /// Column label or id.
    pub column: String,
    /// New value, parsed as the column's type.
    pub value: String,
    /// Sub-column of a multiline column to set.
    #[arg(long, value_name = "SUB_COLUMN")]
    pub field: Option<String>,
    /// Multiline record position. A new record is appended when omitted.
    #[arg(long, requires = "field")]
    pub record: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetResult {
    pub document: String,
    pub row: String,
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<i32>,
    pub value: String,
    pub saved: FlushOutcome,
}

struct Target {
    row_id: Uuid,
    column_id: Uuid,
    column: String,
    sub: Option<SubColumn>,
}

pub async fn run<S: Store>(args: SetArgs, ctx: &Context<S>) -> anyhow::Result<()> {
    let result = execute(&args, ctx).await?;
    ctx.print(&result, |r| match r.record {
        Some(record) => format!("{} [{}] #{} = {}", r.column, r.row, record, r.value),
        None => format!("{} [{}] = {}", r.column, r.row, r.value),
    })
}

pub async fn execute<S: Store>(args: &SetArgs, ctx: &Context<S>) -> anyhow::Result<SetResult> {
    let document = resolve::document(&*ctx.store, &args.document).await?;
    let editor = Editor::open(
        Arc::clone(&ctx.store),
        document.id,
        ctx.viewer(),
        ctx.config.autosave.quiet_period(),
    )
    .await?;

    let edited = edit(&editor, args).await;
    let saved = match &edited {
        Ok(_) => editor.save().await,
        Err(_) => FlushOutcome::Skipped,
    };
    let status = editor.close().await;
    debug!(document_id = %document.id, status = status.as_str(), "set finished");

    let (target, record) = edited?;
    if let FlushOutcome::Failed { message } = &saved {
        return Err(EditorError::Write(StoreError::Unavailable(message.clone())).into());
    }
    Ok(SetResult {
        document: document.name,
        row: args.row.clone(),
        column: match &target.sub {
            Some(sub) => format!("{}.{}", target.column, sub.label),
            None => target.column,
        },
        record,
        value: args.value.clone(),
        saved,
    })
}

async fn edit<S: Store>(
    editor: &Editor<S>,
    args: &SetArgs,
) -> anyhow::Result<(Target, Option<i32>)> {
    let target = {
        let session = editor.session().await;
        let row_id = resolve::row(session.rows(), &args.row)?.id;
        let column = resolve::column(session.visible_columns(), &args.column)?;
        let sub = match &args.field {
            Some(key) => Some(sub_column(&session.sub_columns(column.id), key, &column.label)?),
            None => None,
        };
        Target { row_id, column_id: column.id, column: column.label.clone(), sub }
    };

    let Some(sub) = &target.sub else {
        editor.set_cell_input(target.row_id, target.column_id, &args.value).await?;
        return Ok((target, None));
    };

    let value = CellValue::parse(sub.data_type, &args.value).ok_or_else(|| {
        EditorError::from(ValidationError::Unparseable {
            input: args.value.clone(),
            expected: sub.data_type,
        })
    })?;
    let record = match args.record {
        Some(record) => record,
        None => editor.add_multiline_record(target.row_id, target.column_id).await?,
    };
    editor.set_multiline_value(target.row_id, target.column_id, record, sub.id, value).await?;
    Ok((target, Some(record)))
}

fn sub_column(subs: &[&SubColumn], key: &str, parent: &str) -> anyhow::Result<SubColumn> {
    let key = key.trim();
    let id = Uuid::parse_str(key).ok();
    let matches: Vec<&&SubColumn> = subs
        .iter()
        .filter(|s| Some(s.id) == id || s.label.eq_ignore_ascii_case(key))
        .collect();
    match matches.as_slice() {
        [sub] => Ok((**sub).clone()),
        [] => Err(LookupError(format!("`{parent}` has no field named `{key}`")).into()),
        _ => Err(UsageError(format!("`{parent}` has more than one field named `{key}`")).into()),
    }
}

#[cfg(test)]
mod tests {
    use griddoc_common::{CellData, CellRecord, Column, DataType, Row};
    use griddoc_editor::{admin, EditorConfig, EditorSession};
    use griddoc_store::MemoryStore;

    use super::*;
    use crate::exit_code::ExitCode;
    use crate::output::OutputFormat;

    struct Fixture {
        ctx: Context<MemoryStore>,
        document: Uuid,
        qty: Uuid,
        row: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let document = admin::create_document(&store, "Stock", None).await.unwrap();
        let qty = Column::new(document.id, "Qty", DataType::Number, 0);
        let lines = Column::new(document.id, "Lines", DataType::Multiline, 1);
        let row = Row::new(document.id, 0, None);
        store.upsert_columns(&[qty.clone(), lines.clone()]).await.unwrap();
        store.upsert_rows(std::slice::from_ref(&row)).await.unwrap();
        let cell = CellData::new(row.id, qty.id, CellValue::Number(1.0));
        store.upsert_cells(&[CellRecord::from(&cell)]).await.unwrap();
        admin::add_sub_column(&store, document.id, lines.id, "Part", DataType::Text)
            .await
            .unwrap();

        let ctx = Context {
            store: Arc::new(store),
            config: EditorConfig::default(),
            format: OutputFormat::Json,
        };
        Fixture { ctx, document: document.id, qty: qty.id, row: row.id }
    }

    fn args(column: &str, value: &str) -> SetArgs {
        SetArgs {
            document: "Stock".into(),
            row: "1".into(),
            column: column.into(),
            value: value.into(),
            field: None,
            record: None,
        }
    }

    #[tokio::test]
    async fn set_parses_and_persists() {
        let f = fixture().await;
        let result = execute(&args("qty", "42"), &f.ctx).await.unwrap();
        assert!(matches!(result.saved, FlushOutcome::Saved { .. }));

        let session = EditorSession::load(&*f.ctx.store, f.document, Default::default())
            .await
            .unwrap();
        assert_eq!(session.cell(f.row, f.qty).unwrap().value, CellValue::Number(42.0));
    }

    #[tokio::test]
    async fn unparseable_value_is_usage_error_and_writes_nothing() {
        let f = fixture().await;
        let before = f.ctx.store.cell_batches().await.len();
        let err = execute(&args("Qty", "lots"), &f.ctx).await.unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
        assert_eq!(f.ctx.store.cell_batches().await.len(), before);
    }

    #[tokio::test]
    async fn store_failure_on_save_is_store_down() {
        let f = fixture().await;
        f.ctx.store.set_fail_writes(true).await;
        let err = execute(&args("Qty", "5"), &f.ctx).await.unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::StoreDown);
    }

    #[tokio::test]
    async fn field_appends_multiline_record() {
        let f = fixture().await;
        let mut a = args("Lines", "bolt");
        a.field = Some("part".into());
        let result = execute(&a, &f.ctx).await.unwrap();
        assert_eq!(result.record, Some(0));
        assert_eq!(result.column, "Lines.Part");

        a.value = "nut".into();
        let result = execute(&a, &f.ctx).await.unwrap();
        assert_eq!(result.record, Some(1));
        assert_eq!(f.ctx.store.multiline_count().await, 2);
    }

    #[tokio::test]
    async fn unknown_field_is_not_found() {
        let f = fixture().await;
        let mut a = args("Lines", "bolt");
        a.field = Some("Colour".into());
        let err = execute(&a, &f.ctx).await.unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }
}
