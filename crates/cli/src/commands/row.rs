// `griddoc row ...`: row, multiline-record and attachment management.

use std::sync::Arc;

use clap::{Args, Subcommand};
use griddoc_common::{AttachmentTarget, CellValue, DataType, Row};
use griddoc_editor::admin::{self, NewAttachment};
use griddoc_editor::{Editor, EditorError};
use griddoc_store::{CascadeReport, Store};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{resolve, Context};
use crate::exit_code::UsageError;

#[derive(Subcommand)]
pub enum RowCommand {
    /// Append empty rows
    Add(AddArgs),
    /// Copy a row with its values directly below it
    Dup(RowArgs),
    /// Delete a row and its values
    Rm(RowArgs),
    /// Remove one record from a multiline cell
    RmRecord(RecordArgs),
    /// Record an uploaded file on a file cell
    Attach(AttachArgs),
    /// Drop an attachment record
    Detach(DetachArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Document name or id.
    pub document: String,
    /// How many rows to append.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,
}

#[derive(Debug, Args)]
pub struct RowArgs {
    /// Document name or id.
    pub document: String,
    /// Row number (1-based) or id.
    pub row: String,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    pub document: String,
    pub row: String,
    /// The multiline column.
    pub column: String,
    /// Record position within the cell.
    pub record: i32,
}

#[derive(Debug, Args)]
pub struct AttachArgs {
    pub document: String,
    pub row: String,
    /// The file column.
    pub column: String,
    /// Where the blob was uploaded.
    pub storage_path: String,
    /// Display name. Defaults to the last path segment.
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "application/octet-stream")]
    pub mime_type: String,
    #[arg(long, default_value_t = 0)]
    pub size: i64,
}

#[derive(Debug, Args)]
pub struct DetachArgs {
    /// Document name or id.
    pub document: String,
    /// Attachment id.
    pub file: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowEntry {
    pub id: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowsResult {
    pub rows: Vec<RowEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovedResult {
    pub removed: CascadeReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachResult {
    pub id: String,
    pub file_name: String,
    pub storage_path: String,
}

pub async fn run<S: Store>(cmd: RowCommand, ctx: &Context<S>) -> anyhow::Result<()> {
    match cmd {
        RowCommand::Add(args) => {
            let result = add(&args, ctx).await?;
            ctx.print(&result, |r| {
                let positions: Vec<String> =
                    r.rows.iter().map(|e| e.position.to_string()).collect();
                format!("Added row(s) {}", positions.join(", "))
            })
        }
        RowCommand::Dup(args) => {
            let (document, rows, source) = find(ctx, &args.document, &args.row).await?;
            let copy =
                admin::duplicate_row(&*ctx.store, document, source.id, ctx.author()).await?;
            let position = position(&rows, &source) + 1;
            let entry = RowEntry { id: copy.id.to_string(), position };
            ctx.print(&entry, |e| format!("Copied to row {}", e.position))
        }
        RowCommand::Rm(args) => {
            let (document, _, row) = find(ctx, &args.document, &args.row).await?;
            let removed = admin::delete_row(&*ctx.store, document, row.id).await?;
            report_removed(ctx, removed)
        }
        RowCommand::RmRecord(args) => {
            let result = remove_record(&args, ctx).await?;
            report_removed(ctx, result.removed)
        }
        RowCommand::Attach(args) => {
            let result = attach(&args, ctx).await?;
            ctx.print(&result, |r| format!("Attached {} ({})", r.file_name, r.id))
        }
        RowCommand::Detach(args) => {
            let document = resolve::document(&*ctx.store, &args.document).await?;
            let removed = admin::detach_file(&*ctx.store, document.id, args.file).await?;
            report_removed(ctx, removed)
        }
    }
}

async fn find<S: Store>(
    ctx: &Context<S>,
    document: &str,
    row: &str,
) -> anyhow::Result<(Uuid, Vec<Row>, Row)> {
    let document = resolve::document(&*ctx.store, document).await?;
    let rows = ctx.store.fetch_rows(document.id).await.map_err(EditorError::Read)?;
    let row = resolve::row(&rows, row)?.clone();
    Ok((document.id, rows, row))
}

fn position(rows: &[Row], row: &Row) -> usize {
    rows.iter().position(|r| r.id == row.id).map_or(0, |i| i + 1)
}

pub async fn add<S: Store>(args: &AddArgs, ctx: &Context<S>) -> anyhow::Result<RowsResult> {
    let document = resolve::document(&*ctx.store, &args.document).await?;
    let existing = ctx.store.fetch_rows(document.id).await.map_err(EditorError::Read)?.len();
    let mut rows = Vec::with_capacity(args.count);
    for i in 0..args.count {
        let row = admin::add_row(&*ctx.store, document.id, ctx.author()).await?;
        rows.push(RowEntry { id: row.id.to_string(), position: existing + i + 1 });
    }
    Ok(RowsResult { rows })
}

/// Goes through an editor so the record also disappears from any unsaved
/// session state for the same cell.
pub async fn remove_record<S: Store>(
    args: &RecordArgs,
    ctx: &Context<S>,
) -> anyhow::Result<RemovedResult> {
    let (document, _, row) = find(ctx, &args.document, &args.row).await?;
    let editor = open(ctx, document).await?;
    let removed = remove_record_with(&editor, args, row.id).await;
    editor.close().await;
    Ok(RemovedResult { removed: removed? })
}

async fn remove_record_with<S: Store>(
    editor: &Editor<S>,
    args: &RecordArgs,
    row_id: Uuid,
) -> anyhow::Result<CascadeReport> {
    let column = {
        let session = editor.session().await;
        resolve::column(session.visible_columns(), &args.column)?.id
    };
    Ok(editor.remove_multiline_record(row_id, column, args.record).await?)
}

/// Attach to the (row, column) file cell, creating the container cell
/// first when the row has none yet.
pub async fn attach<S: Store>(
    args: &AttachArgs,
    ctx: &Context<S>,
) -> anyhow::Result<AttachResult> {
    let (document, _, row) = find(ctx, &args.document, &args.row).await?;
    let editor = open(ctx, document).await?;
    let attached = attach_with(&editor, args, row.id, ctx.author()).await;
    editor.close().await;
    attached
}

async fn attach_with<S: Store>(
    editor: &Editor<S>,
    args: &AttachArgs,
    row_id: Uuid,
    author: Option<Uuid>,
) -> anyhow::Result<AttachResult> {
    let (column, data_type, cell) = {
        let session = editor.session().await;
        let column = resolve::column(session.visible_columns(), &args.column)?;
        let cell = session.cell(row_id, column.id).map(|c| c.id);
        (column.id, column.data_type, cell)
    };
    if data_type != DataType::File {
        return Err(UsageError(format!("`{}` is not a file column", args.column)).into());
    }
    let cell_id = match cell {
        Some(id) => id,
        None => {
            editor.set_cell(row_id, column, CellValue::File).await?;
            let session = editor.session().await;
            session
                .cell(row_id, column)
                .map(|c| c.id)
                .ok_or_else(|| anyhow::anyhow!("file cell for row {row_id} was not created"))?
        }
    };

    let file_name = args.name.clone().unwrap_or_else(|| {
        args.storage_path.rsplit('/').next().unwrap_or(&args.storage_path).to_string()
    });
    let file = editor
        .attach_file(NewAttachment {
            target: AttachmentTarget::Cell(cell_id),
            storage_path: args.storage_path.clone(),
            file_name,
            mime_type: args.mime_type.clone(),
            size_bytes: args.size,
            uploaded_by: author,
        })
        .await?;
    Ok(AttachResult {
        id: file.id.to_string(),
        file_name: file.file_name,
        storage_path: file.storage_path,
    })
}

async fn open<S: Store>(ctx: &Context<S>, document: Uuid) -> Result<Editor<S>, EditorError> {
    let quiet_period = ctx.config.autosave.quiet_period();
    Editor::open(Arc::clone(&ctx.store), document, ctx.viewer(), quiet_period).await
}

fn report_removed<S: Store>(ctx: &Context<S>, removed: CascadeReport) -> anyhow::Result<()> {
    if !removed.files.is_empty() {
        ctx.warn(
            "orphaned_files",
            &format!(
                "{} attachment(s) left in blob storage: {}",
                removed.files.len(),
                removed.files.join(", ")
            ),
        );
    }
    ctx.print(&RemovedResult { removed }, |r| {
        format!(
            "Deleted {} row(s), {} cell(s), {} multiline entr{}, {} file(s)",
            r.removed.rows,
            r.removed.cells,
            r.removed.multiline,
            if r.removed.multiline == 1 { "y" } else { "ies" },
            r.removed.files.len()
        )
    })
}

#[cfg(test)]
mod tests {
    use griddoc_common::Column;
    use griddoc_editor::admin::NewColumn;
    use griddoc_editor::EditorConfig;
    use griddoc_store::MemoryStore;

    use super::*;
    use crate::exit_code::ExitCode;
    use crate::output::OutputFormat;

    struct Fixture {
        ctx: Context<MemoryStore>,
        document: Uuid,
        scan: Column,
        lines: Column,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let document = admin::create_document(&store, "Assets", None).await.unwrap();
        let scan = admin::add_column(&store, document.id, NewColumn::new("Scan", DataType::File))
            .await
            .unwrap();
        let lines =
            admin::add_column(&store, document.id, NewColumn::new("Lines", DataType::Multiline))
                .await
                .unwrap();
        admin::add_sub_column(&store, document.id, lines.id, "Part", DataType::Text)
            .await
            .unwrap();
        let ctx = Context {
            store: Arc::new(store),
            config: EditorConfig::default(),
            format: OutputFormat::Json,
        };
        Fixture { ctx, document: document.id, scan, lines }
    }

    fn add_args(count: usize) -> AddArgs {
        AddArgs { document: "Assets".into(), count }
    }

    #[tokio::test]
    async fn add_reports_positions() {
        let f = fixture().await;
        add(&add_args(2), &f.ctx).await.unwrap();
        let result = add(&add_args(1), &f.ctx).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].position, 3);
        assert_eq!(f.ctx.store.fetch_rows(f.document).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn attach_creates_the_file_cell() {
        let f = fixture().await;
        add(&add_args(1), &f.ctx).await.unwrap();
        let args = AttachArgs {
            document: "Assets".into(),
            row: "1".into(),
            column: "scan".into(),
            storage_path: "blobs/2024/invoice.pdf".into(),
            name: None,
            mime_type: "application/pdf".into(),
            size: 512,
        };
        let first = attach(&args, &f.ctx).await.unwrap();
        assert_eq!(first.file_name, "invoice.pdf");
        attach(&args, &f.ctx).await.unwrap();

        let rows = f.ctx.store.fetch_rows(f.document).await.unwrap();
        let cells = f.ctx.store.fetch_cells_by_row_ids(&[rows[0].id]).await.unwrap();
        assert_eq!(cells.len(), 1, "the second attach reuses the cell");
        assert_eq!(cells[0].column_id, f.scan.id);
        let files = f.ctx.store.fetch_files(&[cells[0].id], &[]).await.unwrap();
        let orders: Vec<i32> = files.iter().map(|file| file.order_index).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn attach_to_non_file_column_is_usage_error() {
        let f = fixture().await;
        add(&add_args(1), &f.ctx).await.unwrap();
        let args = AttachArgs {
            document: "Assets".into(),
            row: "1".into(),
            column: "Lines".into(),
            storage_path: "blobs/x".into(),
            name: None,
            mime_type: "text/plain".into(),
            size: 1,
        };
        let err = attach(&args, &f.ctx).await.unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Usage);
    }

    #[tokio::test]
    async fn remove_record_deletes_only_that_record() {
        let f = fixture().await;
        add(&add_args(1), &f.ctx).await.unwrap();
        let rows = f.ctx.store.fetch_rows(f.document).await.unwrap();
        {
            let editor = open(&f.ctx, f.document).await.unwrap();
            let part = editor.session().await.sub_columns(f.lines.id)[0].id;
            for value in ["bolt", "nut"] {
                let record = editor.add_multiline_record(rows[0].id, f.lines.id).await.unwrap();
                editor
                    .set_multiline_value(
                        rows[0].id,
                        f.lines.id,
                        record,
                        part,
                        CellValue::Text(value.into()),
                    )
                    .await
                    .unwrap();
            }
            editor.save().await;
            editor.close().await;
        }
        assert_eq!(f.ctx.store.multiline_count().await, 2);

        let args = RecordArgs {
            document: "Assets".into(),
            row: "1".into(),
            column: "Lines".into(),
            record: 0,
        };
        let result = remove_record(&args, &f.ctx).await.unwrap();
        assert_eq!(result.removed.multiline, 1);
        assert_eq!(f.ctx.store.multiline_count().await, 1);

        let again = remove_record(&args, &f.ctx).await.unwrap();
        assert_eq!(again.removed, CascadeReport::default());
    }
}
