// `griddoc col ...`: column and multiline-field management.

use clap::{Args, Subcommand};
use griddoc_common::{Column, DataType, SubColumn};
use griddoc_editor::admin::{self, ColumnPatch, NewColumn};
use griddoc_editor::EditorError;
use griddoc_store::{CascadeReport, Store};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{resolve, Context};
use crate::exit_code::LookupError;
use crate::output::render_table;

#[derive(Subcommand)]
pub enum ColCommand {
    /// List a document's columns
    Ls(DocumentArg),
    /// Append a column
    Add(AddArgs),
    /// Rename a column
    Rename(RenameArgs),
    /// Move a column to a new 1-based position
    Move(MoveArgs),
    /// Copy a column, with its values, next to the original
    Dup(ColumnArgs),
    /// Delete a column and every value in it
    Rm(ColumnArgs),
    /// Add a field to a multiline column
    AddField(AddFieldArgs),
    /// Delete a field from a multiline column
    RmField(FieldArgs),
}

#[derive(Debug, Args)]
pub struct DocumentArg {
    /// Document name or id.
    pub document: String,
}

#[derive(Debug, Args)]
pub struct ColumnArgs {
    /// Document name or id.
    pub document: String,
    /// Column label or id.
    pub column: String,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Document name or id.
    pub document: String,
    pub label: String,
    /// One of: text, number, date, boolean, select, file, multiline.
    #[arg(long = "type", short = 't', default_value = "text")]
    pub data_type: DataType,
    /// A choice for select columns. Repeatable.
    #[arg(long = "option", value_name = "CHOICE")]
    pub options: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    pub document: String,
    pub column: String,
    pub label: String,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    pub document: String,
    pub column: String,
    /// Target position, 1-based. Values past the end move to the end.
    #[arg(long)]
    pub to: usize,
}

#[derive(Debug, Args)]
pub struct AddFieldArgs {
    pub document: String,
    /// The multiline column.
    pub column: String,
    pub label: String,
    #[arg(long = "type", short = 't', default_value = "text")]
    pub data_type: DataType,
}

#[derive(Debug, Args)]
pub struct FieldArgs {
    pub document: String,
    /// The multiline column.
    pub column: String,
    /// Field label or id.
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub id: String,
    pub label: String,
    pub data_type: DataType,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ColumnEntry {
    fn new(column: &Column, position: usize, subs: &[SubColumn]) -> Self {
        Self {
            id: column.id.to_string(),
            label: column.label.clone(),
            data_type: column.data_type,
            position,
            fields: subs
                .iter()
                .filter(|s| s.parent_column_id == column.id)
                .map(|s| format!("{} ({})", s.label, s.data_type))
                .collect(),
            options: column.select_options(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsResult {
    pub document: String,
    pub columns: Vec<ColumnEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovedResult {
    pub label: String,
    pub removed: CascadeReport,
}

pub async fn run<S: Store>(cmd: ColCommand, ctx: &Context<S>) -> anyhow::Result<()> {
    match cmd {
        ColCommand::Ls(args) => {
            let result = list(&args.document, ctx).await?;
            ctx.print(&result, format_columns)
        }
        ColCommand::Add(args) => {
            let document = resolve::document(&*ctx.store, &args.document).await?;
            let new = NewColumn::new(args.label, args.data_type).with_options(args.options);
            let column = admin::add_column(&*ctx.store, document.id, new).await?;
            ctx.print(&column_entry(ctx, &column).await?, format_column)
        }
        ColCommand::Rename(args) => {
            let (document, column) = find(ctx, &args.document, &args.column).await?;
            let patch = ColumnPatch { label: Some(args.label), ..ColumnPatch::default() };
            let column = admin::update_column(&*ctx.store, document, column.id, patch).await?;
            ctx.print(&column_entry(ctx, &column).await?, format_column)
        }
        ColCommand::Move(args) => {
            let result = move_column(&args, ctx).await?;
            ctx.print(&result, format_columns)
        }
        ColCommand::Dup(args) => {
            let (document, column) = find(ctx, &args.document, &args.column).await?;
            let copy = admin::duplicate_column(&*ctx.store, document, column.id).await?;
            ctx.print(&column_entry(ctx, &copy).await?, format_column)
        }
        ColCommand::Rm(args) => {
            let (document, column) = find(ctx, &args.document, &args.column).await?;
            let removed = admin::delete_column(&*ctx.store, document, column.id).await?;
            report_removed(ctx, RemovedResult { label: column.label, removed })
        }
        ColCommand::AddField(args) => {
            let (document, column) = find(ctx, &args.document, &args.column).await?;
            admin::add_sub_column(&*ctx.store, document, column.id, &args.label, args.data_type)
                .await?;
            ctx.print(&column_entry(ctx, &column).await?, format_column)
        }
        ColCommand::RmField(args) => {
            let (document, column) = find(ctx, &args.document, &args.column).await?;
            let field = field(ctx, &column, &args.field).await?;
            let removed = admin::delete_sub_column(&*ctx.store, document, field.id).await?;
            let label = format!("{}.{}", column.label, field.label);
            report_removed(ctx, RemovedResult { label, removed })
        }
    }
}

async fn find<S: Store>(
    ctx: &Context<S>,
    document: &str,
    column: &str,
) -> anyhow::Result<(Uuid, Column)> {
    let document = resolve::document(&*ctx.store, document).await?;
    let columns = ctx.store.fetch_columns(document.id).await.map_err(EditorError::Read)?;
    let column = resolve::column(&columns, column)?.clone();
    Ok((document.id, column))
}

async fn field<S: Store>(
    ctx: &Context<S>,
    column: &Column,
    key: &str,
) -> anyhow::Result<SubColumn> {
    let subs = ctx.store.fetch_sub_columns(&[column.id]).await.map_err(EditorError::Read)?;
    let id = Uuid::parse_str(key.trim()).ok();
    subs.into_iter()
        .find(|s| Some(s.id) == id || s.label.eq_ignore_ascii_case(key.trim()))
        .ok_or_else(|| LookupError(format!("`{}` has no field named `{key}`", column.label)).into())
}

async fn column_entry<S: Store>(
    ctx: &Context<S>,
    column: &Column,
) -> anyhow::Result<ColumnEntry> {
    let columns =
        ctx.store.fetch_columns(column.document_id).await.map_err(EditorError::Read)?;
    let subs = ctx.store.fetch_sub_columns(&[column.id]).await.map_err(EditorError::Read)?;
    let current = columns.iter().find(|c| c.id == column.id).unwrap_or(column);
    let position = columns.iter().position(|c| c.id == column.id).map_or(0, |i| i + 1);
    Ok(ColumnEntry::new(current, position, &subs))
}

pub async fn list<S: Store>(document: &str, ctx: &Context<S>) -> anyhow::Result<ColumnsResult> {
    let document = resolve::document(&*ctx.store, document).await?;
    let columns = ctx.store.fetch_columns(document.id).await.map_err(EditorError::Read)?;
    let ids: Vec<Uuid> = columns.iter().map(|c| c.id).collect();
    let subs = ctx.store.fetch_sub_columns(&ids).await.map_err(EditorError::Read)?;
    let entries = columns.iter().enumerate().map(|(i, c)| ColumnEntry::new(c, i + 1, &subs));
    Ok(ColumnsResult { document: document.name, columns: entries.collect() })
}

/// Splice the column into its new slot and write the full ordering back.
pub async fn move_column<S: Store>(
    args: &MoveArgs,
    ctx: &Context<S>,
) -> anyhow::Result<ColumnsResult> {
    let (document, column) = find(ctx, &args.document, &args.column).await?;
    let columns = ctx.store.fetch_columns(document).await.map_err(EditorError::Read)?;
    let mut ordering: Vec<Uuid> =
        columns.iter().map(|c| c.id).filter(|id| *id != column.id).collect();
    let slot = args.to.saturating_sub(1).min(ordering.len());
    ordering.insert(slot, column.id);
    admin::reorder_columns(&*ctx.store, document, &ordering).await?;
    list(&document.to_string(), ctx).await
}

fn report_removed<S: Store>(ctx: &Context<S>, result: RemovedResult) -> anyhow::Result<()> {
    if !result.removed.files.is_empty() {
        ctx.warn(
            "orphaned_files",
            &format!(
                "{} attachment(s) left in blob storage: {}",
                result.removed.files.len(),
                result.removed.files.join(", ")
            ),
        );
    }
    ctx.print(&result, |r| {
        format!(
            "Deleted {}: {} cell(s), {} multiline entr{}",
            r.label,
            r.removed.cells,
            r.removed.multiline,
            if r.removed.multiline == 1 { "y" } else { "ies" }
        )
    })
}

fn format_column(entry: &ColumnEntry) -> String {
    let mut line =
        format!("{}. {} ({})  {}", entry.position, entry.label, entry.data_type, entry.id);
    if !entry.fields.is_empty() {
        line.push_str(&format!("\n   fields: {}", entry.fields.join(", ")));
    }
    if !entry.options.is_empty() {
        line.push_str(&format!("\n   options: {}", entry.options.join(", ")));
    }
    line
}

fn format_columns(result: &ColumnsResult) -> String {
    if result.columns.is_empty() {
        return format!("{} has no columns. Add one with: griddoc col add", result.document);
    }
    let headers: Vec<String> = ["#", "Label", "Type", "Details"].map(String::from).to_vec();
    let rows: Vec<Vec<String>> = result
        .columns
        .iter()
        .map(|c| {
            let details =
                if c.fields.is_empty() { c.options.join(" | ") } else { c.fields.join(", ") };
            vec![c.position.to_string(), c.label.clone(), c.data_type.to_string(), details]
        })
        .collect();
    render_table(&headers, &rows)
}
