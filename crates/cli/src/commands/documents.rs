// `griddoc ls | new | rename | pin | unpin | dup | rm`: document-level
// commands.

use chrono::{DateTime, Utc};
use clap::Args;
use griddoc_common::Document;
use griddoc_editor::admin::{self, DocumentList};
use griddoc_store::{CascadeReport, Store};
use serde::{Deserialize, Serialize};

use super::{resolve, Context};

#[derive(Debug, Args)]
pub struct DocArgs {
    /// Document name or id.
    pub document: String,
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Name of the new document.
    pub name: String,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Document name or id.
    pub document: String,
    /// New name.
    pub name: String,
}

#[derive(Debug, Args)]
pub struct DupArgs {
    /// Document name or id.
    pub document: String,
    /// Copy only the document record, not its columns and rows.
    #[arg(long)]
    pub no_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub id: String,
    pub name: String,
    pub pinned: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Document> for DocEntry {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.to_string(),
            name: document.name.clone(),
            pinned: document.is_pinned,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsResult {
    #[serde(default)]
    pub documents: Vec<DocEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RmResult {
    pub id: String,
    pub name: String,
    pub removed: CascadeReport,
}

pub async fn list<S: Store>(ctx: &Context<S>) -> anyhow::Result<LsResult> {
    let list = DocumentList::load(&*ctx.store).await?;
    Ok(LsResult { documents: list.documents().iter().map(DocEntry::from).collect() })
}

pub async fn ls<S: Store>(ctx: &Context<S>) -> anyhow::Result<()> {
    let result = list(ctx).await?;
    ctx.print(&result, format_ls)
}

pub async fn new<S: Store>(args: NewArgs, ctx: &Context<S>) -> anyhow::Result<()> {
    let document = admin::create_document(&*ctx.store, &args.name, ctx.author()).await?;
    ctx.print(&DocEntry::from(&document), |d| format!("Created {} ({})", d.name, d.id))
}

pub async fn rename<S: Store>(args: RenameArgs, ctx: &Context<S>) -> anyhow::Result<()> {
    let document = resolve::document(&*ctx.store, &args.document).await?;
    let renamed = admin::rename_document(&*ctx.store, document.id, &args.name).await?;
    ctx.print(&DocEntry::from(&renamed), |d| format!("Renamed to {}", d.name))
}

/// Pin through the optimistic list so a failed write leaves nothing
/// half-applied in what gets printed.
pub async fn set_pinned<S: Store>(
    document: &str,
    pinned: bool,
    ctx: &Context<S>,
) -> anyhow::Result<LsResult> {
    let mut list = DocumentList::load(&*ctx.store).await?;
    let id = resolve::in_list(list.documents(), document)?.id;
    list.set_pinned(&*ctx.store, id, pinned).await?;
    Ok(LsResult { documents: list.documents().iter().map(DocEntry::from).collect() })
}

pub async fn pin<S: Store>(args: DocArgs, pinned: bool, ctx: &Context<S>) -> anyhow::Result<()> {
    let result = set_pinned(&args.document, pinned, ctx).await?;
    ctx.print(&result, format_ls)
}

pub async fn dup<S: Store>(args: DupArgs, ctx: &Context<S>) -> anyhow::Result<()> {
    let source = resolve::document(&*ctx.store, &args.document).await?;
    let copy =
        admin::duplicate_document(&*ctx.store, source.id, !args.no_data, ctx.author()).await?;
    ctx.print(&DocEntry::from(&copy), |d| format!("Created {} ({})", d.name, d.id))
}

pub async fn remove<S: Store>(document: &str, ctx: &Context<S>) -> anyhow::Result<RmResult> {
    let document = resolve::document(&*ctx.store, document).await?;
    let removed = admin::delete_document(&*ctx.store, document.id, ctx.viewer()).await?;
    Ok(RmResult { id: document.id.to_string(), name: document.name, removed })
}

pub async fn rm<S: Store>(args: DocArgs, ctx: &Context<S>) -> anyhow::Result<()> {
    let result = remove(&args.document, ctx).await?;
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
    ctx.print(&result, format_rm)
}

fn format_ls(result: &LsResult) -> String {
    if result.documents.is_empty() {
        return "No documents. Create one with: griddoc new <name>".into();
    }
    let mut lines = vec![format!("{} document(s)", result.documents.len())];
    for d in &result.documents {
        let pin = if d.pinned { "*" } else { " " };
        lines.push(format!(
            "{pin} {}  {}  (updated {})",
            d.name,
            d.id,
            d.updated_at.format("%Y-%m-%d %H:%M")
        ));
    }
    lines.join("\n")
}

fn format_rm(result: &RmResult) -> String {
    let r = &result.removed;
    format!(
        "Deleted {}: {} column(s), {} row(s), {} cell(s), {} multiline entr{}",
        result.name,
        r.columns,
        r.rows,
        r.cells,
        r.multiline,
        if r.multiline == 1 { "y" } else { "ies" }
    )
}
