// CLI subcommand dispatch.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Subcommand;
use griddoc_common::Viewer;
use griddoc_editor::EditorConfig;
use griddoc_store::db::pool::create_pg_pool;
use griddoc_store::{PgStore, Store, StoreError};
use serde::Serialize;
use uuid::Uuid;

use crate::exit_code::UsageError;
use crate::output::{self, OutputFormat};

pub mod col;
pub mod documents;
pub mod migrate;
pub mod resolve;
pub mod row;
pub mod set;
pub mod show;

#[derive(Subcommand)]
pub enum Command {
    /// Apply database migrations
    Migrate,
    /// List documents
    Ls,
    /// Create a document
    New(documents::NewArgs),
    /// Show a document as a table
    Show(show::ShowArgs),
    /// Set one cell and save
    Set(set::SetArgs),
    /// Rename a document
    Rename(documents::RenameArgs),
    /// Pin a document to the top of the list
    Pin(documents::DocArgs),
    /// Unpin a document
    Unpin(documents::DocArgs),
    /// Duplicate a document
    Dup(documents::DupArgs),
    /// Delete a document and everything in it
    Rm(documents::DocArgs),
    /// Column operations
    #[command(subcommand)]
    Col(col::ColCommand),
    /// Row operations
    #[command(subcommand)]
    Row(row::RowCommand),
}

/// What every command gets besides its own arguments.
pub struct Context<S> {
    pub store: Arc<S>,
    pub config: EditorConfig,
    pub format: OutputFormat,
}

impl<S: Store> Context<S> {
    pub fn viewer(&self) -> Viewer {
        self.config.viewer()
    }

    pub fn author(&self) -> Option<Uuid> {
        self.config.user_id
    }

    pub fn print<T, F>(&self, value: &T, human_fn: F) -> anyhow::Result<()>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        output::print_output(self.format, value, human_fn).context("failed to write output")
    }

    pub fn warn(&self, code: &str, message: &str) {
        output::print_warning(self.format, code, message);
    }
}

/// Connect to the configured database and run `cmd`.
pub async fn run(cmd: Command, config: EditorConfig, format: OutputFormat) -> anyhow::Result<()> {
    let url = config.database_url.clone().ok_or_else(|| {
        UsageError(
            "no database configured: set GRIDDOC_DATABASE_URL or database_url in \
             ~/.griddoc/config.toml"
                .into(),
        )
    })?;
    let pool = create_pg_pool(&url, &config.pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("{e:#}")))?;
    let store = PgStore::new(pool);

    if let Command::Migrate = cmd {
        return migrate::run(&store, &url, format).await;
    }
    let ctx = Context { store: Arc::new(store), config, format };
    dispatch(cmd, &ctx).await
}

pub async fn dispatch<S: Store>(cmd: Command, ctx: &Context<S>) -> anyhow::Result<()> {
    match cmd {
        Command::Migrate => {
            Err(UsageError("migrations only apply to a PostgreSQL store".into()).into())
        }
        Command::Ls => documents::ls(ctx).await,
        Command::New(args) => documents::new(args, ctx).await,
        Command::Show(args) => show::run(args, ctx).await,
        Command::Set(args) => set::run(args, ctx).await,
        Command::Rename(args) => documents::rename(args, ctx).await,
        Command::Pin(args) => documents::pin(args, true, ctx).await,
        Command::Unpin(args) => documents::pin(args, false, ctx).await,
        Command::Dup(args) => documents::dup(args, ctx).await,
        Command::Rm(args) => documents::rm(args, ctx).await,
        Command::Col(cmd) => col::run(cmd, ctx).await,
        Command::Row(cmd) => row::run(cmd, ctx).await,
    }
}
