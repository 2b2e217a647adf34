// `griddoc show`: print a document's rows through the filter/sort engine.

use clap::Args;
use griddoc_common::{
    AttachmentTarget, CellValue, Column, ColumnFilter, DataType, FilterOp, SortDirection,
    SortDirective, ViewQuery,
};
use griddoc_editor::EditorSession;
use griddoc_store::Store;
use serde::{Deserialize, Serialize};

use super::{resolve, Context};
use crate::exit_code::UsageError;
use crate::output::render_table;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Document name or id.
    pub document: String,
    /// Keep rows where any searchable column contains this text.
    #[arg(long, short)]
    pub search: Option<String>,
    /// Column filter: `Col~text`, `Col=value`, `Col>=x`, `Col<=x`,
    /// `Col:empty` or `Col:set`. Repeatable; all must match.
    #[arg(long = "filter", short = 'f', value_name = "EXPR")]
    pub filters: Vec<String>,
    /// Sort by this column.
    #[arg(long, value_name = "COLUMN")]
    pub sort: Option<String>,
    /// Sort descending.
    #[arg(long, requires = "sort")]
    pub desc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowResult {
    pub document: String,
    pub id: String,
    pub columns: Vec<String>,
    pub rows: Vec<ShowRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowRow {
    pub id: String,
    /// 1-based position in stored row order, usable as a row reference.
    pub position: usize,
    pub values: Vec<String>,
}

pub async fn run<S: Store>(args: ShowArgs, ctx: &Context<S>) -> anyhow::Result<()> {
    let result = execute(&args, ctx).await?;
    ctx.print(&result, format_human)
}

pub async fn execute<S: Store>(args: &ShowArgs, ctx: &Context<S>) -> anyhow::Result<ShowResult> {
    let document = resolve::document(&*ctx.store, &args.document).await?;
    let session = EditorSession::load(&*ctx.store, document.id, ctx.viewer()).await?;
    let columns: Vec<&Column> = session.visible_columns();

    let mut query =
        ViewQuery { search: args.search.clone().unwrap_or_default(), ..ViewQuery::default() };
    for expr in &args.filters {
        query.filters.push(parse_filter(expr, columns.iter().copied())?);
    }
    if let Some(key) = &args.sort {
        let column = resolve::column(columns.iter().copied(), key)?;
        let direction = if args.desc { SortDirection::Desc } else { SortDirection::Asc };
        query.sort = Some(SortDirective { column_id: column.id, direction });
    }

    let rows = session
        .view(&query)
        .into_iter()
        .map(|row| {
            let position =
                session.rows().iter().position(|r| r.id == row.id).map_or(0, |i| i + 1);
            let values =
                columns.iter().map(|column| render_cell(&session, row.id, column)).collect();
            ShowRow { id: row.id.to_string(), position, values }
        })
        .collect();

    Ok(ShowResult {
        document: session.document().name.clone(),
        id: document.id.to_string(),
        columns: columns.iter().map(|c| c.label.clone()).collect(),
        rows,
    })
}

fn render_cell(session: &EditorSession, row_id: uuid::Uuid, column: &Column) -> String {
    let Some(cell) = session.cell(row_id, column.id) else {
        return String::new();
    };
    match &cell.value {
        CellValue::Multiline => match session.multiline_records(cell.id).len() {
            0 => String::new(),
            1 => "1 record".into(),
            n => format!("{n} records"),
        },
        CellValue::File => match session.files_for(AttachmentTarget::Cell(cell.id)).len() {
            0 => String::new(),
            1 => "1 file".into(),
            n => format!("{n} files"),
        },
        value => value.display(),
    }
}

/// Parse one `--filter` expression against the visible columns.
pub fn parse_filter<'a, I>(expr: &str, columns: I) -> anyhow::Result<ColumnFilter>
where
    I: IntoIterator<Item = &'a Column>,
{
    let expr = expr.trim();
    let presence = [(":empty", FilterOp::IsEmpty), (":set", FilterOp::NotEmpty)]
        .into_iter()
        .find_map(|(suffix, op)| expr.strip_suffix(suffix).map(|label| (label, op)));
    if let Some((label, op)) = presence {
        let column = resolve::column(columns, label)?;
        return Ok(ColumnFilter { column_id: column.id, op });
    }

    let (label, operator, value) = split_operator(expr).ok_or_else(|| {
        UsageError(format!(
            "invalid filter `{expr}`: expected Col~text, Col=value, Col>=x, Col<=x, \
             Col:empty or Col:set"
        ))
    })?;
    let column = resolve::column(columns, label)?;
    let value = value.trim();
    let op = match operator {
        "~" => FilterOp::Contains(value.to_string()),
        "=" => match column.data_type {
            DataType::Boolean => match CellValue::parse(DataType::Boolean, value) {
                Some(CellValue::Boolean(b)) => FilterOp::Boolean(b),
                _ => return Err(bad_value(column, value)),
            },
            DataType::Select => {
                FilterOp::OneOf(value.split('|').map(|s| s.trim().to_string()).collect())
            }
            _ => FilterOp::Equals(value.to_string()),
        },
        bound => range(column, bound == ">=", value)?,
    };
    Ok(ColumnFilter { column_id: column.id, op })
}

fn split_operator(expr: &str) -> Option<(&str, &str, &str)> {
    ["~", ">=", "<=", "="]
        .into_iter()
        .filter_map(|op| expr.find(op).map(|at| (at, op)))
        .min_by_key(|(at, op)| (*at, std::cmp::Reverse(op.len())))
        .map(|(at, op)| (&expr[..at], op, &expr[at + op.len()..]))
}

fn range(column: &Column, lower: bool, value: &str) -> anyhow::Result<FilterOp> {
    let parsed = CellValue::parse(column.data_type, value);
    match (column.data_type, parsed) {
        (DataType::Number, Some(CellValue::Number(n))) => Ok(if lower {
            FilterOp::NumberRange { min: Some(n), max: None }
        } else {
            FilterOp::NumberRange { min: None, max: Some(n) }
        }),
        (DataType::Date, Some(CellValue::Date(d))) => Ok(if lower {
            FilterOp::DateRange { from: Some(d), to: None }
        } else {
            FilterOp::DateRange { from: None, to: Some(d) }
        }),
        (DataType::Number | DataType::Date, _) => Err(bad_value(column, value)),
        _ => Err(UsageError(format!(
            "range filters need a number or date column; `{}` is {}",
            column.label, column.data_type
        ))
        .into()),
    }
}

fn bad_value(column: &Column, value: &str) -> anyhow::Error {
    UsageError(format!("`{value}` is not a valid {} for `{}`", column.data_type, column.label))
        .into()
}

fn format_human(result: &ShowResult) -> String {
    let mut headers = vec!["#".to_string()];
    headers.extend(result.columns.iter().cloned());
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            let mut line = vec![row.position.to_string()];
            line.extend(row.values.iter().cloned());
            line
        })
        .collect();
    format!(
        "{}\n\n{}\n{} row(s)",
        result.document,
        render_table(&headers, &rows),
        result.rows.len()
    )
}
