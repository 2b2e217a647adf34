// Postgres-backed store.
//
// Every multi-statement write (batch upsert or cascade) runs inside one
// transaction. Foreign keys in the schema do not cascade; the cascade
// helpers below delete leaf records first and collect attachment paths as
// they go.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use griddoc_common::{
    AttachmentTarget, CellRecord, Column, DataType, Document, FileAttachment, MultilineRecord,
    Permissions, Row, SubColumn, ValueSlots,
};
use sqlx::{types::Json, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{CascadeReport, Store, StoreError};

/// Records per multi-row upsert. Nine binds each keeps a statement well
/// under Postgres's 65535 parameter limit.
const UPSERT_CHUNK: usize = 1000;

/// One record per id, the last one given. A single `ON CONFLICT` statement
/// cannot touch the same row twice.
fn last_per_id<T>(items: &[T], id: impl Fn(&T) -> Uuid) -> Vec<&T> {
    let mut seen = HashSet::new();
    let mut kept: Vec<&T> = items.iter().rev().filter(|item| seen.insert(id(item))).collect();
    kept.reverse();
    kept
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_active: bool,
    default_permissions: Json<Permissions>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_id: Option<Uuid>,
    is_pinned: bool,
    theme: Json<BTreeMap<String, String>>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            default_permissions: row.default_permissions.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            owner_id: row.owner_id,
            is_pinned: row.is_pinned,
            theme: row.theme.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    id: Uuid,
    document_id: Uuid,
    label: String,
    data_type: String,
    order_index: i32,
    background_color: Option<String>,
    text_color: Option<String>,
    width: i32,
    permissions: Option<Json<Permissions>>,
    config: serde_json::Value,
}

impl TryFrom<ColumnRow> for Column {
    type Error = StoreError;

    fn try_from(row: ColumnRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            document_id: row.document_id,
            label: row.label,
            data_type: parse_data_type(&row.data_type)?,
            order_index: row.order_index,
            background_color: row.background_color,
            text_color: row.text_color,
            width: row.width,
            permissions: row.permissions.map(|p| p.0),
            config: row.config,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubColumnRow {
    id: Uuid,
    parent_column_id: Uuid,
    label: String,
    data_type: String,
    order_index: i32,
    background_color: Option<String>,
    text_color: Option<String>,
    width: i32,
    config: serde_json::Value,
}

impl TryFrom<SubColumnRow> for SubColumn {
    type Error = StoreError;

    fn try_from(row: SubColumnRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            parent_column_id: row.parent_column_id,
            label: row.label,
            data_type: parse_data_type(&row.data_type)?,
            order_index: row.order_index,
            background_color: row.background_color,
            text_color: row.text_color,
            width: row.width,
            config: row.config,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RowRow {
    id: Uuid,
    document_id: Uuid,
    order_index: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
}

impl From<RowRow> for Row {
    fn from(row: RowRow) -> Self {
        Self {
            id: row.id,
            document_id: row.document_id,
            order_index: row.order_index,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SlotColumns {
    value_type: String,
    text_value: Option<String>,
    number_value: Option<f64>,
    date_value: Option<NaiveDate>,
    boolean_value: Option<bool>,
}

impl TryFrom<SlotColumns> for ValueSlots {
    type Error = StoreError;

    fn try_from(row: SlotColumns) -> Result<Self, Self::Error> {
        Ok(Self {
            value_type: parse_data_type(&row.value_type)?,
            text_value: row.text_value,
            number_value: row.number_value,
            date_value: row.date_value,
            boolean_value: row.boolean_value,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CellRow {
    id: Uuid,
    row_id: Uuid,
    column_id: Uuid,
    #[sqlx(flatten)]
    slots: SlotColumns,
}

impl TryFrom<CellRow> for CellRecord {
    type Error = StoreError;

    fn try_from(row: CellRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            row_id: row.row_id,
            column_id: row.column_id,
            slots: row.slots.try_into()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MultilineRow {
    id: Uuid,
    cell_id: Uuid,
    sub_column_id: Uuid,
    order_index: i32,
    #[sqlx(flatten)]
    slots: SlotColumns,
}

impl TryFrom<MultilineRow> for MultilineRecord {
    type Error = StoreError;

    fn try_from(row: MultilineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            cell_id: row.cell_id,
            sub_column_id: row.sub_column_id,
            order_index: row.order_index,
            slots: row.slots.try_into()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    cell_id: Option<Uuid>,
    multiline_id: Option<Uuid>,
    storage_path: String,
    file_name: String,
    mime_type: String,
    size_bytes: i64,
    uploaded_by: Option<Uuid>,
    uploaded_at: DateTime<Utc>,
    order_index: i32,
}

impl TryFrom<FileRow> for FileAttachment {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let target = match (row.cell_id, row.multiline_id) {
            (Some(cell), None) => AttachmentTarget::Cell(cell),
            (None, Some(entry)) => AttachmentTarget::Multiline(entry),
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "file {} must reference exactly one cell or multiline entry",
                    row.id
                )))
            }
        };
        Ok(Self {
            id: row.id,
            target,
            storage_path: row.storage_path,
            file_name: row.file_name,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
            order_index: row.order_index,
        })
    }
}

fn parse_data_type(raw: &str) -> Result<DataType, StoreError> {
    raw.parse::<DataType>().map_err(|error| StoreError::Corrupt(error.to_string()))
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() || db_error.is_foreign_key_violation() {
            return StoreError::Conflict(db_error.message().to_string());
        }
    }
    StoreError::Database(error)
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    R: TryInto<T, Error = StoreError>,
{
    rows.into_iter().map(TryInto::try_into).collect()
}

// ── Cascade helpers ────────────────────────────────────────────────

async fn purge_multiline(
    conn: &mut PgConnection,
    ids: &[Uuid],
    report: &mut CascadeReport,
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let paths = sqlx::query_scalar::<_, String>(
        "DELETE FROM file_attachments WHERE multiline_id = ANY($1) RETURNING storage_path",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    report.files.extend(paths);

    let removed = sqlx::query("DELETE FROM multiline_data WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();
    report.multiline += removed as usize;
    Ok(())
}

async fn purge_cells(
    conn: &mut PgConnection,
    ids: &[Uuid],
    report: &mut CascadeReport,
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let entries =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM multiline_data WHERE cell_id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
    purge_multiline(conn, &entries, report).await?;

    let paths = sqlx::query_scalar::<_, String>(
        "DELETE FROM file_attachments WHERE cell_id = ANY($1) RETURNING storage_path",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    report.files.extend(paths);

    let removed = sqlx::query("DELETE FROM cell_data WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();
    report.cells += removed as usize;
    Ok(())
}

async fn purge_sub_columns(
    conn: &mut PgConnection,
    ids: &[Uuid],
    report: &mut CascadeReport,
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let entries = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM multiline_data WHERE sub_column_id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    purge_multiline(conn, &entries, report).await?;

    let removed = sqlx::query("DELETE FROM sub_columns WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();
    report.sub_columns += removed as usize;
    Ok(())
}

async fn purge_columns(
    conn: &mut PgConnection,
    ids: &[Uuid],
    report: &mut CascadeReport,
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let cells =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM cell_data WHERE column_id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
    purge_cells(conn, &cells, report).await?;

    let subs = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM sub_columns WHERE parent_column_id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    purge_sub_columns(conn, &subs, report).await?;

    let removed = sqlx::query("DELETE FROM document_columns WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();
    report.columns += removed as usize;
    Ok(())
}

async fn purge_rows(
    conn: &mut PgConnection,
    ids: &[Uuid],
    report: &mut CascadeReport,
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let cells = sqlx::query_scalar::<_, Uuid>("SELECT id FROM cell_data WHERE row_id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    purge_cells(conn, &cells, report).await?;

    let removed = sqlx::query("DELETE FROM document_rows WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();
    report.rows += removed as usize;
    Ok(())
}

async fn exists(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
) -> Result<(), StoreError> {
    let found = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"
    ))
    .bind(id)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    if found {
        Ok(())
    } else {
        Err(StoreError::not_found(entity, id))
    }
}

// ── Store impl ─────────────────────────────────────────────────────

const DOCUMENT_COLUMNS: &str = "id, name, description, is_active, default_permissions, \
     created_at, updated_at, owner_id, is_pinned, theme";
const COLUMN_COLUMNS: &str = "id, document_id, label, data_type, order_index, \
     background_color, text_color, width, permissions, config";
const SUB_COLUMN_COLUMNS: &str = "id, parent_column_id, label, data_type, order_index, \
     background_color, text_color, width, config";
const SLOT_COLUMNS: &str = "value_type, text_value, number_value, date_value, boolean_value";

impl Store for PgStore {
    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE is_active \
             ORDER BY is_pinned DESC, updated_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn fetch_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Document::from))
    }

    async fn fetch_columns(&self, document_id: Uuid) -> Result<Vec<Column>, StoreError> {
        let rows = sqlx::query_as::<_, ColumnRow>(&format!(
            "SELECT {COLUMN_COLUMNS} FROM document_columns \
             WHERE document_id = $1 ORDER BY order_index, id"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn fetch_sub_columns(&self, column_ids: &[Uuid]) -> Result<Vec<SubColumn>, StoreError> {
        if column_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SubColumnRow>(&format!(
            "SELECT {SUB_COLUMN_COLUMNS} FROM sub_columns \
             WHERE parent_column_id = ANY($1) ORDER BY order_index, id"
        ))
        .bind(column_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn fetch_rows(&self, document_id: Uuid) -> Result<Vec<Row>, StoreError> {
        let rows = sqlx::query_as::<_, RowRow>(
            r#"
            SELECT id, document_id, order_index, created_at, updated_at, created_by, updated_by
            FROM document_rows
            WHERE document_id = $1
            ORDER BY order_index, id
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Row::from).collect())
    }

    async fn fetch_cells_by_row_ids(&self, row_ids: &[Uuid]) -> Result<Vec<CellRecord>, StoreError> {
        if row_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CellRow>(&format!(
            "SELECT id, row_id, column_id, {SLOT_COLUMNS} FROM cell_data \
             WHERE row_id = ANY($1) ORDER BY row_id, column_id"
        ))
        .bind(row_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn fetch_multiline_by_cell_ids(
        &self,
        cell_ids: &[Uuid],
    ) -> Result<Vec<MultilineRecord>, StoreError> {
        if cell_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MultilineRow>(&format!(
            "SELECT id, cell_id, sub_column_id, order_index, {SLOT_COLUMNS} FROM multiline_data \
             WHERE cell_id = ANY($1) ORDER BY cell_id, order_index, sub_column_id"
        ))
        .bind(cell_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn fetch_files(
        &self,
        cell_ids: &[Uuid],
        multiline_ids: &[Uuid],
    ) -> Result<Vec<FileAttachment>, StoreError> {
        if cell_ids.is_empty() && multiline_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, cell_id, multiline_id, storage_path, file_name, mime_type,
                   size_bytes, uploaded_by, uploaded_at, order_index
            FROM file_attachments
            WHERE cell_id = ANY($1) OR multiline_id = ANY($2)
            ORDER BY order_index, id
            "#,
        )
        .bind(cell_ids)
        .bind(multiline_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        collect(rows)
    }

    async fn upsert_document(&self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, name, description, is_active, default_permissions,
                                   created_at, updated_at, owner_id, is_pinned, theme)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                is_active = EXCLUDED.is_active,
                default_permissions = EXCLUDED.default_permissions,
                updated_at = EXCLUDED.updated_at,
                owner_id = EXCLUDED.owner_id,
                is_pinned = EXCLUDED.is_pinned,
                theme = EXCLUDED.theme
            "#,
        )
        .bind(document.id)
        .bind(&document.name)
        .bind(&document.description)
        .bind(document.is_active)
        .bind(Json(&document.default_permissions))
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(document.owner_id)
        .bind(document.is_pinned)
        .bind(Json(&document.theme))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn upsert_columns(&self, columns: &[Column]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for column in columns {
            sqlx::query(
                r#"
                INSERT INTO document_columns (id, document_id, label, data_type, order_index,
                                              background_color, text_color, width, permissions, config)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO UPDATE
                SET label = EXCLUDED.label,
                    data_type = EXCLUDED.data_type,
                    order_index = EXCLUDED.order_index,
                    background_color = EXCLUDED.background_color,
                    text_color = EXCLUDED.text_color,
                    width = EXCLUDED.width,
                    permissions = EXCLUDED.permissions,
                    config = EXCLUDED.config
                "#,
            )
            .bind(column.id)
            .bind(column.document_id)
            .bind(&column.label)
            .bind(column.data_type.as_str())
            .bind(column.order_index)
            .bind(&column.background_color)
            .bind(&column.text_color)
            .bind(column.width)
            .bind(column.permissions.as_ref().map(Json))
            .bind(&column.config)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn upsert_sub_columns(&self, sub_columns: &[SubColumn]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for sub in sub_columns {
            sqlx::query(
                r#"
                INSERT INTO sub_columns (id, parent_column_id, label, data_type, order_index,
                                         background_color, text_color, width, config)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE
                SET label = EXCLUDED.label,
                    data_type = EXCLUDED.data_type,
                    order_index = EXCLUDED.order_index,
                    background_color = EXCLUDED.background_color,
                    text_color = EXCLUDED.text_color,
                    width = EXCLUDED.width,
                    config = EXCLUDED.config
                "#,
            )
            .bind(sub.id)
            .bind(sub.parent_column_id)
            .bind(&sub.label)
            .bind(sub.data_type.as_str())
            .bind(sub.order_index)
            .bind(&sub.background_color)
            .bind(&sub.text_color)
            .bind(sub.width)
            .bind(&sub.config)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn upsert_rows(&self, rows: &[Row]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO document_rows (id, document_id, order_index, created_at, updated_at,
                                           created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE
                SET order_index = EXCLUDED.order_index,
                    updated_at = EXCLUDED.updated_at,
                    updated_by = EXCLUDED.updated_by
                "#,
            )
            .bind(row.id)
            .bind(row.document_id)
            .bind(row.order_index)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(row.created_by)
            .bind(row.updated_by)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn upsert_cells(&self, cells: &[CellRecord]) -> Result<(), StoreError> {
        if cells.is_empty() {
            return Ok(());
        }
        let cells = last_per_id(cells, |cell| cell.id);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for chunk in cells.chunks(UPSERT_CHUNK) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO cell_data (id, row_id, column_id, value_type, \
                 text_value, number_value, date_value, boolean_value) ",
            );
            query.push_values(chunk, |mut values, cell| {
                let slots = &cell.slots;
                values
                    .push_bind(cell.id)
                    .push_bind(cell.row_id)
                    .push_bind(cell.column_id)
                    .push_bind(slots.value_type.as_str())
                    .push_bind(slots.text_value.clone())
                    .push_bind(slots.number_value)
                    .push_bind(slots.date_value)
                    .push_bind(slots.boolean_value);
            });
            query.push(
                " ON CONFLICT (id) DO UPDATE \
                 SET value_type = EXCLUDED.value_type, \
                     text_value = EXCLUDED.text_value, \
                     number_value = EXCLUDED.number_value, \
                     date_value = EXCLUDED.date_value, \
                     boolean_value = EXCLUDED.boolean_value",
            );
            query.build().execute(&mut *tx).await.map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(cells = cells.len(), "upserted cells");
        Ok(())
    }

    async fn upsert_multiline(&self, records: &[MultilineRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let records = last_per_id(records, |record| record.id);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for chunk in records.chunks(UPSERT_CHUNK) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO multiline_data (id, cell_id, sub_column_id, order_index, value_type, \
                 text_value, number_value, date_value, boolean_value) ",
            );
            query.push_values(chunk, |mut values, record| {
                let slots = &record.slots;
                values
                    .push_bind(record.id)
                    .push_bind(record.cell_id)
                    .push_bind(record.sub_column_id)
                    .push_bind(record.order_index)
                    .push_bind(slots.value_type.as_str())
                    .push_bind(slots.text_value.clone())
                    .push_bind(slots.number_value)
                    .push_bind(slots.date_value)
                    .push_bind(slots.boolean_value);
            });
            query.push(
                " ON CONFLICT (id) DO UPDATE \
                 SET order_index = EXCLUDED.order_index, \
                     value_type = EXCLUDED.value_type, \
                     text_value = EXCLUDED.text_value, \
                     number_value = EXCLUDED.number_value, \
                     date_value = EXCLUDED.date_value, \
                     boolean_value = EXCLUDED.boolean_value",
            );
            query.build().execute(&mut *tx).await.map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(records = records.len(), "upserted multiline entries");
        Ok(())
    }

    async fn insert_file(&self, file: &FileAttachment) -> Result<(), StoreError> {
        let (cell_id, multiline_id) = match file.target {
            AttachmentTarget::Cell(id) => (Some(id), None),
            AttachmentTarget::Multiline(id) => (None, Some(id)),
        };
        sqlx::query(
            r#"
            INSERT INTO file_attachments (id, cell_id, multiline_id, storage_path, file_name,
                                          mime_type, size_bytes, uploaded_by, uploaded_at, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(file.id)
        .bind(cell_id)
        .bind(multiline_id)
        .bind(&file.storage_path)
        .bind(&file.file_name)
        .bind(&file.mime_type)
        .bind(file.size_bytes)
        .bind(file.uploaded_by)
        .bind(file.uploaded_at)
        .bind(file.order_index)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        exists(&mut tx, "documents", "document", id).await?;
        let mut report = CascadeReport::default();

        let rows = sqlx::query_scalar::<_, Uuid>("SELECT id FROM document_rows WHERE document_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        purge_rows(&mut tx, &rows, &mut report).await?;

        let columns =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM document_columns WHERE document_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        purge_columns(&mut tx, &columns, &mut report).await?;

        report.documents = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected() as usize;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn delete_column(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        exists(&mut tx, "document_columns", "column", id).await?;
        let mut report = CascadeReport::default();
        purge_columns(&mut tx, &[id], &mut report).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn delete_sub_column(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        exists(&mut tx, "sub_columns", "sub-column", id).await?;
        let mut report = CascadeReport::default();
        purge_sub_columns(&mut tx, &[id], &mut report).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn delete_row(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        exists(&mut tx, "document_rows", "row", id).await?;
        let mut report = CascadeReport::default();
        purge_rows(&mut tx, &[id], &mut report).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn delete_multiline(&self, ids: &[Uuid]) -> Result<CascadeReport, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut report = CascadeReport::default();
        purge_multiline(&mut tx, ids, &mut report).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn delete_file(&self, id: Uuid) -> Result<CascadeReport, StoreError> {
        let path = sqlx::query_scalar::<_, String>(
            "DELETE FROM file_attachments WHERE id = $1 RETURNING storage_path",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StoreError::not_found("file", id))?;
        Ok(CascadeReport { files: vec![path], ..CascadeReport::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_ids_keep_the_last_record_in_place() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let items = [(a, 1), (b, 2), (a, 3)];
        let kept = last_per_id(&items, |item| item.0);
        assert_eq!(kept, vec![&(b, 2), &(a, 3)]);
    }
}
