// Core domain types for tabular documents.
//
// Document is the root aggregate. Columns, rows and sub-columns hang off it;
// cells live at (row, column) intersections and own their multiline entries
// and file attachments.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permissions::Permissions;

/// Default width, in pixels, for newly created columns and sub-columns.
pub const DEFAULT_COLUMN_WIDTH: i32 = 150;

// ── Document ───────────────────────────────────────────────────────

/// A named tabular workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub default_permissions: Permissions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_id: Option<Uuid>,
    pub is_pinned: bool,
    /// Free-form theme settings (e.g. `header_bg` → `#1f2937`).
    #[serde(default)]
    pub theme: BTreeMap<String, String>,
}

impl Document {
    pub fn new(name: impl Into<String>, owner_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            is_active: true,
            default_permissions: Permissions::default(),
            created_at: now,
            updated_at: now,
            owner_id,
            is_pinned: false,
            theme: BTreeMap::new(),
        }
    }
}

// ── Columns ────────────────────────────────────────────────────────

/// The value type a column (or sub-column) holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Number,
    Date,
    Boolean,
    File,
    Multiline,
    Select,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        Self::Text,
        Self::Number,
        Self::Date,
        Self::Boolean,
        Self::File,
        Self::Multiline,
        Self::Select,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::File => "file",
            Self::Multiline => "multiline",
            Self::Select => "select",
        }
    }

    /// Container types hold no scalar value; their content lives in
    /// attachments or multiline entries.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::File | Self::Multiline)
    }

    /// Whether global search looks at values of this type.
    pub const fn is_searchable(self) -> bool {
        !self.is_container()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDataType(pub String);

impl fmt::Display for UnknownDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data type `{}`", self.0)
    }
}

impl std::error::Error for UnknownDataType {}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| UnknownDataType(s.to_string()))
    }
}

/// A typed field definition within a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: Uuid,
    pub document_id: Uuid,
    pub label: String,
    pub data_type: DataType,
    pub order_index: i32,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub width: i32,
    /// `None` inherits the document's default permissions.
    pub permissions: Option<Permissions>,
    /// Type-specific settings, e.g. `{"options": ["a", "b"]}` for select.
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

impl Column {
    pub fn new(
        document_id: Uuid,
        label: impl Into<String>,
        data_type: DataType,
        order_index: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            label: label.into(),
            data_type,
            order_index,
            background_color: None,
            text_color: None,
            width: DEFAULT_COLUMN_WIDTH,
            permissions: None,
            config: empty_config(),
        }
    }

    /// Permissions in effect for this column.
    pub fn effective_permissions<'a>(&'a self, document: &'a Document) -> &'a Permissions {
        self.permissions.as_ref().unwrap_or(&document.default_permissions)
    }

    /// Option list for select columns (empty for every other type).
    pub fn select_options(&self) -> Vec<String> {
        self.config
            .get("options")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default()
    }
}

/// One field of the repeated record inside a multiline column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubColumn {
    pub id: Uuid,
    pub parent_column_id: Uuid,
    pub label: String,
    pub data_type: DataType,
    pub order_index: i32,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub width: i32,
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

impl SubColumn {
    pub fn new(
        parent_column_id: Uuid,
        label: impl Into<String>,
        data_type: DataType,
        order_index: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_column_id,
            label: label.into(),
            data_type,
            order_index,
            background_color: None,
            text_color: None,
            width: DEFAULT_COLUMN_WIDTH,
            config: empty_config(),
        }
    }
}

pub fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// ── Rows and cells ─────────────────────────────────────────────────

/// One ordered record within a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Row {
    pub id: Uuid,
    pub document_id: Uuid,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

impl Row {
    pub fn new(document_id: Uuid, order_index: i32, author: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            document_id,
            order_index,
            created_at: now,
            updated_at: now,
            created_by: author,
            updated_by: author,
        }
    }
}

/// A typed cell value. The variant is the value type, so exactly one
/// value slot can ever be populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Boolean(bool),
    Select(String),
    /// Container for file attachments.
    File,
    /// Container for multiline entries.
    Multiline,
}

impl CellValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Text(_) => DataType::Text,
            Self::Number(_) => DataType::Number,
            Self::Date(_) => DataType::Date,
            Self::Boolean(_) => DataType::Boolean,
            Self::Select(_) => DataType::Select,
            Self::File => DataType::File,
            Self::Multiline => DataType::Multiline,
        }
    }

    /// The value a freshly created cell of `data_type` starts with. Dates
    /// have no blank form and stay absent until set.
    pub fn empty(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Text => Some(Self::Text(String::new())),
            DataType::Number => Some(Self::Number(0.0)),
            DataType::Date => None,
            DataType::Boolean => Some(Self::Boolean(false)),
            DataType::Select => Some(Self::Select(String::new())),
            DataType::File => Some(Self::File),
            DataType::Multiline => Some(Self::Multiline),
        }
    }

    /// Parse user input into a value of `data_type`.
    pub fn parse(data_type: DataType, input: &str) -> Option<Self> {
        let trimmed = input.trim();
        match data_type {
            DataType::Text => Some(Self::Text(input.to_string())),
            DataType::Select => Some(Self::Select(input.to_string())),
            DataType::Number => trimmed.parse::<f64>().ok().filter(|n| n.is_finite()).map(Self::Number),
            DataType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok().map(Self::Date),
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Self::Boolean(true)),
                "false" | "no" | "0" => Some(Self::Boolean(false)),
                _ => None,
            },
            DataType::File | DataType::Multiline => None,
        }
    }

    /// Coerced string form used for display and search.
    pub fn display(&self) -> String {
        match self {
            Self::Text(s) | Self::Select(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::File | Self::Multiline => String::new(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// The value at one (row, column) intersection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellData {
    pub id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub value: CellValue,
}

impl CellData {
    pub fn new(row_id: Uuid, column_id: Uuid, value: CellValue) -> Self {
        Self { id: Uuid::new_v4(), row_id, column_id, value }
    }
}

/// One field of one repeated record inside a multiline cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultilineData {
    pub id: Uuid,
    pub cell_id: Uuid,
    pub sub_column_id: Uuid,
    /// Position of the repeated record this field belongs to.
    pub order_index: i32,
    pub value: CellValue,
}

impl MultilineData {
    pub fn new(cell_id: Uuid, sub_column_id: Uuid, order_index: i32, value: CellValue) -> Self {
        Self { id: Uuid::new_v4(), cell_id, sub_column_id, order_index, value }
    }
}

// ── Attachments ────────────────────────────────────────────────────

/// What a file attachment hangs off. Exactly one owner, never both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttachmentTarget {
    Cell(Uuid),
    Multiline(Uuid),
}

/// Metadata for a stored file. The blob itself lives at `storage_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAttachment {
    pub id: Uuid,
    pub target: AttachmentTarget,
    pub storage_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
    pub order_index: i32,
}
