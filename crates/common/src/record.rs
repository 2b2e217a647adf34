// Flat "typed slot" records: the shape cells and multiline entries take on
// the wire and in the store.
//
// Exactly one of text/number/date/boolean is populated and it must match
// `value_type`. Container types (file, multiline) populate none.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{CellData, CellValue, DataType, MultilineData};

const TEXT_SLOT: &str = "text_value";
const NUMBER_SLOT: &str = "number_value";
const DATE_SLOT: &str = "date_value";
const BOOLEAN_SLOT: &str = "boolean_value";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("more than one value slot populated for value_type {value_type}: {slots:?}")]
    MultipleSlots { value_type: DataType, slots: Vec<&'static str> },

    #[error("{slot} populated but value_type is {value_type}")]
    SlotMismatch { value_type: DataType, slot: &'static str },

    #[error("no value slot populated for value_type {value_type}")]
    MissingSlot { value_type: DataType },
}

/// The four nullable value columns plus the tag saying which one is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSlots {
    pub value_type: DataType,
    pub text_value: Option<String>,
    pub number_value: Option<f64>,
    pub date_value: Option<NaiveDate>,
    pub boolean_value: Option<bool>,
}

impl ValueSlots {
    pub fn encode(value: &CellValue) -> Self {
        let mut slots = Self {
            value_type: value.data_type(),
            text_value: None,
            number_value: None,
            date_value: None,
            boolean_value: None,
        };
        match value {
            CellValue::Text(s) | CellValue::Select(s) => slots.text_value = Some(s.clone()),
            CellValue::Number(n) => slots.number_value = Some(*n),
            CellValue::Date(d) => slots.date_value = Some(*d),
            CellValue::Boolean(b) => slots.boolean_value = Some(*b),
            CellValue::File | CellValue::Multiline => {}
        }
        slots
    }

    fn populated(&self) -> Vec<&'static str> {
        let mut slots = Vec::new();
        if self.text_value.is_some() {
            slots.push(TEXT_SLOT);
        }
        if self.number_value.is_some() {
            slots.push(NUMBER_SLOT);
        }
        if self.date_value.is_some() {
            slots.push(DATE_SLOT);
        }
        if self.boolean_value.is_some() {
            slots.push(BOOLEAN_SLOT);
        }
        slots
    }

    pub fn decode(&self) -> Result<CellValue, DecodeError> {
        let value_type = self.value_type;
        let populated = self.populated();
        if populated.len() > 1 {
            return Err(DecodeError::MultipleSlots { value_type, slots: populated });
        }

        let expected = expected_slot(value_type);
        match (populated.first().copied(), expected) {
            (Some(slot), Some(expected)) if slot != expected => {
                return Err(DecodeError::SlotMismatch { value_type, slot });
            }
            (Some(slot), None) => return Err(DecodeError::SlotMismatch { value_type, slot }),
            (None, Some(_)) => return Err(DecodeError::MissingSlot { value_type }),
            _ => {}
        }

        let missing = || DecodeError::MissingSlot { value_type };
        Ok(match value_type {
            DataType::Text => CellValue::Text(self.text_value.clone().ok_or_else(missing)?),
            DataType::Select => CellValue::Select(self.text_value.clone().ok_or_else(missing)?),
            DataType::Number => CellValue::Number(self.number_value.ok_or_else(missing)?),
            DataType::Date => CellValue::Date(self.date_value.ok_or_else(missing)?),
            DataType::Boolean => CellValue::Boolean(self.boolean_value.ok_or_else(missing)?),
            DataType::File => CellValue::File,
            DataType::Multiline => CellValue::Multiline,
        })
    }
}

fn expected_slot(value_type: DataType) -> Option<&'static str> {
    match value_type {
        DataType::Text | DataType::Select => Some(TEXT_SLOT),
        DataType::Number => Some(NUMBER_SLOT),
        DataType::Date => Some(DATE_SLOT),
        DataType::Boolean => Some(BOOLEAN_SLOT),
        DataType::File | DataType::Multiline => None,
    }
}

// ── Cell records ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    #[serde(flatten)]
    pub slots: ValueSlots,
}

impl From<&CellData> for CellRecord {
    fn from(cell: &CellData) -> Self {
        Self {
            id: cell.id,
            row_id: cell.row_id,
            column_id: cell.column_id,
            slots: ValueSlots::encode(&cell.value),
        }
    }
}

impl TryFrom<CellRecord> for CellData {
    type Error = DecodeError;

    fn try_from(record: CellRecord) -> Result<Self, Self::Error> {
        let value = record.slots.decode()?;
        Ok(Self { id: record.id, row_id: record.row_id, column_id: record.column_id, value })
    }
}

// ── Multiline records ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultilineRecord {
    pub id: Uuid,
    pub cell_id: Uuid,
    pub sub_column_id: Uuid,
    pub order_index: i32,
    #[serde(flatten)]
    pub slots: ValueSlots,
}

impl From<&MultilineData> for MultilineRecord {
    fn from(entry: &MultilineData) -> Self {
        Self {
            id: entry.id,
            cell_id: entry.cell_id,
            sub_column_id: entry.sub_column_id,
            order_index: entry.order_index,
            slots: ValueSlots::encode(&entry.value),
        }
    }
}

impl TryFrom<MultilineRecord> for MultilineData {
    type Error = DecodeError;

    fn try_from(record: MultilineRecord) -> Result<Self, Self::Error> {
        let value = record.slots.decode()?;
        Ok(Self {
            id: record.id,
            cell_id: record.cell_id,
            sub_column_id: record.sub_column_id,
            order_index: record.order_index,
            value,
        })
    }
}
