// Input validation for structural operations. Everything here runs before
// any store call, so a failure leaves no partial state behind.

use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use crate::model::DataType;

/// Maximum length of a document name or column label, in characters.
pub const MAX_NAME_CHARS: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("document name must not be empty")]
    EmptyName,

    #[error("label must not be empty")]
    EmptyLabel,

    #[error("name exceeds maximum length of {MAX_NAME_CHARS} characters")]
    TooLong,

    #[error("column {column_id} holds {expected} values, got {actual}")]
    TypeMismatch { column_id: Uuid, expected: DataType, actual: DataType },

    #[error("cannot parse `{input}` as {expected}")]
    Unparseable { input: String, expected: DataType },

    #[error("unknown row {0}")]
    UnknownRow(Uuid),

    #[error("unknown column {0}")]
    UnknownColumn(Uuid),

    #[error("unknown sub-column {0}")]
    UnknownSubColumn(Uuid),

    #[error("unknown cell {0}")]
    UnknownCell(Uuid),

    #[error("unknown file {0}")]
    UnknownFile(Uuid),

    #[error("column {0} is not a multiline column")]
    NotMultiline(Uuid),

    #[error("sub-columns cannot themselves be {0}")]
    NestedContainer(DataType),

    #[error("column ordering must list every column exactly once")]
    InvalidOrdering,
}

/// Trim and check a document name.
pub fn document_name(raw: &str) -> Result<String, ValidationError> {
    bounded(raw, ValidationError::EmptyName)
}

/// Trim and check a column or sub-column label.
pub fn label(raw: &str) -> Result<String, ValidationError> {
    bounded(raw, ValidationError::EmptyLabel)
}

fn bounded(raw: &str, empty: ValidationError) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(empty);
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// Order index for an entity appended after `existing`: `max + 1`, or 0.
pub fn next_order_index<I>(existing: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    existing.into_iter().max().map_or(0, |max| max + 1)
}

/// Check that `proposed` is a permutation of `current`.
pub fn permutation(current: &[Uuid], proposed: &[Uuid]) -> Result<(), ValidationError> {
    if current.len() != proposed.len() {
        return Err(ValidationError::InvalidOrdering);
    }
    let expected: HashSet<&Uuid> = current.iter().collect();
    let mut seen = HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !expected.contains(id) || !seen.insert(id) {
            return Err(ValidationError::InvalidOrdering);
        }
    }
    Ok(())
}
