// Consistent exit codes for the griddoc CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/validation error
//   3  = document, row or column not found
//   4  = not permitted
//   10 = store unreachable or failing

use griddoc_editor::EditorError;
use griddoc_store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    NotFound = 3,
    Forbidden = 4,
    StoreDown = 10,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(editor) = cause.downcast_ref::<EditorError>() {
                return Self::from_error_code(editor.code());
            }
            if let Some(store) = cause.downcast_ref::<StoreError>() {
                return Self::from_store_error(store);
            }
            if cause.downcast_ref::<UsageError>().is_some() {
                return Self::Usage;
            }
            if cause.downcast_ref::<LookupError>().is_some() {
                return Self::NotFound;
            }
        }
        Self::Error
    }

    /// Map an [`EditorError::code`] to an exit code.
    pub fn from_error_code(code: &str) -> Self {
        match code {
            "validation_failed" => Self::Usage,
            "not_found" => Self::NotFound,
            "forbidden" => Self::Forbidden,
            "store_read_failed" | "store_write_failed" => Self::StoreDown,
            _ => Self::Error,
        }
    }

    fn from_store_error(error: &StoreError) -> Self {
        if error.is_not_found() {
            return Self::NotFound;
        }
        match error {
            StoreError::Unavailable(_) | StoreError::Database(_) => Self::StoreDown,
            _ => Self::Error,
        }
    }

    /// Stable error code printed alongside the message.
    pub fn error_code(err: &anyhow::Error) -> &'static str {
        for cause in err.chain() {
            if let Some(editor) = cause.downcast_ref::<EditorError>() {
                return editor.code();
            }
            if cause.downcast_ref::<UsageError>().is_some() {
                return "usage";
            }
        }
        match Self::from_error(err) {
            Self::NotFound => "not_found",
            Self::StoreDown => "store_unavailable",
            _ => "error",
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Bad arguments that clap cannot catch, e.g. an unknown column label.
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

/// A document, column or row named on the command line does not exist.
#[derive(Debug)]
pub struct LookupError(pub String);

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LookupError {}
