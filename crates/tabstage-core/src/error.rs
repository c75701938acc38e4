//! Error types for tabstage-core

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every failure the edit pipeline can report.
///
/// `Error::kind` maps each error onto one of these, and diagnostics in an
/// apply log carry one as well, so callers can branch without matching on
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown table, field or group
    NotFound,
    /// Table is read-only
    NotImportable,
    /// Field is read-only
    FieldNotImportable,
    /// Cell count is not a whole number of rows
    MalformedRows,
    /// Columns changed between submit and apply
    SchemaChanged,
    /// Data changed between the editing read and apply
    VersionConflict,
    /// Store could not be reached, read or written
    BackendUnavailable,
    /// Non-fatal per-row issue inside a committed table
    PartialRowFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::NotImportable => "not importable",
            ErrorKind::FieldNotImportable => "field not importable",
            ErrorKind::MalformedRows => "malformed rows",
            ErrorKind::SchemaChanged => "schema changed",
            ErrorKind::VersionConflict => "version conflict",
            ErrorKind::BackendUnavailable => "backend unavailable",
            ErrorKind::PartialRowFailure => "partial row failure",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in tabstage-core
#[derive(Debug, Error)]
pub enum Error {
    /// No table with this key
    #[error("table '{table}' not found")]
    TableNotFound { table: String },

    /// No field with this key in the table
    #[error("field '{field}' not found in table '{table}'")]
    FieldNotFound { table: String, field: String },

    /// No row group with this name
    #[error("group '{group}' not found")]
    GroupNotFound { group: String },

    /// Table cannot be written back
    #[error("table '{table}' is not importable")]
    TableNotImportable { table: String },

    /// Field cannot be written back
    #[error("field '{field}' of table '{table}' is not importable")]
    FieldNotImportable { table: String, field: String },

    /// Row data does not line up with the field list
    #[error("malformed rows for table '{table}': {reason}")]
    MalformedRows { table: String, reason: String },

    /// Table columns changed after the edit was staged
    #[error("schema of table '{table}' changed from version {staged} to {current}")]
    SchemaChanged {
        table: String,
        staged: u64,
        current: u64,
    },

    /// Table data changed after the editing read
    #[error("table '{table}' was read at version {base} but is now at version {current}")]
    VersionConflict {
        table: String,
        base: u64,
        current: u64,
    },

    /// Store is unreachable
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error.
    ///
    /// Everything that comes from the file layer counts as the store being
    /// unavailable.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TableNotFound { .. } | Error::FieldNotFound { .. } | Error::GroupNotFound { .. } => {
                ErrorKind::NotFound
            }
            Error::TableNotImportable { .. } => ErrorKind::NotImportable,
            Error::FieldNotImportable { .. } => ErrorKind::FieldNotImportable,
            Error::MalformedRows { .. } => ErrorKind::MalformedRows,
            Error::SchemaChanged { .. } => ErrorKind::SchemaChanged,
            Error::VersionConflict { .. } => ErrorKind::VersionConflict,
            Error::BackendUnavailable(_)
            | Error::FileRead { .. }
            | Error::CsvParse { .. }
            | Error::Csv { .. }
            | Error::WalkDir(_)
            | Error::Io(_)
            | Error::Json(_) => ErrorKind::BackendUnavailable,
        }
    }

    pub(crate) fn malformed(table: impl fmt::Display, reason: impl Into<String>) -> Self {
        Error::MalformedRows {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = Error::TableNotFound {
            table: "Frames".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = Error::VersionConflict {
            table: "Frames".to_string(),
            base: 3,
            current: 4,
        };
        assert_eq!(err.kind(), ErrorKind::VersionConflict);
        assert!(err.to_string().contains("version 3"));
    }

    #[test]
    fn test_io_errors_are_backend_unavailable() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::VersionConflict).unwrap();
        assert_eq!(json, "\"version_conflict\"");
    }
}
