use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transaction {0} already exists")]
    DuplicateId(String),

    #[error("Transaction {0} not found")]
    RecordNotFound(String),

    #[error("Unknown value '{value}' for column {column}")]
    UnknownEnumValue { column: &'static str, value: String },

    #[error("Malformed value '{value}' in column {column} (row {row})")]
    MalformedField {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Failed to import CSV, database restored from backup: {source}")]
    ImportFailed {
        #[source]
        source: Box<LedgerError>,
    },

    #[error("Import failed ({cause}) and restoring {} also failed: {restore}", backup.display())]
    RestoreFailed {
        backup: PathBuf,
        cause: Box<LedgerError>,
        restore: Box<LedgerError>,
    },

    #[error("No operations to undo")]
    NothingToUndo,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl LedgerError {
    /// Stable machine-readable name for the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Db(_) => "Db",
            Self::Io(_) => "Io",
            Self::Csv(_) => "Csv",
            Self::Json(_) => "Json",
            Self::DuplicateId(_) => "DuplicateId",
            Self::RecordNotFound(_) => "RecordNotFound",
            Self::UnknownEnumValue { .. } => "UnknownEnumValue",
            Self::MalformedField { .. } => "MalformedField",
            Self::ImportFailed { .. } => "ImportFailed",
            Self::RestoreFailed { .. } => "RestoreFailed",
            Self::NothingToUndo => "NothingToUndo",
            Self::Settings(_) => "Settings",
            Self::Other(_) => "Other",
        }
    }

    pub(crate) fn import_failed(cause: LedgerError) -> Self {
        Self::ImportFailed {
            source: Box::new(cause),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_failed_keeps_cause() {
        let err = LedgerError::import_failed(LedgerError::UnknownEnumValue {
            column: "rowType",
            value: "SWAP".to_string(),
        });
        assert_eq!(err.kind(), "ImportFailed");
        let msg = err.to_string();
        assert!(msg.contains("restored from backup"), "{msg}");
        assert!(msg.contains("SWAP"), "{msg}");
        match err {
            LedgerError::ImportFailed { source } => assert_eq!(source.kind(), "UnknownEnumValue"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_field_message() {
        let err = LedgerError::MalformedField {
            row: 3,
            column: "inAmount",
            value: "12,x".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed value '12,x' in column inAmount (row 3)");
    }
}
