//! Error types for the partition writer

use arrow::datatypes::DataType;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Output directory or file could not be created
    E001OutputUnavailable,
    /// E002: Parquet encoding or footer write failed
    E002EncodeFailure,
    /// E003: Row does not match the output schema
    E003MalformedRow,
    /// E004: Schema contains a column type the writer cannot buffer
    E004UnsupportedColumn,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001OutputUnavailable => "E001",
            Self::E002EncodeFailure => "E002",
            Self::E003MalformedRow => "E003",
            Self::E004UnsupportedColumn => "E004",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while writing a partition file
#[derive(Debug, Error)]
pub enum WriterError {
    /// Directory or file creation failed
    #[error("[{code}] Cannot create output '{path}': {source}\n\nTroubleshooting:\n  • Check the output location exists and is writable\n  • Check free disk space")]
    OutputUnavailable {
        code: ErrorCode,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parquet writer failure
    #[error("[{code}] Parquet encoding failed for '{path}': {message}")]
    Encode {
        code: ErrorCode,
        path: PathBuf,
        message: String,
    },

    /// Row rejected before buffering
    #[error("[{code}] Malformed row: {reason}")]
    MalformedRow { code: ErrorCode, reason: String },

    /// Column type without a buffer implementation
    #[error("[{code}] Unsupported column '{column}' of type {data_type}")]
    UnsupportedColumn {
        code: ErrorCode,
        column: String,
        data_type: DataType,
    },
}

impl WriterError {
    pub fn output_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputUnavailable {
            code: ErrorCode::E001OutputUnavailable,
            path: path.into(),
            source,
        }
    }

    pub fn encode(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Encode {
            code: ErrorCode::E002EncodeFailure,
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed_row(reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            code: ErrorCode::E003MalformedRow,
            reason: reason.into(),
        }
    }

    pub fn unsupported_column(column: impl Into<String>, data_type: DataType) -> Self {
        Self::UnsupportedColumn {
            code: ErrorCode::E004UnsupportedColumn,
            column: column.into(),
            data_type,
        }
    }

    /// Code attached to this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutputUnavailable { code, .. }
            | Self::Encode { code, .. }
            | Self::MalformedRow { code, .. }
            | Self::UnsupportedColumn { code, .. } => *code,
        }
    }
}

/// Result type alias for WriterError
pub type Result<T> = std::result::Result<T, WriterError>;
