use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::copy::request::Direction;

pub type CopyResult<T> = Result<T, CopyError>;

const MISSING_RELATION_MARKER: &str = "does not exist";

/// Classified server or transport failure attached to a COPY error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub stage: &'static str,
    pub message: String,
    pub missing_relation: bool,
}

impl FailureDetail {
    /// Classify a lower-level failure, flagging "does not exist" messages as a
    /// missing relation or column.
    pub fn classify(stage: &'static str, err: impl fmt::Display) -> Self {
        let message = err.to_string();
        let missing_relation = message.contains(MISSING_RELATION_MARKER);
        Self {
            stage,
            message,
            missing_relation,
        }
    }

    pub fn missing_table(stage: &'static str, table: &str) -> Self {
        Self {
            stage,
            message: format!("Table does not exist: {table}"),
            missing_relation: true,
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing_relation {
            write!(f, "Table or column does not exist: {}", self.message)
        } else {
            write!(f, "{} failed: {}", self.stage, self.message)
        }
    }
}

/// Errors surfaced by a COPY invocation.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("{0}")]
    ExportInit(FailureDetail),
    #[error("{0}")]
    ExportFailed(FailureDetail),
    #[error("{0}")]
    ImportFailed(FailureDetail),
    #[error("COPY {direction} timeout after {duration:?}")]
    Timeout {
        direction: Direction,
        duration: Duration,
    },
    #[error("No binary data found in property \"{field}\"")]
    MissingBinaryInput { field: String },
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("connection error: {0}")]
    Connect(sqlx::Error),
    #[error("invalid binary payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    pub fn export_init(err: impl fmt::Display) -> Self {
        CopyError::ExportInit(FailureDetail::classify("COPY TO query", err))
    }

    pub fn export_failed(err: impl fmt::Display) -> Self {
        CopyError::ExportFailed(FailureDetail::classify("COPY TO", err))
    }

    pub fn import_failed(err: impl fmt::Display) -> Self {
        CopyError::ImportFailed(FailureDetail::classify("COPY FROM", err))
    }

    /// True when the failure names a relation or column the server could not find.
    pub fn is_missing_relation(&self) -> bool {
        match self {
            CopyError::ExportInit(detail)
            | CopyError::ExportFailed(detail)
            | CopyError::ImportFailed(detail) => detail.missing_relation,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CopyError::Timeout { .. })
    }
}
