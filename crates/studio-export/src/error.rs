use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("PDF write error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("no tables selected for export")]
    EmptySelection,

    #[error("unknown block id: {0}")]
    UnknownBlock(String),

    #[error("page snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("a scan is already in progress")]
    ScanInProgress,

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("{format} serialization failed: {message}")]
    Serialization {
        format: &'static str,
        message: String,
    },

    #[error("not supported: {0}")]
    Unsupported(String),
}

impl ExportError {
    /// Wraps any lower-level error raised while a serializer runs.
    #[must_use]
    pub fn serialization(format: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Serialization {
            format,
            message: error.to_string(),
        }
    }
}

/// Raised by a single matcher or block during a scan. Never leaves the
/// detection stage; it is logged and recorded as a `ScanWarning`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} extraction failed at {location}: {reason}")]
pub struct ExtractionFault {
    pub stage: &'static str,
    pub location: String,
    pub reason: String,
}

impl ExtractionFault {
    #[must_use]
    pub fn new(
        stage: &'static str,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            location: location.into(),
            reason: reason.into(),
        }
    }
}
