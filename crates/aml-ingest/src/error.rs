//! Error types for the ingest pipeline

use thiserror::Error;

use crate::models::{ErrorStatus, Failure, ProcessStatus};

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A rule rejected the upload; the failure is recorded on the process as-is.
    #[error("{0}")]
    Rejected(Failure),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid process transition: {from} -> {to}")]
    InvalidTransition {
        from: ProcessStatus,
        to: ProcessStatus,
    },

    #[error("Process {0} was changed by another worker")]
    StaleProcess(String),

    #[error("Transaction already finished")]
    TransactionClosed,
}

impl IngestError {
    pub fn rejected(status: ErrorStatus, message: impl Into<String>) -> Self {
        IngestError::Rejected(Failure::new(status, message))
    }

    pub fn status(&self) -> ErrorStatus {
        match self {
            IngestError::Rejected(failure) => failure.status,
            _ => ErrorStatus::IsFailed,
        }
    }

    /// The failure to record on the process. Infrastructure errors become
    /// `is_failed` with their message.
    pub fn into_failure(self) -> Failure {
        match self {
            IngestError::Rejected(failure) => failure,
            other => Failure::new(ErrorStatus::IsFailed, other.to_string()),
        }
    }
}
