//! Upload process records and their status vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

/// Lifecycle of one upload attempt.
///
/// `Open -> InProgress -> (Completed | Failed)`. Any non-terminal state may
/// move to `Failed`; terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "is_failed")]
    Failed,
}

impl ProcessStatus {
    pub const NON_TERMINAL: [ProcessStatus; 2] = [ProcessStatus::Open, ProcessStatus::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Open => "open",
            ProcessStatus::InProgress => "in_progress",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Failed => "is_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Completed | ProcessStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ProcessStatus) -> bool {
        matches!(
            (self, next),
            (ProcessStatus::Open, ProcessStatus::InProgress)
                | (ProcessStatus::Open, ProcessStatus::Failed)
                | (ProcessStatus::InProgress, ProcessStatus::Completed)
                | (ProcessStatus::InProgress, ProcessStatus::Failed)
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(ProcessStatus::Open),
            "in_progress" | "progress" => Ok(ProcessStatus::InProgress),
            "completed" => Ok(ProcessStatus::Completed),
            "is_failed" | "errored" | "failed" => Ok(ProcessStatus::Failed),
            other => Err(IngestError::Decode(format!("unknown process status '{}'", other))),
        }
    }
}

/// Machine-readable failure codes recorded in `process.error_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    IsEmpty,
    IsUnsupportedFormat,
    IsUnsupportedFolderType,
    IsUnsupportedFileName,
    IsMediaFolderMissing,
    InvalidTemplate,
    InvalidHeaderLength,
    InvalidColumnName,
    UnsupportedSheetType,
    InsertError,
    DuplicateQuestionId,
    DuplicateQuestionSetId,
    DuplicateContentId,
    InvalidData,
    MediaFileMissing,
    MainInsertError,
    Timeout,
    IsFailed,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::IsEmpty => "is_empty",
            ErrorStatus::IsUnsupportedFormat => "is_unsupported_format",
            ErrorStatus::IsUnsupportedFolderType => "is_unsupported_folder_type",
            ErrorStatus::IsUnsupportedFileName => "is_unsupported_file_name",
            ErrorStatus::IsMediaFolderMissing => "is_media_folder_missing",
            ErrorStatus::InvalidTemplate => "invalid_template",
            ErrorStatus::InvalidHeaderLength => "invalid_header_length",
            ErrorStatus::InvalidColumnName => "invalid_column_name",
            ErrorStatus::UnsupportedSheetType => "unsupported_sheet_type",
            ErrorStatus::InsertError => "insert_error",
            ErrorStatus::DuplicateQuestionId => "duplicate_question_id",
            ErrorStatus::DuplicateQuestionSetId => "duplicate_question_set_id",
            ErrorStatus::DuplicateContentId => "duplicate_content_id",
            ErrorStatus::InvalidData => "invalid_data",
            ErrorStatus::MediaFileMissing => "media_file_missing",
            ErrorStatus::MainInsertError => "main_insert_error",
            ErrorStatus::Timeout => "timeout",
            ErrorStatus::IsFailed => "is_failed",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure code with its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub status: ErrorStatus,
    pub message: String,
}

impl Failure {
    pub fn new(status: ErrorStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

/// One row of the `process` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: i64,
    pub process_id: String,
    pub file_name: String,
    pub description: Option<String>,
    pub status: ProcessStatus,
    pub error_status: Option<String>,
    pub error_message: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
