//! Staging-table rows produced from CSV sheets.

use aml_common::MediaFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;
use crate::models::process::ErrorStatus;

/// Column name to cell value.
pub type Fields = BTreeMap<String, CellValue>;

/// Which sheet (and staging table) a row belongs to.
///
/// The ordering is the promotion order: sets before the questions that
/// reference them, then content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    QuestionSet,
    Question,
    Content,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [EntryKind::QuestionSet, EntryKind::Question, EntryKind::Content];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::QuestionSet => "question_set",
            EntryKind::Question => "question",
            EntryKind::Content => "content",
        }
    }

    pub fn stage_table(&self) -> &'static str {
        match self {
            EntryKind::QuestionSet => "question_set_stage",
            EntryKind::Question => "question_stage",
            EntryKind::Content => "content_stage",
        }
    }

    /// Folder under the media prefix that this kind's uploads land in.
    pub fn media_category(&self) -> &'static str {
        match self {
            EntryKind::Content => "content",
            EntryKind::Question | EntryKind::QuestionSet => "question",
        }
    }

    pub fn duplicate_status(&self) -> ErrorStatus {
        match self {
            EntryKind::QuestionSet => ErrorStatus::DuplicateQuestionSetId,
            EntryKind::Question => ErrorStatus::DuplicateQuestionId,
            EntryKind::Content => ErrorStatus::DuplicateContentId,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    #[default]
    Pending,
    Errored,
    Successful,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Errored => "errored",
            RowStatus::Successful => "successful",
        }
    }
}

impl FromStr for RowStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RowStatus::Pending),
            "errored" => Ok(RowStatus::Errored),
            "successful" | "success" => Ok(RowStatus::Successful),
            other => Err(IngestError::Decode(format!("unknown row status '{}'", other))),
        }
    }
}

/// A cell after mapping: plain text, or a `#`-separated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    List(Vec<String>),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value.as_str()),
            CellValue::List(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(value) => value.trim().is_empty(),
            CellValue::List(items) => items.iter().all(|item| item.trim().is_empty()),
        }
    }

    /// The value as a list; a non-empty text becomes a single item.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            CellValue::Text(value) if value.trim().is_empty() => Vec::new(),
            CellValue::Text(value) => vec![value.clone()],
            CellValue::List(items) => items.clone(),
        }
    }
}

/// The four L1 skills a `Grid-1` question can exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticSkill {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticSkill {
    pub fn from_l1_skill(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "add" | "addition" => Some(ArithmeticSkill::Add),
            "sub" | "subtraction" => Some(ArithmeticSkill::Subtract),
            "multiple" | "multiply" | "multiplication" => Some(ArithmeticSkill::Multiply),
            "div" | "divide" | "division" => Some(ArithmeticSkill::Divide),
            _ => None,
        }
    }
}

/// Key into the configured required-field sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Grid1(ArithmeticSkill),
    Grid2,
    Mcq,
    Fib,
}

/// Question-specific payload, tagged by question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QuestionBody {
    Grid1 {
        skill: Option<ArithmeticSkill>,
        fields: Fields,
    },
    Grid2 {
        fields: Fields,
    },
    Mcq {
        fields: Fields,
    },
    Fib {
        fields: Fields,
    },
    Untyped {
        question_type: Option<String>,
        fields: Fields,
    },
}

impl QuestionBody {
    /// Build the body for a row's `question_type` and `L1_skill` cells.
    pub fn new(question_type: Option<&str>, l1_skill: Option<&str>, fields: Fields) -> Self {
        let question_type = question_type.map(str::trim).filter(|t| !t.is_empty());

        match question_type.map(str::to_lowercase).as_deref() {
            Some("grid-1") => QuestionBody::Grid1 {
                skill: l1_skill.and_then(ArithmeticSkill::from_l1_skill),
                fields,
            },
            Some("grid-2") => QuestionBody::Grid2 { fields },
            Some("mcq") => QuestionBody::Mcq { fields },
            Some("fib") => QuestionBody::Fib { fields },
            _ => QuestionBody::Untyped {
                question_type: question_type.map(str::to_string),
                fields,
            },
        }
    }

    pub fn fields(&self) -> &Fields {
        match self {
            QuestionBody::Grid1 { fields, .. }
            | QuestionBody::Grid2 { fields }
            | QuestionBody::Mcq { fields }
            | QuestionBody::Fib { fields }
            | QuestionBody::Untyped { fields, .. } => fields,
        }
    }

    pub fn requirement(&self) -> Option<Requirement> {
        match self {
            QuestionBody::Grid1 { skill, .. } => skill.map(Requirement::Grid1),
            QuestionBody::Grid2 { .. } => Some(Requirement::Grid2),
            QuestionBody::Mcq { .. } => Some(Requirement::Mcq),
            QuestionBody::Fib { .. } => Some(Requirement::Fib),
            QuestionBody::Untyped { .. } => None,
        }
    }

    /// True when `field` is present with a non-blank value.
    pub fn has_value(&self, field: &str) -> bool {
        self.fields().get(field).is_some_and(|value| !value.is_blank())
    }

    pub fn number(&self, field: &str) -> Option<u64> {
        self.fields()
            .get(field)
            .and_then(CellValue::as_text)
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Natural key of a staged row, unique within one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusinessKey {
    QuestionSet {
        question_set_id: String,
    },
    Question {
        question_id: String,
        question_set_id: Option<String>,
    },
    Content {
        content_id: String,
    },
}

impl BusinessKey {
    pub fn kind(&self) -> EntryKind {
        match self {
            BusinessKey::QuestionSet { .. } => EntryKind::QuestionSet,
            BusinessKey::Question { .. } => EntryKind::Question,
            BusinessKey::Content { .. } => EntryKind::Content,
        }
    }

    /// The identifier column this key is reported by.
    pub fn primary(&self) -> &str {
        match self {
            BusinessKey::QuestionSet { question_set_id } => question_set_id,
            BusinessKey::Question { question_id, .. } => question_id,
            BusinessKey::Content { content_id } => content_id,
        }
    }

    pub fn primary_column(&self) -> &'static str {
        match self {
            BusinessKey::QuestionSet { .. } => "question_set_id",
            BusinessKey::Question { .. } => "question_id",
            BusinessKey::Content { .. } => "content_id",
        }
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessKey::Question {
                question_id,
                question_set_id: Some(set),
            } => write!(f, "question_id {} in question_set_id {}", question_id, set),
            other => write!(f, "{} {}", other.primary_column(), other.primary()),
        }
    }
}

/// A mapped row ready to be written to its staging table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStagedRow {
    pub process_id: String,
    pub row_index: i32,
    pub key: BusinessKey,
    pub l1_skill: Option<String>,
    pub fields: Fields,
    pub body: QuestionBody,
    pub media_names: Vec<String>,
}

impl NewStagedRow {
    pub fn kind(&self) -> EntryKind {
        self.key.kind()
    }

    pub fn into_staged(self, id: i64) -> StagedRow {
        StagedRow {
            id,
            process_id: self.process_id,
            row_index: self.row_index,
            key: self.key,
            l1_skill: self.l1_skill,
            fields: self.fields,
            body: self.body,
            media_names: self.media_names,
            media_files: Vec::new(),
            status: RowStatus::Pending,
            error_info: None,
        }
    }
}

/// A persisted staging row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    pub id: i64,
    pub process_id: String,
    pub row_index: i32,
    pub key: BusinessKey,
    pub l1_skill: Option<String>,
    pub fields: Fields,
    pub body: QuestionBody,
    pub media_names: Vec<String>,
    pub media_files: Vec<MediaFile>,
    pub status: RowStatus,
    pub error_info: Option<String>,
}

impl StagedRow {
    pub fn kind(&self) -> EntryKind {
        self.key.kind()
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .and_then(CellValue::as_text)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn list(&self, column: &str) -> Vec<String> {
        self.fields.get(column).map(CellValue::to_list).unwrap_or_default()
    }

    /// Duplicate-scan key: the business key, scoped by L1 skill for
    /// questions and content.
    pub fn duplicate_key(&self) -> (BusinessKey, Option<String>) {
        let skill = match self.kind() {
            EntryKind::QuestionSet => None,
            EntryKind::Question | EntryKind::Content => self.l1_skill.clone(),
        };
        (self.key.clone(), skill)
    }
}

/// Selects the staged rows of one process, optionally one L1 skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFilter {
    pub process_id: String,
    pub l1_skill: Option<String>,
}

impl StageFilter {
    pub fn process(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            l1_skill: None,
        }
    }

    pub fn with_l1_skill(mut self, l1_skill: impl Into<String>) -> Self {
        self.l1_skill = Some(l1_skill.into());
        self
    }

    pub fn matches(&self, row: &StagedRow) -> bool {
        row.process_id == self.process_id
            && self
                .l1_skill
                .as_deref()
                .is_none_or(|skill| row.l1_skill.as_deref() == Some(skill))
    }
}
