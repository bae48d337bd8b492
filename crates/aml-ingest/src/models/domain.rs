//! Production content entities written by the promoter.

use aml_common::{LocalizedText, MediaFile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::arithmetic::ArithmeticTrace;
use crate::models::reference::ResolvedRef;
use crate::models::staged::{EntryKind, QuestionBody};

/// Creator recorded on everything the pipeline writes.
pub const SYSTEM_USER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Draft,
    Live,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Draft => "draft",
            EntityStatus::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub board: Option<ResolvedRef>,
    pub class: Option<ResolvedRef>,
    pub l1_skill: Option<ResolvedRef>,
    pub l2_skill: Vec<ResolvedRef>,
    pub l3_skill: Vec<ResolvedRef>,
}

/// Fields every promoted entity carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHeader {
    pub identifier: Uuid,
    pub tenant: Option<ResolvedRef>,
    pub repository: Option<ResolvedRef>,
    pub taxonomy: Taxonomy,
    pub sub_skills: Vec<ResolvedRef>,
    pub gradient: Option<String>,
    pub status: EntityStatus,
    pub is_active: bool,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub header: EntityHeader,
    pub question_set_id: String,
    pub title: LocalizedText,
    pub description: Option<LocalizedText>,
    pub instruction_text: Option<String>,
    pub purpose: Option<String>,
    pub sequence: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub header: EntityHeader,
    pub question_id: String,
    pub question_set_id: Option<String>,
    pub question_type: Option<String>,
    pub name: LocalizedText,
    pub description: Option<LocalizedText>,
    pub hints: Option<LocalizedText>,
    pub benchmark_time: Option<i32>,
    pub sequence: Option<i32>,
    pub body: QuestionBody,
    pub derived: Option<ArithmeticTrace>,
    pub media: Vec<MediaFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub header: EntityHeader,
    pub content_id: String,
    pub name: LocalizedText,
    pub description: Option<LocalizedText>,
    pub media: Vec<MediaFile>,
}

/// One kind's promoted rows, written in a single statement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityBatch {
    QuestionSets(Vec<QuestionSet>),
    Questions(Vec<Question>),
    Contents(Vec<Content>),
}

impl EntityBatch {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntityBatch::QuestionSets(_) => EntryKind::QuestionSet,
            EntityBatch::Questions(_) => EntryKind::Question,
            EntityBatch::Contents(_) => EntryKind::Content,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EntityBatch::QuestionSets(rows) => rows.len(),
            EntityBatch::Questions(rows) => rows.len(),
            EntityBatch::Contents(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
