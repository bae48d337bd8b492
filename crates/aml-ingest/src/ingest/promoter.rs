//! Staged rows to content entities.
//!
//! Building entities is pure; [`promote`] writes every kind's batch and deletes
//! the process's staged rows in a single transaction, so a process either
//! promotes all of its sheets or none of them.

use aml_common::LocalizedText;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::arithmetic::{self, ArithmeticTrace};
use crate::db::Database;
use crate::error::{IngestError, Result};
use crate::models::{
    ArithmeticSkill, BusinessKey, Content, EntityBatch, EntityHeader, EntityStatus, EntryKind, ErrorStatus,
    Question, QuestionBody, QuestionSet, ReferenceData, ReferenceTable, ResolvedRef, StagedRow,
    Taxonomy, domain::SYSTEM_USER,
};

const SUB_SKILL_PREFIX: &str = "sub_skill";

/// Reference lookups for one batch.
pub struct EntityBuilder<'a> {
    reference: &'a ReferenceData,
    tenant: Option<ResolvedRef>,
}

impl<'a> EntityBuilder<'a> {
    pub fn new(reference: &'a ReferenceData, tenant_name: &str) -> Self {
        let tenant = reference.resolve(ReferenceTable::Tenants, tenant_name);
        if tenant.is_none() {
            warn!(tenant = %tenant_name, "Tenant not found in reference data");
        }
        Self { reference, tenant }
    }

    fn resolve_one(&self, table: ReferenceTable, row: &StagedRow, name: Option<&str>) -> Option<ResolvedRef> {
        let name = name?;
        let resolved = self.reference.resolve(table, name);
        if resolved.is_none() {
            warn!(
                table = table.table_name(),
                name = %name,
                row_index = row.row_index,
                "Reference not found"
            );
        }
        resolved
    }

    fn resolve_many(&self, table: ReferenceTable, row: &StagedRow, names: &[String]) -> Vec<ResolvedRef> {
        names
            .iter()
            .filter_map(|name| self.resolve_one(table, row, Some(name)))
            .collect()
    }

    fn header(&self, row: &StagedRow) -> EntityHeader {
        let sub_skill_names: Vec<String> = row
            .fields
            .iter()
            .filter(|(column, _)| column.starts_with(SUB_SKILL_PREFIX))
            .flat_map(|(_, value)| value.to_list())
            .collect();

        EntityHeader {
            identifier: Uuid::new_v4(),
            tenant: self.tenant.clone(),
            repository: self.resolve_one(ReferenceTable::Repositories, row, row.text("repository_name")),
            taxonomy: Taxonomy {
                board: self.resolve_one(ReferenceTable::Boards, row, row.text("board")),
                class: self.resolve_one(ReferenceTable::Classes, row, row.text("class")),
                l1_skill: self.resolve_one(ReferenceTable::Skills, row, row.l1_skill.as_deref()),
                l2_skill: self.resolve_many(ReferenceTable::Skills, row, &row.list("L2_skill")),
                l3_skill: self.resolve_many(ReferenceTable::Skills, row, &row.list("L3_skill")),
            },
            sub_skills: self.resolve_many(ReferenceTable::SubSkills, row, &sub_skill_names),
            gradient: row.text("gradient").map(str::to_string),
            status: EntityStatus::Draft,
            is_active: true,
            created_by: SYSTEM_USER.to_string(),
        }
    }

    pub fn question_set(&self, row: &StagedRow) -> QuestionSet {
        let key = row.key.primary().to_string();
        QuestionSet {
            header: self.header(row),
            title: LocalizedText::en(row.text("title").unwrap_or(key.as_str())),
            description: localized(row.text("description")),
            instruction_text: row.text("instruction_text").map(str::to_string),
            purpose: row.text("purpose").map(str::to_string),
            sequence: integer(row, "sequence"),
            question_set_id: key,
        }
    }

    pub fn question(&self, row: &StagedRow) -> Question {
        let (question_id, question_set_id) = match &row.key {
            BusinessKey::Question {
                question_id,
                question_set_id,
            } => (question_id.clone(), question_set_id.clone()),
            other => (other.primary().to_string(), None),
        };
        let name = row
            .text("title")
            .or_else(|| row.text("question_text"))
            .unwrap_or(question_id.as_str());

        Question {
            header: self.header(row),
            name: LocalizedText::en(name),
            description: localized(row.text("description")),
            hints: localized(row.text("hint")),
            question_type: row.text("question_type").map(str::to_string),
            benchmark_time: integer(row, "benchmark_time"),
            sequence: integer(row, "sequence"),
            derived: derive_trace(&row.body),
            body: row.body.clone(),
            media: row.media_files.clone(),
            question_id,
            question_set_id,
        }
    }

    pub fn content(&self, row: &StagedRow) -> Content {
        let content_id = row.key.primary().to_string();
        let name = row
            .text("title")
            .or_else(|| row.text("question_text"))
            .or_else(|| row.text("name"))
            .unwrap_or(content_id.as_str());

        Content {
            header: self.header(row),
            name: LocalizedText::en(name),
            description: localized(row.text("description")),
            media: row.media_files.clone(),
            content_id,
        }
    }

    pub fn batch(&self, kind: EntryKind, rows: &[StagedRow]) -> EntityBatch {
        match kind {
            EntryKind::QuestionSet => EntityBatch::QuestionSets(rows.iter().map(|r| self.question_set(r)).collect()),
            EntryKind::Question => EntityBatch::Questions(rows.iter().map(|r| self.question(r)).collect()),
            EntryKind::Content => EntityBatch::Contents(rows.iter().map(|r| self.content(r)).collect()),
        }
    }
}

fn localized(value: Option<&str>) -> Option<LocalizedText> {
    value.map(LocalizedText::en)
}

fn integer(row: &StagedRow, column: &str) -> Option<i32> {
    row.text(column).and_then(|value| value.parse().ok())
}

/// Worked-solution trace for Grid-1 division and multiplication questions.
pub fn derive_trace(body: &QuestionBody) -> Option<ArithmeticTrace> {
    let QuestionBody::Grid1 { skill: Some(skill), .. } = body else {
        return None;
    };
    let (n1, n2) = (body.number("n1")?, body.number("n2")?);

    match skill {
        ArithmeticSkill::Divide => arithmetic::long_division(n1, n2).map(ArithmeticTrace::LongDivision),
        ArithmeticSkill::Multiply => arithmetic::multiplication(n1, n2).map(ArithmeticTrace::Multiplication),
        ArithmeticSkill::Add | ArithmeticSkill::Subtract => None,
    }
}

/// Eligible rows of one kind, ready to become entities.
#[derive(Debug, Clone)]
pub struct ReadyBatch {
    pub kind: EntryKind,
    pub rows: Vec<StagedRow>,
}

/// Entities promoted per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionSummary {
    pub question_sets: usize,
    pub questions: usize,
    pub contents: usize,
}

impl PromotionSummary {
    pub fn record(&mut self, kind: EntryKind, count: usize) {
        match kind {
            EntryKind::QuestionSet => self.question_sets += count,
            EntryKind::Question => self.questions += count,
            EntryKind::Content => self.contents += count,
        }
    }

    pub fn total(&self) -> usize {
        self.question_sets + self.questions + self.contents
    }
}

/// Write every batch as entities and clear the process's staged rows.
///
/// Nothing is committed unless every batch is written.
#[instrument(skip(db, batches, reference), fields(batches = batches.len()))]
pub async fn promote(
    db: &dyn Database,
    process_id: &str,
    batches: &[ReadyBatch],
    reference: &ReferenceData,
    tenant_name: &str,
) -> Result<PromotionSummary> {
    let builder = EntityBuilder::new(reference, tenant_name);
    let mut summary = PromotionSummary::default();
    let mut uow = db.begin().await?;

    for ReadyBatch { kind, rows } in batches {
        let kind = *kind;
        let batch = builder.batch(kind, rows);

        for row in rows.iter().filter(|row| !row.media_files.is_empty()) {
            uow.set_staged_media(kind, row.id, &row.media_files).await?;
        }

        let inserted = uow.insert_entities(&batch).await.map_err(|e| {
            IngestError::rejected(
                ErrorStatus::MainInsertError,
                format!("Failed to insert {} rows: {}", kind, e),
            )
        })?;

        let cleared = uow.delete_staged(kind, process_id).await?;
        debug!(kind = %kind, inserted, cleared, "Wrote entity batch");
        summary.record(kind, batch.len());
    }

    uow.commit().await?;

    info!(
        process_id = %process_id,
        question_sets = summary.question_sets,
        questions = summary.questions,
        contents = summary.contents,
        "Promoted staged rows"
    );
    Ok(summary)
}
