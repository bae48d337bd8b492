//! Promotion rules over staged rows.
//!
//! [`evaluate`] is pure: it decides which rows fail and why. [`validate_staged`]
//! loads a process's rows inside a unit of work, runs the rules and marks the
//! failing rows `errored`.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::RequiredFields;
use crate::db::UnitOfWork;
use crate::error::Result;
use crate::models::{
    ArithmeticSkill, EntryKind, ErrorStatus, Failure, QuestionBody, Requirement, RowStatus,
    StageFilter, StagedRow,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub status: ErrorStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub row_id: i64,
    pub row_index: i32,
    pub issues: Vec<RowIssue>,
}

impl RowFailure {
    /// Text stored in the row's `error_info`.
    pub fn note(&self) -> String {
        self.issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub eligible: Vec<StagedRow>,
    pub failures: Vec<RowFailure>,
    /// Rows that were already `errored` before this run.
    pub previously_errored: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.previously_errored == 0
    }

    /// The failure recorded on the process: the first failing row's first
    /// issue, with a count of the rest.
    pub fn failure(&self) -> Option<Failure> {
        if let Some(first) = self.failures.first() {
            let issue = first.issues.first()?;
            let mut message = format!("Row {}: {}", first.row_index, issue.message);
            if self.failures.len() > 1 {
                message.push_str(&format!(" ({} more rows failed)", self.failures.len() - 1));
            }
            return Some(Failure::new(issue.status, message));
        }

        if self.previously_errored > 0 {
            return Some(Failure::new(
                ErrorStatus::InvalidData,
                format!("{} staged rows were already errored", self.previously_errored),
            ));
        }

        None
    }
}

pub fn required_fields<'a>(body: &QuestionBody, rules: &'a RequiredFields) -> &'a [String] {
    body.requirement()
        .map(|requirement| rules.for_requirement(requirement))
        .unwrap_or(&[])
}

/// Apply the duplicate and required-field rules to one process's rows.
pub fn evaluate(kind: EntryKind, rows: Vec<StagedRow>, rules: &RequiredFields) -> ValidationReport {
    let mut counts: HashMap<_, usize> = HashMap::new();
    for row in &rows {
        *counts.entry(row.duplicate_key()).or_default() += 1;
    }

    let mut report = ValidationReport::default();

    for row in rows {
        if row.status == RowStatus::Errored {
            report.previously_errored += 1;
            continue;
        }

        let mut issues = Vec::new();

        if row.key.primary().trim().is_empty() {
            issues.push(RowIssue {
                status: ErrorStatus::InvalidData,
                message: format!("Missing {}", row.key.primary_column()),
            });
        } else if counts.get(&row.duplicate_key()).copied().unwrap_or(0) > 1 {
            issues.push(RowIssue {
                status: kind.duplicate_status(),
                message: format!("Duplication of {}", row.key),
            });
        }

        let missing: Vec<&str> = required_fields(&row.body, rules)
            .iter()
            .filter(|field| !row.body.has_value(field))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            issues.push(RowIssue {
                status: ErrorStatus::InvalidData,
                message: format!(
                    "Dependent fields validation failed for {}: missing {}",
                    row.key,
                    missing.join(", ")
                ),
            });
        } else if row.body.requirement() == Some(Requirement::Grid1(ArithmeticSkill::Divide))
            && row.body.number("n2") == Some(0)
        {
            issues.push(RowIssue {
                status: ErrorStatus::InvalidData,
                message: format!("Division by zero in {}", row.key),
            });
        }

        if issues.is_empty() {
            report.eligible.push(row);
        } else {
            report.failures.push(RowFailure {
                row_id: row.id,
                row_index: row.row_index,
                issues,
            });
        }
    }

    report
}

/// Re-read the staged rows for `filter`, apply the rules and mark failures.
pub async fn validate_staged(
    uow: &mut dyn UnitOfWork,
    kind: EntryKind,
    filter: &StageFilter,
    rules: &RequiredFields,
) -> Result<ValidationReport> {
    let rows = uow.staged_rows(kind, filter).await?;
    let total = rows.len();
    let report = evaluate(kind, rows, rules);

    for failure in &report.failures {
        let note = failure.note();
        warn!(
            process_id = %filter.process_id,
            kind = %kind,
            row_index = failure.row_index,
            issue = %note,
            "Staged row failed validation"
        );
        uow.mark_staged(kind, &[failure.row_id], RowStatus::Errored, Some(&note))
            .await?;
    }

    debug!(
        process_id = %filter.process_id,
        kind = %kind,
        total,
        eligible = report.eligible.len(),
        failed = report.failures.len(),
        previously_errored = report.previously_errored,
        "Validated staged rows"
    );

    Ok(report)
}
