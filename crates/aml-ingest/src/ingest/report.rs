//! Per-row stage reports.
//!
//! After a sheet is validated its staged rows are written back to storage as
//! CSV under the process folder, one file per kind, so the uploader can see
//! which rows failed and why.

use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{IngestError, Result};
use crate::models::{BusinessKey, EntryKind, StagedRow};
use crate::storage::{object_key, BlobTransport, ObjectStore};

pub const REPORT_FOLDER: &str = "report";
pub const REPORT_CONTENT_TYPE: &str = "text/csv";

/// Storage key of the report for `kind` under `process_folder`.
pub fn report_key(process_folder: &str, kind: EntryKind) -> String {
    object_key(
        &format!("{}/{}", process_folder, REPORT_FOLDER),
        &format!("{}_stage.csv", kind),
    )
}

fn header(kind: EntryKind) -> Vec<&'static str> {
    let mut columns = vec!["row_index"];
    match kind {
        EntryKind::QuestionSet => columns.push("question_set_id"),
        EntryKind::Question => columns.extend(["question_id", "question_set_id"]),
        EntryKind::Content => columns.push("content_id"),
    }
    columns.extend(["L1_skill", "media_files", "status", "error_info"]);
    columns
}

fn key_cells(key: &BusinessKey) -> Vec<String> {
    match key {
        BusinessKey::QuestionSet { question_set_id } => vec![question_set_id.clone()],
        BusinessKey::Question {
            question_id,
            question_set_id,
        } => vec![question_id.clone(), question_set_id.clone().unwrap_or_default()],
        BusinessKey::Content { content_id } => vec![content_id.clone()],
    }
}

/// Render `rows` as CSV, ordered by row index.
pub fn render(kind: EntryKind, rows: &[StagedRow]) -> Result<Vec<u8>> {
    let mut ordered: Vec<&StagedRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.row_index);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header(kind))?;

    for row in ordered {
        let mut record = vec![row.row_index.to_string()];
        record.extend(key_cells(&row.key));
        record.push(row.l1_skill.clone().unwrap_or_default());
        record.push(
            row.media_files
                .iter()
                .map(|file| file.src.as_str())
                .collect::<Vec<_>>()
                .join("#"),
        );
        record.push(row.status.as_str().to_string());
        record.push(row.error_info.clone().unwrap_or_default());
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| IngestError::Io(e.into_error()))
}

/// Render and upload the report for one kind through a signed PUT.
#[instrument(skip(store, transport, rows), fields(rows = rows.len()))]
pub async fn publish(
    store: &dyn ObjectStore,
    transport: &dyn BlobTransport,
    process_folder: &str,
    kind: EntryKind,
    rows: &[StagedRow],
    ttl: Duration,
) -> Result<String> {
    let key = report_key(process_folder, kind);
    let body = render(kind, rows)?;
    let url = store.signed_upload_url(&key, ttl).await?;
    transport.put(&url, body, REPORT_CONTENT_TYPE).await?;
    info!(key = %key, "Uploaded stage report");
    Ok(key)
}

/// [`publish`], logging instead of failing. The report never decides the
/// outcome of a process.
pub async fn publish_quietly(
    store: &dyn ObjectStore,
    transport: &dyn BlobTransport,
    process_folder: &str,
    kind: EntryKind,
    rows: &[StagedRow],
    ttl: Duration,
) {
    if let Err(e) = publish(store, transport, process_folder, kind, rows, ttl).await {
        warn!(error = %e, kind = %kind, "Failed to upload stage report");
    }
}
