//! Staging writer.

use tracing::{info, instrument};

use crate::db::UnitOfWork;
use crate::error::{IngestError, Result};
use crate::models::{EntryKind, ErrorStatus, NewStagedRow, StagedRow};

/// Insert one kind's mapped rows into its staging table.
///
/// The batch is all-or-nothing: any storage error rejects the upload with
/// `insert_error`, naming the first row of the batch.
#[instrument(skip(uow, rows), fields(rows = rows.len()))]
pub async fn stage_rows(uow: &mut dyn UnitOfWork, kind: EntryKind, rows: &[NewStagedRow]) -> Result<Vec<StagedRow>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    let staged = uow.insert_staged(kind, rows).await.map_err(|e| {
        IngestError::rejected(
            ErrorStatus::InsertError,
            format!(
                "Failed to stage {} rows starting at row {}: {}",
                kind, first.row_index, e
            ),
        )
    })?;

    info!(
        process_id = %first.process_id,
        kind = %kind,
        staged = staged.len(),
        "Staged rows"
    );
    Ok(staged)
}
