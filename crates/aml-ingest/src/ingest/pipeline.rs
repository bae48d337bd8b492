//! Per-process ingestion flow.
//!
//! 1. Check the upload folder listing and the file extension
//! 2. Claim the process (`open -> in_progress`)
//! 3. Fetch and validate the upload and template archives
//! 4. Per sheet kind: map, stage and validate in one transaction, then
//!    publish the stage report and resolve media for the eligible rows
//! 5. Promote every kind and clear the staged rows in one more transaction
//!
//! The first failure ends the run and is recorded on the process. Nothing
//! reaches the domain tables unless every sheet got through step 4.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::archive::{fetch_entries, ArchiveEntry};
use super::format::{check_extension, check_listing, validate_archive};
use super::mapper::map_sheet;
use super::media::MediaResolver;
use super::process::ProcessTracker;
use super::promoter::{promote, PromotionSummary, ReadyBatch};
use super::report::publish_quietly;
use super::staging::stage_rows;
use super::validation::validate_staged;
use crate::config::IngestConfig;
use crate::db::Database;
use crate::error::{IngestError, Result};
use crate::models::{EntryKind, ErrorStatus, Failure, Process, RowStatus, StageFilter, StagedRow};
use crate::storage::{BlobTransport, ObjectStore};

/// State handed to every stage of one process run.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub process_id: String,
    pub file_name: String,
    /// Entries under `media/` in the upload archive.
    pub media: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed(PromotionSummary),
    Failed(Failure),
}

pub struct Pipeline {
    db: Arc<dyn Database>,
    store: Arc<dyn ObjectStore>,
    transport: Arc<dyn BlobTransport>,
    config: Arc<IngestConfig>,
}

impl Pipeline {
    pub fn new(
        db: Arc<dyn Database>,
        store: Arc<dyn ObjectStore>,
        transport: Arc<dyn BlobTransport>,
        config: Arc<IngestConfig>,
    ) -> Self {
        Self {
            db,
            store,
            transport,
            config,
        }
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run one process to a terminal status.
    ///
    /// Rejections and infrastructure errors inside the run are recorded on the
    /// process and reported as [`ProcessOutcome::Failed`]. An `Err` means the
    /// final status itself could not be written.
    #[instrument(skip(self, process), fields(process_id = %process.process_id, file_name = %process.file_name))]
    pub async fn run(&self, process: &Process) -> Result<ProcessOutcome> {
        let mut tracker = ProcessTracker::new(self.db.clone(), &process.process_id, process.status);

        match self.execute(process, &mut tracker).await {
            Ok(summary) => {
                tracker.complete().await?;
                info!(
                    question_sets = summary.question_sets,
                    questions = summary.questions,
                    contents = summary.contents,
                    "Process completed"
                );
                Ok(ProcessOutcome::Completed(summary))
            },
            Err(e) => {
                let failure = e.into_failure();
                warn!(
                    error_status = %failure.status,
                    error_message = %failure.message,
                    "Process rejected"
                );
                tracker.fail(&failure).await?;
                Ok(ProcessOutcome::Failed(failure))
            },
        }
    }

    async fn execute(&self, process: &Process, tracker: &mut ProcessTracker) -> Result<PromotionSummary> {
        let folder = self.config.upload_folder_for(&process.process_id);
        let keys = self.store.list_folder(&folder).await?;
        check_listing(&folder, &keys)?;
        check_extension(&process.file_name)?;

        tracker.start().await?;

        let ttl = self.config.retrieval_url_ttl();
        let entries = fetch_entries(
            self.store.as_ref(),
            self.transport.as_ref(),
            &folder,
            &process.file_name,
            ttl,
        )
        .await;
        let layout = validate_archive(entries, &process.file_name, &self.config.csv_file_names)?;

        let template = fetch_entries(
            self.store.as_ref(),
            self.transport.as_ref(),
            &self.config.template_folder,
            &self.config.template_file_name,
            ttl,
        )
        .await;
        if template.is_empty() {
            return Err(IngestError::rejected(
                ErrorStatus::InvalidTemplate,
                format!(
                    "Template archive {} could not be read",
                    self.config.template_file_name
                ),
            ));
        }

        let mut sheets = layout
            .sheets
            .into_iter()
            .map(|entry| match self.config.sheets.kind_of(entry.name()) {
                Some(kind) => Ok((kind, entry)),
                None => Err(IngestError::rejected(
                    ErrorStatus::UnsupportedSheetType,
                    format!("No sheet type is configured for {}", entry.name()),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        sheets.sort_by_key(|(kind, _)| *kind);

        let ctx = ProcessContext {
            process_id: process.process_id.clone(),
            file_name: process.file_name.clone(),
            media: layout.media,
        };
        let reference = self.db.reference_data().await?;

        let mut ready = Vec::with_capacity(sheets.len());
        for (kind, sheet) in &sheets {
            ready.push(self.prepare_sheet(&ctx, *kind, sheet, &template).await?);
        }

        promote(
            self.db.as_ref(),
            &ctx.process_id,
            &ready,
            &reference,
            &self.config.tenant_name,
        )
        .await
    }

    /// Stage and validate one sheet and resolve its media.
    ///
    /// Every row that comes back is eligible and carries its media files.
    #[instrument(skip_all, fields(sheet = %sheet.name(), kind = %kind))]
    async fn prepare_sheet(
        &self,
        ctx: &ProcessContext,
        kind: EntryKind,
        sheet: &ArchiveEntry,
        template: &[ArchiveEntry],
    ) -> Result<ReadyBatch> {
        let sheet_name = sheet.name();
        let template_sheet = template
            .iter()
            .find(|entry| !entry.is_dir() && entry.base_name() == sheet_name)
            .ok_or_else(|| {
                IngestError::rejected(
                    ErrorStatus::InvalidTemplate,
                    format!("No template found for {}", sheet_name),
                )
            })?;

        let rows = map_sheet(
            kind,
            &ctx.process_id,
            sheet_name,
            &sheet.text()?,
            &template_sheet.text()?,
        )?;
        if rows.is_empty() {
            return Err(IngestError::rejected(
                ErrorStatus::InvalidData,
                format!("{} in {} has no data rows", sheet_name, ctx.file_name),
            ));
        }

        let filter = StageFilter::process(&ctx.process_id);
        let mut uow = self.db.begin().await?;
        stage_rows(uow.as_mut(), kind, &rows).await?;
        let report = validate_staged(uow.as_mut(), kind, &filter, &self.config.required_fields).await?;
        let snapshot = uow.staged_rows(kind, &filter).await?;
        uow.commit().await?;

        if let Some(failure) = report.failure() {
            self.publish_report(ctx, kind, &snapshot).await;
            return Err(IngestError::Rejected(failure));
        }

        let mut eligible = report.eligible;
        let mut resolver = MediaResolver::new(
            self.store.as_ref(),
            self.transport.as_ref(),
            &ctx.media,
            &self.config.media_prefix,
            self.config.upload_url_ttl(),
        );
        let resolution = resolver.resolve_rows(kind, &mut eligible).await?;

        if let Some(failure) = resolution.failure() {
            let mut uow = self.db.begin().await?;
            for row in &resolution.failures {
                uow.mark_staged(kind, &[row.row_id], RowStatus::Errored, Some(&row.note()))
                    .await?;
            }
            let snapshot = uow.staged_rows(kind, &filter).await?;
            uow.commit().await?;
            self.publish_report(ctx, kind, &snapshot).await;
            return Err(IngestError::Rejected(failure));
        }

        self.publish_report(ctx, kind, &eligible).await;
        Ok(ReadyBatch { kind, rows: eligible })
    }

    async fn publish_report(&self, ctx: &ProcessContext, kind: EntryKind, rows: &[StagedRow]) {
        publish_quietly(
            self.store.as_ref(),
            self.transport.as_ref(),
            &self.config.upload_folder_for(&ctx.process_id),
            kind,
            rows,
            self.config.upload_url_ttl(),
        )
        .await;
    }
}
