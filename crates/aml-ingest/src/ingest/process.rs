//! Process lifecycle bookkeeping.

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{IngestError, Result};
use crate::models::{Failure, ProcessStatus};

/// Tracks one process record through `open -> in_progress -> completed | failed`.
pub struct ProcessTracker {
    db: Arc<dyn Database>,
    process_id: String,
    status: ProcessStatus,
}

impl ProcessTracker {
    pub fn new(db: Arc<dyn Database>, process_id: impl Into<String>, status: ProcessStatus) -> Self {
        Self {
            db,
            process_id: process_id.into(),
            status,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    async fn transition(&mut self, to: ProcessStatus, failure: Option<&Failure>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(IngestError::InvalidTransition { from: self.status, to });
        }

        let moved = self
            .db
            .transition_process(&self.process_id, &[self.status], to, failure)
            .await?;
        if !moved {
            return Err(IngestError::StaleProcess(self.process_id.clone()));
        }

        info!(
            process_id = %self.process_id,
            from = %self.status,
            to = %to,
            "Process status changed"
        );
        self.status = to;
        Ok(())
    }

    /// Claim the process for this worker.
    pub async fn start(&mut self) -> Result<()> {
        self.transition(ProcessStatus::InProgress, None).await
    }

    pub async fn complete(&mut self) -> Result<()> {
        self.transition(ProcessStatus::Completed, None).await
    }

    pub async fn fail(&mut self, failure: &Failure) -> Result<()> {
        self.transition(ProcessStatus::Failed, Some(failure)).await
    }
}

/// Fail a process from whatever non-terminal status it is in.
///
/// Used by the scheduler when a run times out or panics and the tracker is
/// gone. Returns `false` if the process had already finished.
pub async fn fail_process(db: &dyn Database, process_id: &str, failure: &Failure) -> Result<bool> {
    let moved = db
        .transition_process(process_id, &ProcessStatus::NON_TERMINAL, ProcessStatus::Failed, Some(failure))
        .await?;
    if moved {
        warn!(process_id = %process_id, failure = %failure, "Process failed");
    }
    Ok(moved)
}
