//! Relational storage seam.
//!
//! [`Database`] covers process bookkeeping and reference data.
//! [`UnitOfWork`] is one transaction over the staging and content tables;
//! dropping it without [`UnitOfWork::commit`] rolls everything back.

use aml_common::MediaFile;
use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    EntityBatch, EntryKind, Failure, NewStagedRow, Process, ProcessStatus, ReferenceData,
    RowStatus, StageFilter, StagedRow,
};

pub mod postgres;

pub use postgres::{PgDatabase, PgUnitOfWork};

#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Active processes still waiting in `open`, oldest first.
    async fn open_processes(&self) -> Result<Vec<Process>>;

    async fn find_process(&self, process_id: &str) -> Result<Option<Process>>;

    /// Move a process to `to` if its current status is one of `from`.
    ///
    /// Returns `false` when no row matched, leaving the record untouched.
    async fn transition_process(
        &self,
        process_id: &str,
        from: &[ProcessStatus],
        to: ProcessStatus,
        failure: Option<&Failure>,
    ) -> Result<bool>;

    async fn reference_data(&self) -> Result<ReferenceData>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Insert rows of one kind; returns them with their assigned ids.
    async fn insert_staged(&mut self, kind: EntryKind, rows: &[NewStagedRow]) -> Result<Vec<StagedRow>>;

    /// Rows matching `filter`, ordered by row index.
    async fn staged_rows(&mut self, kind: EntryKind, filter: &StageFilter) -> Result<Vec<StagedRow>>;

    async fn mark_staged(
        &mut self,
        kind: EntryKind,
        ids: &[i64],
        status: RowStatus,
        error_info: Option<&str>,
    ) -> Result<u64>;

    async fn set_staged_media(&mut self, kind: EntryKind, id: i64, media: &[MediaFile]) -> Result<()>;

    /// Remove one process's staged rows of `kind`.
    async fn delete_staged(&mut self, kind: EntryKind, process_id: &str) -> Result<u64>;

    async fn insert_entities(&mut self, batch: &EntityBatch) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
