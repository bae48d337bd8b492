//! Bulk-upload ingestion.
//!
//! # Stages
//!
//! - **archive**: signed-URL download and ZIP expansion
//! - **format**: archive structure checks
//! - **mapper**: CSV sheets to staged rows
//! - **staging**: bulk insert into the staging tables
//! - **validation**: duplicate and required-field rules over staged rows
//! - **media**: media reference matching and upload
//! - **report**: per-row stage reports written back to storage
//! - **promoter**: staged rows to content entities
//! - **process**: process status transitions
//!
//! [`pipeline::Pipeline`] runs the stages for one process and
//! [`scheduler::Scheduler`] sweeps open processes on an interval.

pub mod archive;
pub mod arithmetic;
pub mod format;
pub mod mapper;
pub mod media;
pub mod pipeline;
pub mod process;
pub mod promoter;
pub mod report;
pub mod scheduler;
pub mod staging;
pub mod validation;

pub use pipeline::{Pipeline, ProcessContext, ProcessOutcome};
pub use promoter::{PromotionSummary, ReadyBatch};
pub use process::{fail_process, ProcessTracker};
pub use scheduler::{Scheduler, SweepSummary};
