//! AML Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Polls upload processes, validates their ZIP archives and promotes the rows
//! into the question, question set and content tables.
//!
//! - **config**: environment-driven settings (`DATABASE_*`, `INGEST_*`)
//! - **db**: the [`db::Database`] / [`db::UnitOfWork`] seams and their Postgres implementation
//! - **storage**: object storage and HTTP blob transfer
//! - **models**: process, staging, reference and content types
//! - **ingest**: the pipeline stages and the scheduler

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod storage;

pub use config::Config;
pub use error::{IngestError, Result};
