//! AML Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Logging setup and small value types shared by the AML workspace members.
//!
//! - **Logging**: `tracing` subscriber configuration (console, rolling file, JSON)
//! - **Types**: localized text maps and media descriptors stored on content
//!
//! # Example
//!
//! ```no_run
//! use aml_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod types;

pub use types::{LocalizedText, MediaFile};
