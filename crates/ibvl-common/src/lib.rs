//! IBVL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the IBVL import tooling.
//!
//! # Overview
//!
//! - **Error Handling**: the [`IbvlError`] type and [`Result`] alias
//! - **Logging**: console logging plus the per-job `data_issues.log` and
//!   `progress.log` streams
//!
//! # Example
//!
//! ```no_run
//! use ibvl_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config, None)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{IbvlError, Result};
