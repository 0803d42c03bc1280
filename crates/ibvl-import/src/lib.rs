//! IBVL Import Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch loader for the IBVL variant catalog. Reads one directory of
//! tab-delimited export files per entity type and loads them into the
//! catalog tables, assigning surrogate primary keys and resolving foreign
//! keys through persisted natural-key maps.
//!
//! # Overview
//!
//! - [`registry`]: entity types in processing order with their import rules
//! - [`reader`]: schema-typed parsing of source files
//! - [`store`] and [`allocator`]: key maps, ID counters and their checkpoints
//! - [`resolver`] and [`injector`]: foreign key resolution and stub repair
//! - [`loader`]: chunked inserts with row-level fallback
//! - [`orchestrator`]: the run itself, resumable by job and marker
//!
//! # Example
//!
//! ```no_run
//! use ibvl_import::config::RunOptions;
//! use ibvl_import::orchestrator::Orchestrator;
//! use ibvl_import::sink::MemorySink;
//! use ibvl_import::store::PkStore;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = PkStore::new("jobs/1", "jobs/1");
//!     let mut orchestrator = Orchestrator::new(MemorySink::new(), store, RunOptions::new("data/fixtures", 1000));
//!     let summary = orchestrator.run_until(std::future::pending()).await?;
//!     println!("{}", summary.totals());
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod injector;
pub mod job;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod sink;
pub mod stats;
pub mod store;

pub use error::{ConfigError, ImportError};
pub use model::{Row, TableSchema, Value};
pub use orchestrator::Orchestrator;
pub use store::PkStore;
