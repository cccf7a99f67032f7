//! ARGO Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental ingestion of ARGO float profiles from a directory-indexed HTTP
//! archive into schema-typed CSV files.
//!
//! # Components
//!
//! - **Crawler**: walks the remote folder listings and finds `.nc` files
//! - **State store**: remembers which URLs were already converted
//! - **Converter**: downloads one NetCDF file and writes one CSV
//! - **Archive**: bundles every CSV into one zip
//! - **Scheduler**: runs the pipeline weekly or on demand
//!
//! # Example
//!
//! ```no_run
//! use argo_ingest::{IngestConfig, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(IngestConfig::from_env()?)?;
//!     let summary = pipeline.run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod convert;
pub mod crawler;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod scheduler;
pub mod state;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use pipeline::{Pipeline, RunSummary};
pub use scheduler::{Scheduler, TriggerMode};
pub use state::{JsonFileStateStore, MemoryStateStore, ProcessedState, RemoteFileRef, StateStore};
