//! ARGO Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the ARGO ingestion binaries.
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Environment**: typed lookups of configuration variables
//! - **Logging**: `tracing` subscriber setup (console, rolling file, JSON)
//!
//! # Example
//!
//! ```no_run
//! use argo_common::env;
//! use argo_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let depth: usize = env::parse_or("ARGO_CRAWL_DEPTH", 2)?;
//!     tracing::info!(depth, "configured");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
