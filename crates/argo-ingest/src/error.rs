//! Error types for the ingestion pipeline
//!
//! Each variant maps to one recovery policy:
//!
//! - `Network` / `HttpStatus`: recovered per file (conversion) or per branch (crawl)
//! - `Parse`: recovered per file
//! - `StateIo`: fatal for the run
//! - `Archive`: logged, never touches processed state

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for ARGO ingestion
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("State file {path} unusable: {reason}")]
    StateIo { path: PathBuf, reason: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A run is already in progress")]
    RunInProgress,
}

impl IngestError {
    pub(crate) fn state_io(path: &Path, reason: impl std::fmt::Display) -> Self {
        IngestError::StateIo {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from talking to the remote archive
    pub fn is_network(&self) -> bool {
        matches!(self, IngestError::Network(_) | IngestError::HttpStatus { .. })
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Archive(err.to_string())
    }
}

impl From<url::ParseError> for IngestError {
    fn from(err: url::ParseError) -> Self {
        IngestError::Parse(format!("invalid URL: {err}"))
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Io(err.into())
    }
}
