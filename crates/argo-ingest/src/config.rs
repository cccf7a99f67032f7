//! Ingestion configuration
//!
//! Everything the pipeline needs to know about the remote archive, local
//! output locations, HTTP behaviour and the recurring trigger. Loaded from the
//! environment (after `.env`) with defaults matching the NCEI GADR Indian Ocean
//! mirror.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use argo_common::env;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Default root of the directory-indexed archive.
pub const DEFAULT_BASE_URL: &str = "https://www.ncei.noaa.gov/data/oceans/argo/gadr/data/indian/";

/// Default directory receiving one CSV per converted file.
pub const DEFAULT_OUTPUT_DIR: &str = "argo_csvs";

/// Default location of the processed-files record.
pub const DEFAULT_STATE_FILE: &str = "processed_files.json";

/// Default location of the bundled CSV archive.
pub const DEFAULT_ARCHIVE_PATH: &str = "argo_csvs_sql_ready.zip";

/// Folder levels between the base listing and the data files.
pub const DEFAULT_CRAWL_DEPTH: usize = 2;

/// Upper bound on crawl depth; the walk is not meant to be a general spider.
pub const MAX_CRAWL_DEPTH: usize = 8;

pub const DEFAULT_DATA_SUFFIX: &str = ".nc";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Every Monday at 02:00 local time (sec min hour day-of-month month day-of-week).
pub const DEFAULT_SCHEDULE: &str = "0 0 2 * * Mon";

pub const USER_AGENT: &str = concat!("argo-ingest/", env!("CARGO_PKG_VERSION"));

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root directory listing; always ends with `/`
    pub base_url: String,
    /// Directory holding the CSV artifacts
    pub output_dir: PathBuf,
    /// JSON file recording processed URLs and the last run time
    pub state_file: PathBuf,
    /// Zip archive rebuilt after runs that produced new CSVs
    pub archive_path: PathBuf,
    /// Number of folder levels walked before listing data files
    pub crawl_depth: usize,
    /// Suffix identifying data files in the deepest listings
    pub data_suffix: String,
    /// Per-request timeout
    pub http_timeout_secs: u64,
    /// Attempts per HTTP request (1 = no retry)
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt
    pub retry_base_delay_ms: u64,
    /// Cron expression for scheduled mode
    pub schedule: String,
    /// Where downloads are staged; `None` = system temp dir
    pub temp_dir: Option<PathBuf>,
    /// Draw a progress bar while converting
    pub show_progress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            archive_path: PathBuf::from(DEFAULT_ARCHIVE_PATH),
            crawl_depth: DEFAULT_CRAWL_DEPTH,
            data_suffix: DEFAULT_DATA_SUFFIX.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            schedule: DEFAULT_SCHEDULE.to_string(),
            temp_dir: None,
            show_progress: true,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            base_url: env::var_or("ARGO_BASE_URL", DEFAULT_BASE_URL),
            output_dir: PathBuf::from(env::var_or("ARGO_OUTPUT_DIR", DEFAULT_OUTPUT_DIR)),
            state_file: PathBuf::from(env::var_or("ARGO_STATE_FILE", DEFAULT_STATE_FILE)),
            archive_path: PathBuf::from(env::var_or("ARGO_ARCHIVE_PATH", DEFAULT_ARCHIVE_PATH)),
            crawl_depth: env::parse_or("ARGO_CRAWL_DEPTH", DEFAULT_CRAWL_DEPTH)?,
            data_suffix: env::var_or("ARGO_DATA_SUFFIX", DEFAULT_DATA_SUFFIX),
            http_timeout_secs: env::parse_or("ARGO_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            max_retries: env::parse_or("ARGO_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_delay_ms: env::parse_or(
                "ARGO_RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_DELAY_MS,
            )?,
            schedule: env::var_or("ARGO_SCHEDULE", DEFAULT_SCHEDULE),
            temp_dir: env::opt("ARGO_TEMP_DIR").map(PathBuf::from),
            show_progress: env::parse_or("ARGO_SHOW_PROGRESS", true)?,
        }
        .normalized();

        config.validate()?;
        Ok(config)
    }

    /// Force the base URL into directory form so relative links resolve below it
    pub fn normalized(mut self) -> Self {
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| IngestError::Config(format!("ARGO_BASE_URL '{}': {e}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(IngestError::Config(format!(
                "ARGO_BASE_URL must be http(s), got '{}'",
                base.scheme()
            )));
        }
        if self.crawl_depth == 0 || self.crawl_depth > MAX_CRAWL_DEPTH {
            return Err(IngestError::Config(format!(
                "ARGO_CRAWL_DEPTH must be between 1 and {MAX_CRAWL_DEPTH}, got {}",
                self.crawl_depth
            )));
        }
        if self.data_suffix.trim().is_empty() {
            return Err(IngestError::Config("ARGO_DATA_SUFFIX cannot be empty".to_string()));
        }
        if self.http_timeout_secs == 0 {
            return Err(IngestError::Config(
                "ARGO_HTTP_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(IngestError::Config(
                "ARGO_MAX_RETRIES must be at least 1".to_string(),
            ));
        }
        self.cron_schedule()?;
        Ok(())
    }

    /// Parse the configured cron expression
    pub fn cron_schedule(&self) -> Result<cron::Schedule> {
        cron::Schedule::from_str(&self.schedule)
            .map_err(|e| IngestError::Config(format!("ARGO_SCHEDULE '{}': {e}", self.schedule)))
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        backoff_delay(self.retry_base_delay_ms, attempt)
    }
}

/// `base_ms * 2^(attempt - 1)`, saturating instead of overflowing
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}
