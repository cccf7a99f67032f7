//! HTTP access to the remote archive
//!
//! One shared `reqwest::Client` for listings and data files. Every request is
//! retried with exponential backoff up to `max_retries` attempts.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{backoff_delay, IngestConfig, USER_AGENT};
use crate::error::{IngestError, Result};

/// Shared HTTP client for listings and downloads
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    retry_base_delay_ms: u64,
    temp_dir: Option<PathBuf>,
}

impl Fetcher {
    /// Create new fetcher with configuration
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms,
            temp_dir: config.temp_dir.clone(),
        })
    }

    /// Directory that receives scoped downloads
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Fetch a page as text (directory listings)
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.with_retry(url, move || self.get_text_once(url)).await
    }

    /// Stream a remote file into a scoped temporary file
    ///
    /// The returned file is removed when dropped, whatever the caller does
    /// with it. A failed attempt drops its partial file before the next one.
    pub async fn download(&self, url: &str) -> Result<NamedTempFile> {
        let dir = self.temp_dir();
        let dir = dir.as_path();
        self.with_retry(url, move || self.download_once(url, dir)).await
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let backoff = backoff_delay(self.retry_base_delay_ms, attempt);
                    warn!(
                        url = %url,
                        error = %e,
                        "Attempt {}/{} failed, retrying in {:?}",
                        attempt,
                        self.max_retries,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_text_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.text().await?)
    }

    async fn download_once(&self, url: &str, dir: &Path) -> Result<NamedTempFile> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let tmp = tempfile::Builder::new()
            .prefix("argo-")
            .suffix(".download")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url = %url, bytes = written, "Downloaded to {}", tmp.path().display());
        if written == 0 {
            info!(url = %url, "Remote file is empty");
        }
        Ok(tmp)
    }
}

/// Transport failures and server-side statuses are worth another attempt;
/// client errors such as 404 are not.
fn is_retryable(err: &IngestError) -> bool {
    match err {
        IngestError::Network(_) => true,
        IngestError::HttpStatus { status, .. } => {
            status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
        },
        IngestError::Io(_) => true,
        _ => false,
    }
}
