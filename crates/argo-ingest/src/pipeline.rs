//! One ingestion run
//!
//! Load state, crawl, convert every file not seen before (checkpointing the
//! state after each success), stamp `last_run`, and rebuild the archive if
//! anything new was converted.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::archive::{self, ArchiveSummary};
use crate::config::IngestConfig;
use crate::convert::{ColumnSchema, Converter};
use crate::crawler::Crawler;
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::state::{JsonFileStateStore, ProcessedState, StateStore};

/// Counts reported at the end of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub files_found: usize,
    pub already_processed: usize,
    pub newly_processed: usize,
    pub failed: usize,
    pub failed_listings: usize,
    pub total_tracked: usize,
    pub archive: Option<ArchiveSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Files found: {}, new files processed: {}, failed: {}, total files tracked: {}",
            self.files_found, self.newly_processed, self.failed, self.total_tracked
        )?;
        if let Some(archive) = &self.archive {
            write!(
                f,
                ", archive: {} ({} CSVs)",
                archive.path.display(),
                archive.entries.len()
            )?;
        }
        Ok(())
    }
}

/// The ingestion pipeline; at most one run at a time
pub struct Pipeline {
    config: IngestConfig,
    store: Arc<dyn StateStore>,
    crawler: Crawler,
    converter: Converter,
    run_guard: Mutex<()>,
}

impl Pipeline {
    /// Pipeline with the JSON state file and ARGO schema from `config`
    pub fn new(config: IngestConfig) -> Result<Self> {
        let store = Arc::new(JsonFileStateStore::new(config.state_file.clone()));
        Self::with_store(config, store, ColumnSchema::argo())
    }

    pub fn with_store(
        config: IngestConfig,
        store: Arc<dyn StateStore>,
        schema: ColumnSchema,
    ) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::new(&config)?;
        let crawler = Crawler::new(fetcher.clone(), &config);
        let converter = Converter::new(fetcher, schema, &config);

        Ok(Self {
            config,
            store,
            crawler,
            converter,
            run_guard: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Execute one run
    ///
    /// Fails with [`IngestError::RunInProgress`] if another run holds the
    /// guard, and with [`IngestError::StateIo`] if state cannot be loaded or a
    /// checkpoint cannot be written. Per-file failures are counted, not
    /// returned.
    pub async fn run(&self) -> Result<RunSummary> {
        let _guard = self.run_guard.try_lock().map_err(|_| IngestError::RunInProgress)?;
        let started_at = Utc::now();
        info!(base_url = %self.config.base_url, "Starting ingestion run");

        let mut state = self.store.load()?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        if let Some(temp_dir) = &self.config.temp_dir {
            tokio::fs::create_dir_all(temp_dir).await?;
        }

        let report = self.crawler.discover(&self.config.base_url).await;
        let pending: Vec<_> = report
            .files
            .iter()
            .filter(|file| !state.contains(file))
            .cloned()
            .collect();
        let already_processed = report.files.len() - pending.len();
        info!(
            found = report.files.len(),
            already_processed,
            pending = pending.len(),
            "Discovery finished"
        );

        let pb = self.progress_bar(pending.len() as u64);
        let mut newly_processed = 0;
        let mut failed = 0;
        for file in pending {
            pb.set_message(file.base_name().to_string());
            match self.converter.convert(&file).await {
                Ok(outcome) => {
                    state.insert(outcome.source);
                    self.checkpoint(&state).await?;
                    newly_processed += 1;
                },
                Err(e) => {
                    warn!(url = %file, error = %e, "Conversion failed, will retry next run");
                    failed += 1;
                },
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        state.mark_run(Utc::now());
        self.checkpoint(&state).await?;

        let archive = if newly_processed > 0 {
            self.rebuild_archive().await
        } else {
            info!("No new files, archive left untouched");
            None
        };

        let summary = RunSummary {
            files_found: report.files.len(),
            already_processed,
            newly_processed,
            failed,
            failed_listings: report.failed_listings,
            total_tracked: state.len(),
            archive,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            files_found = summary.files_found,
            newly_processed = summary.newly_processed,
            failed = summary.failed,
            total_tracked = summary.total_tracked,
            "Ingestion run complete"
        );
        Ok(summary)
    }

    /// Persist a snapshot of `state` on the blocking pool
    async fn checkpoint(&self, state: &ProcessedState) -> Result<()> {
        let store = Arc::clone(&self.store);
        let snapshot = state.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot)).await?
    }

    async fn rebuild_archive(&self) -> Option<ArchiveSummary> {
        let output_dir = self.config.output_dir.clone();
        let archive_path = self.config.archive_path.clone();
        let packed = tokio::task::spawn_blocking(move || archive::pack(&output_dir, &archive_path))
            .await
            .map_err(IngestError::from)
            .and_then(|r| r);
        match packed {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = %e, "Failed to rebuild archive");
                None
            },
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.show_progress || len == 0 {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
