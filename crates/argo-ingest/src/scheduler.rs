//! Run triggers
//!
//! `scheduled` runs once at startup and then on every cron fire time until a
//! shutdown signal arrives; `manual` runs once. The next fire time is computed
//! after the previous run finishes, so a slow run postpones the next one
//! instead of overlapping it.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::error::{IngestError, Result};
use crate::pipeline::Pipeline;

/// How the process was asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    #[default]
    Scheduled,
    Manual,
}

/// Drives pipeline runs from a cron schedule
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    schedule: cron::Schedule,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>) -> Result<Self> {
        let schedule = pipeline.config().cron_schedule()?;
        Ok(Self { pipeline, schedule })
    }

    /// Next fire time strictly after `after`
    pub fn next_fire_after(&self, after: &DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(after).next()
    }

    /// Immediate run, then one run per fire time until `shutdown` resolves
    ///
    /// Run failures are logged and the loop keeps going; only the shutdown
    /// signal ends it.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(schedule = %self.schedule, "Scheduler started, running initial ingestion");
        tokio::select! {
            _ = self.run_logged() => {},
            _ = &mut shutdown => {
                info!("Shutdown requested during initial run");
                return;
            }
        }

        loop {
            let now = Local::now();
            let Some(next) = self.next_fire_after(&now) else {
                warn!(schedule = %self.schedule, "Schedule has no upcoming fire times");
                shutdown.await;
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "Waiting for next scheduled run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.run_logged().await;
                }
                _ = &mut shutdown => {
                    info!("Scheduler stopped");
                    return;
                }
            }
        }
    }

    async fn run_logged(&self) {
        match self.pipeline.run().await {
            Ok(summary) => info!(%summary, "Scheduled run finished"),
            Err(IngestError::RunInProgress) => warn!("Previous run still active, skipping this trigger"),
            Err(e) => error!(error = %e, "Scheduled run failed"),
        }
    }
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
