//! NetCDF to CSV conversion
//!
//! A conversion downloads one remote file into a scoped temporary file, loads
//! it as a [`Dataset`], flattens it to rows, coerces every cell to the
//! [`ColumnSchema`] and writes one CSV artifact named after the source file.

pub mod coerce;
pub mod csv;
pub mod dataset;
pub mod flatten;
pub mod schema;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

pub use self::coerce::{coerce, coerce_checked, CoercionError, RawValue, Value};
pub use self::dataset::Dataset;
pub use self::flatten::Flattener;
pub use self::schema::{ColumnSchema, ColumnType};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::state::RemoteFileRef;

/// Result of converting one remote file
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub source: RemoteFileRef,
    pub csv_path: PathBuf,
    pub rows: usize,
    /// Cells that held a value but could not be coerced (written as null)
    pub coercion_failures: usize,
}

/// Converts remote data files into CSV artifacts
pub struct Converter {
    fetcher: Fetcher,
    schema: Arc<ColumnSchema>,
    output_dir: PathBuf,
    data_suffix: String,
}

impl Converter {
    pub fn new(fetcher: Fetcher, schema: ColumnSchema, config: &IngestConfig) -> Self {
        Self {
            fetcher,
            schema: Arc::new(schema),
            output_dir: config.output_dir.clone(),
            data_suffix: config.data_suffix.clone(),
        }
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Convert one file; the temporary download is gone when this returns
    pub async fn convert(&self, file: &RemoteFileRef) -> Result<ConversionOutcome> {
        let download = self.fetcher.download(file.as_str()).await?;
        debug!(url = %file, tmp = %download.path().display(), "Fetched data file");

        let schema = Arc::clone(&self.schema);
        let output_dir = self.output_dir.clone();
        let csv_name = file.csv_file_name(&self.data_suffix);

        // Dropped inside the task on every path
        let (csv_path, stats) = tokio::task::spawn_blocking(move || {
            let dataset = Dataset::open(download.path())?;
            let flat = Flattener::new(&dataset, &schema);
            let written = self::csv::write_csv(&flat, &output_dir, &csv_name);
            drop(download);
            written
        })
        .await??;

        let coercion_failures = stats.failures.values().sum();
        if coercion_failures > 0 {
            debug!(url = %file, failures = ?stats.failures, "Values coerced to null");
        }
        info!(url = %file, rows = stats.rows, csv = %csv_path.display(), "Converted");

        Ok(ConversionOutcome {
            source: file.clone(),
            csv_path,
            rows: stats.rows,
            coercion_failures,
        })
    }
}
