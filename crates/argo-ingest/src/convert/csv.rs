//! CSV output
//!
//! Rows are written to a temporary file inside the output directory and
//! renamed over the final name, so a reader never sees a partial artifact.

use std::path::{Path, PathBuf};

use super::flatten::{CoercionFailures, Flattener};
use crate::error::{IngestError, Result};

/// Rows written and coercion failures seen while writing one CSV
#[derive(Debug, Default)]
pub struct CsvStats {
    pub rows: usize,
    pub failures: CoercionFailures,
}

/// Write every row of `flat` to `dir/file_name`; blocking
pub fn write_csv(flat: &Flattener<'_>, dir: &Path, file_name: &str) -> Result<(PathBuf, CsvStats)> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(file_name);

    let tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".csv.tmp")
        .tempfile_in(dir)?;

    let mut stats = CsvStats::default();
    {
        let mut writer = ::csv::Writer::from_writer(tmp.as_file());
        writer.write_record(flat.header())?;
        for row in 0..flat.row_count() {
            let cells = flat.row(row, &mut stats.failures);
            writer.write_record(cells.iter().map(|v| v.to_string()))?;
            stats.rows += 1;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(&target)
        .map_err(|e| IngestError::Io(e.error))?;
    Ok((target, stats))
}
