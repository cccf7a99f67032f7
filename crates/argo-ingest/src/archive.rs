//! Archive packager
//!
//! Rebuilds the zip bundle from every CSV currently in the output directory.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{IngestError, Result};

/// What went into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entry names, sorted
    pub entries: Vec<String>,
}

/// CSV artifacts in `dir`, sorted by file name
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Write all CSVs from `output_dir` into a fresh deflated zip at `archive_path`
///
/// The archive is built next to its target and renamed over it, replacing any
/// previous archive in full. Blocking.
pub fn pack(output_dir: &Path, archive_path: &Path) -> Result<ArchiveSummary> {
    let files = list_csv_files(output_dir)?;

    let parent = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let tmp = tempfile::Builder::new()
        .prefix(".archive-")
        .suffix(".zip.tmp")
        .tempfile_in(&parent)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(tmp.reopen()?);
    let mut entries = Vec::with_capacity(files.len());
    for path in &files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IngestError::Archive(format!("non UTF-8 file name: {}", path.display())))?;
        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
        entries.push(name.to_string());
    }
    let file = zip.finish()?;
    file.sync_all()?;
    drop(file);

    tmp.persist(archive_path)
        .map_err(|e| IngestError::Archive(format!("{}: {}", archive_path.display(), e.error)))?;

    info!(
        archive = %archive_path.display(),
        entries = entries.len(),
        "Archive rebuilt"
    );
    Ok(ArchiveSummary {
        path: archive_path.to_path_buf(),
        entries,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_archive(path: &Path) -> Vec<(String, String)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut body = String::new();
                entry.read_to_string(&mut body).unwrap();
                (entry.name().to_string(), body)
            })
            .collect()
    }

    #[test]
    fn test_pack_only_csvs_sorted() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("argo_csvs");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("b.csv"), "pres\n2.0\n").unwrap();
        std::fs::write(out.join("a.csv"), "pres\n1.0\n").unwrap();
        std::fs::write(out.join("notes.txt"), "ignored").unwrap();

        let archive = temp.path().join("bundle.zip");
        let summary = pack(&out, &archive).unwrap();

        assert_eq!(summary.entries, vec!["a.csv", "b.csv"]);
        assert_eq!(
            read_archive(&archive),
            vec![
                ("a.csv".to_string(), "pres\n1.0\n".to_string()),
                ("b.csv".to_string(), "pres\n2.0\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_pack_replaces_previous_archive() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("argo_csvs");
        std::fs::create_dir_all(&out).unwrap();
        let archive = temp.path().join("bundle.zip");

        std::fs::write(out.join("a.csv"), "x\n").unwrap();
        pack(&out, &archive).unwrap();
        std::fs::write(out.join("b.csv"), "y\n").unwrap();
        let summary = pack(&out, &archive).unwrap();

        assert_eq!(summary.entries.len(), 2);
        assert_eq!(read_archive(&archive).len(), 2);

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_pack_missing_output_dir_fails() {
        let temp = tempfile::tempdir().unwrap();
        let err = pack(&temp.path().join("nope"), &temp.path().join("a.zip")).unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
