//! End-to-end tests for incremental ingestion runs against a mock archive

mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argo_ingest::{
    IngestError, JsonFileStateStore, MemoryStateStore, Pipeline, ProcessedState, RemoteFileRef,
    StateStore,
};
use common::{archive_entries, csv_files, dir_entries, profile_bytes, TestArchive};

const F1: &str = "/indian/A/A1/R1900001_001.nc";
const F2: &str = "/indian/A/A1/R1900001_002.nc";

/// base -> [A, B]; A -> [A1]; A1 -> [f1, f2]; B is empty
async fn two_file_archive() -> TestArchive {
    let archive = TestArchive::start().await;
    archive.listing("/indian/", &["A/", "B/"]).await;
    archive.listing("/indian/A/", &["A1/"]).await;
    archive.listing("/indian/B/", &[]).await;
    archive
        .listing("/indian/A/A1/", &["R1900001_001.nc", "R1900001_002.nc", "README.txt"])
        .await;
    archive
}

/// Records `(tracked files, last_run set)` on every save; optionally fails
/// the n-th save (1-based)
#[derive(Default)]
struct CheckpointStore {
    inner: MemoryStateStore,
    saves: Mutex<Vec<(usize, bool)>>,
    fail_on: Option<usize>,
}

impl StateStore for CheckpointStore {
    fn load(&self) -> argo_ingest::Result<ProcessedState> {
        self.inner.load()
    }

    fn save(&self, state: &ProcessedState) -> argo_ingest::Result<()> {
        let mut saves = self.saves.lock().unwrap();
        saves.push((state.len(), state.last_run.is_some()));
        if self.fail_on == Some(saves.len()) {
            return Err(IngestError::StateIo {
                path: PathBuf::from("processed_files.json"),
                reason: "disk full".to_string(),
            });
        }
        self.inner.save(state)
    }

    fn reset(&self) -> argo_ingest::Result<()> {
        self.inner.reset()
    }
}

fn url(archive: &TestArchive, path: &str) -> RemoteFileRef {
    RemoteFileRef::new(format!("{}{}", archive.server.uri(), path))
}

#[tokio::test]
async fn test_first_run_converts_everything_and_second_run_is_a_no_op() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0, 10.0, 99999.0])).await;
    archive.file(F2, profile_bytes("1900001", 2, &[4.5, 9.5, 20.0])).await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let pipeline = Pipeline::new(config.clone()).unwrap();

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.files_found, 2);
    assert_eq!(first.newly_processed, 2);
    assert_eq!(first.failed, 0);
    assert_eq!(first.total_tracked, 2);
    assert_eq!(first.failed_listings, 0);

    let state = JsonFileStateStore::new(config.state_file.clone()).load().unwrap();
    assert_eq!(state.processed(), &[url(&archive, F1), url(&archive, F2)]);
    assert!(state.last_run.is_some());

    assert_eq!(
        csv_files(&config.output_dir),
        vec!["R1900001_001.csv", "R1900001_002.csv"]
    );
    assert_eq!(
        archive_entries(&config.archive_path),
        vec!["R1900001_001.csv", "R1900001_002.csv"]
    );
    let packed = std::fs::read(&config.archive_path).unwrap();
    let packed_at = std::fs::metadata(&config.archive_path).unwrap().modified().unwrap();

    let second = pipeline.run().await.unwrap();
    assert_eq!(second.files_found, 2);
    assert_eq!(second.already_processed, 2);
    assert_eq!(second.newly_processed, 0);
    assert!(second.archive.is_none());
    assert_eq!(std::fs::read(&config.archive_path).unwrap(), packed);
    assert_eq!(
        std::fs::metadata(&config.archive_path).unwrap().modified().unwrap(),
        packed_at
    );

    let after = JsonFileStateStore::new(config.state_file.clone()).load().unwrap();
    assert_eq!(after.processed(), state.processed());
    assert!(after.last_run >= state.last_run);
}

#[tokio::test]
async fn test_timed_out_file_is_retried_on_next_run() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0])).await;
    archive.stall_once(F2, Duration::from_secs(3)).await;
    archive.file(F2, profile_bytes("1900001", 2, &[6.0])).await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let store = Arc::new(JsonFileStateStore::new(config.state_file.clone()));
    let pipeline =
        Pipeline::with_store(config.clone(), store.clone(), Default::default()).unwrap();

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.newly_processed, 1);
    assert_eq!(first.failed, 1);
    assert_eq!(store.load().unwrap().processed(), &[url(&archive, F1)]);
    assert_eq!(archive_entries(&config.archive_path), vec!["R1900001_001.csv"]);

    let second = pipeline.run().await.unwrap();
    assert_eq!(second.already_processed, 1);
    assert_eq!(second.newly_processed, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(
        store.load().unwrap().processed(),
        &[url(&archive, F1), url(&archive, F2)]
    );
    assert_eq!(
        archive_entries(&config.archive_path),
        vec!["R1900001_001.csv", "R1900001_002.csv"]
    );
}

#[tokio::test]
async fn test_server_error_is_not_recorded_as_processed() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0])).await;
    archive.fail(F2, 500).await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let pipeline = Pipeline::new(config.clone()).unwrap();

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.newly_processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total_tracked, 1);
    assert_eq!(csv_files(&config.output_dir), vec!["R1900001_001.csv"]);

    // Still pending, still failing
    let again = pipeline.run().await.unwrap();
    assert_eq!(again.newly_processed, 0);
    assert_eq!(again.failed, 1);
    assert_eq!(again.total_tracked, 1);
}

#[tokio::test]
async fn test_unreadable_netcdf_leaves_no_partial_output() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0])).await;
    archive.file(F2, b"<html>not a netcdf file</html>".to_vec()).await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let pipeline = Pipeline::new(config.clone()).unwrap();

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.newly_processed, 1);
    assert_eq!(summary.failed, 1);

    // Only finished CSVs in the output dir, and every download cleaned up
    let outputs: Vec<_> = dir_entries(&config.output_dir);
    assert_eq!(outputs.len(), 1);
    assert!(dir_entries(config.temp_dir.as_ref().unwrap()).is_empty());
}

#[tokio::test]
async fn test_failed_branch_does_not_abort_the_crawl() {
    let archive = TestArchive::start().await;
    archive.listing("/indian/", &["A/", "B/"]).await;
    archive.fail("/indian/A/", 500).await;
    archive.listing("/indian/B/", &["B1/"]).await;
    archive.listing("/indian/B/B1/", &["R2900001_001.nc"]).await;
    archive
        .file("/indian/B/B1/R2900001_001.nc", profile_bytes("2900001", 1, &[1.0]))
        .await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let pipeline = Pipeline::new(config.clone()).unwrap();

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.failed_listings, 1);
    assert_eq!(summary.files_found, 1);
    assert_eq!(summary.newly_processed, 1);
    assert_eq!(archive_entries(&config.archive_path), vec!["R2900001_001.csv"]);
}

#[tokio::test]
async fn test_csv_follows_schema_and_flattens_levels() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 7, &[5.0, 10.0, 99999.0])).await;
    archive.file(F2, profile_bytes("1900001", 8, &[1.0])).await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let pipeline = Pipeline::new(config.clone()).unwrap();
    pipeline.run().await.unwrap();

    let mut reader = csv::Reader::from_path(config.output_dir.join("R1900001_001.csv")).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header.len(), 65);
    assert_eq!(header.first().map(String::as_str), Some("pres"));
    assert!(!header.iter().any(|h| h == "some_unlisted_var"));

    let col = |name: &str| header.iter().position(|h| h == name).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);

    let pres: Vec<&str> = rows.iter().map(|r| &r[col("pres")]).collect();
    assert_eq!(pres, vec!["5.0", "10.0", ""]);
    for row in &rows {
        assert_eq!(&row[col("platform_number")], "1900001");
        assert_eq!(&row[col("cycle_number")], "7");
        assert_eq!(&row[col("latitude")], "-12.5");
        assert_eq!(&row[col("longitude")], "75.25");
        assert_eq!(&row[col("pres_qc")], "111");
        assert_eq!(&row[col("data_type")], "Argo pro");
        assert_eq!(&row[col("date_update")], "2024-03-04T12:00:00");
        assert_eq!(&row[col("temp")], "");
    }
}

#[tokio::test]
async fn test_reset_state_reprocesses_everything() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0])).await;
    archive.file(F2, profile_bytes("1900001", 2, &[6.0])).await;

    let temp = tempfile::tempdir().unwrap();
    let config = archive.config(temp.path());
    let pipeline = Pipeline::new(config.clone()).unwrap();

    assert_eq!(pipeline.run().await.unwrap().newly_processed, 2);
    pipeline.store().reset().unwrap();
    assert!(!config.state_file.exists());

    let rerun = pipeline.run().await.unwrap();
    assert_eq!(rerun.newly_processed, 2);
    assert_eq!(rerun.total_tracked, 2);
    assert_eq!(archive_entries(&config.archive_path).len(), 2);
}

#[tokio::test]
async fn test_state_is_checkpointed_after_each_file() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0])).await;
    archive.file(F2, profile_bytes("1900001", 2, &[6.0])).await;

    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(CheckpointStore::default());
    let pipeline =
        Pipeline::with_store(archive.config(temp.path()), store.clone(), Default::default()).unwrap();

    pipeline.run().await.unwrap();
    assert_eq!(
        *store.saves.lock().unwrap(),
        vec![(1, false), (2, false), (2, true)]
    );
}

#[tokio::test]
async fn test_failed_checkpoint_keeps_earlier_files() {
    let archive = two_file_archive().await;
    archive.file(F1, profile_bytes("1900001", 1, &[5.0])).await;
    archive.file(F2, profile_bytes("1900001", 2, &[6.0])).await;

    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(CheckpointStore {
        fail_on: Some(2),
        ..Default::default()
    });
    let pipeline =
        Pipeline::with_store(archive.config(temp.path()), store.clone(), Default::default()).unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, IngestError::StateIo { .. }));

    // f1 was persisted before the run aborted; last_run was never stamped
    let saved = store.inner.load().unwrap();
    assert_eq!(saved.processed(), &[url(&archive, F1)]);
    assert!(saved.last_run.is_none());
}
