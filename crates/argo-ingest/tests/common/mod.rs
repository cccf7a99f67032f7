//! Shared helpers for pipeline integration tests
//!
//! A [`TestArchive`] is a wiremock server laid out like the remote ARGO
//! archive: HTML directory listings plus NetCDF profile files built with the
//! `netcdf3` writer.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use argo_ingest::IngestConfig;
use netcdf3::{DataSet, FileWriter, Version};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Encode a small ARGO core profile (1 profile, `pres.len()` levels)
pub fn profile_bytes(platform: &str, cycle: i32, pres: &[f32]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("profile.nc");

    let mut ds = DataSet::new();
    ds.add_fixed_dim("N_PROF", 1).unwrap();
    ds.add_fixed_dim("N_LEVELS", pres.len()).unwrap();
    ds.add_fixed_dim("STRING8", 8).unwrap();
    ds.add_fixed_dim("DATE_TIME", 14).unwrap();

    ds.add_var_u8("DATA_TYPE", &["STRING8"]).unwrap();
    ds.add_var_u8("DATE_UPDATE", &["DATE_TIME"]).unwrap();
    ds.add_var_u8("PLATFORM_NUMBER", &["N_PROF", "STRING8"]).unwrap();
    ds.add_var_i32("CYCLE_NUMBER", &["N_PROF"]).unwrap();
    ds.add_var_attr_i32("CYCLE_NUMBER", "_FillValue", vec![99999]).unwrap();
    ds.add_var_f64("LATITUDE", &["N_PROF"]).unwrap();
    ds.add_var_attr_f64("LATITUDE", "_FillValue", vec![99999.0]).unwrap();
    ds.add_var_f64("LONGITUDE", &["N_PROF"]).unwrap();
    ds.add_var_attr_f64("LONGITUDE", "_FillValue", vec![99999.0]).unwrap();
    ds.add_var_f32("PRES", &["N_PROF", "N_LEVELS"]).unwrap();
    ds.add_var_attr_f32("PRES", "_FillValue", vec![99999.0]).unwrap();
    ds.add_var_u8("PRES_QC", &["N_PROF", "N_LEVELS"]).unwrap();
    ds.add_var_f32("SOME_UNLISTED_VAR", &["N_PROF"]).unwrap();

    let mut writer = FileWriter::open(&file).unwrap();
    writer.set_def(&ds, Version::Classic, 0).unwrap();
    writer.write_var_u8("DATA_TYPE", b"Argo pro").unwrap();
    writer.write_var_u8("DATE_UPDATE", b"20240304120000").unwrap();
    writer
        .write_var_u8("PLATFORM_NUMBER", &fixed_width(platform, 8))
        .unwrap();
    writer.write_var_i32("CYCLE_NUMBER", &[cycle]).unwrap();
    writer.write_var_f64("LATITUDE", &[-12.5]).unwrap();
    writer.write_var_f64("LONGITUDE", &[75.25]).unwrap();
    writer.write_var_f32("PRES", pres).unwrap();
    writer.write_var_u8("PRES_QC", &vec![b'1'; pres.len()]).unwrap();
    writer.write_var_f32("SOME_UNLISTED_VAR", &[1.0]).unwrap();
    writer.close().unwrap();

    std::fs::read(&file).unwrap()
}

fn fixed_width(s: &str, width: usize) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(width, 0);
    bytes
}

/// Apache-style listing page linking `links` (plus parent and sort links)
pub fn listing_html(title: &str, links: &[&str]) -> String {
    let mut rows = String::new();
    for link in links {
        rows.push_str(&format!("<tr><td><a href=\"{link}\">{link}</a></td></tr>\n"));
    }
    format!(
        "<html><head><title>Index of {title}</title></head><body>\n\
         <h1>Index of {title}</h1>\n<table>\n\
         <tr><th><a href=\"?C=N;O=D\">Name</a></th></tr>\n\
         <tr><td><a href=\"../\">Parent Directory</a></td></tr>\n\
         {rows}</table></body></html>"
    )
}

/// Mock remote archive rooted at `/indian/`
pub struct TestArchive {
    pub server: MockServer,
}

impl TestArchive {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}/indian/", self.server.uri())
    }

    pub async fn listing(&self, at: &str, links: &[&str]) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(at, links)))
            .mount(&self.server)
            .await;
    }

    pub async fn file(&self, at: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    /// First request to `at` stalls for `delay`; later requests fall through
    /// to whatever is mounted afterwards
    pub async fn stall_once(&self, at: &str, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    pub async fn fail(&self, at: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Pipeline configuration writing everything below `root`
    pub fn config(&self, root: &Path) -> IngestConfig {
        IngestConfig {
            base_url: self.base_url(),
            output_dir: root.join("argo_csvs"),
            state_file: root.join("processed_files.json"),
            archive_path: root.join("argo_csvs_sql_ready.zip"),
            temp_dir: Some(root.join("tmp")),
            http_timeout_secs: 1,
            max_retries: 1,
            retry_base_delay_ms: 1,
            show_progress: false,
            ..Default::default()
        }
    }
}

/// Entry names of a zip archive, sorted
pub fn archive_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

/// CSV file names in `dir`, sorted
pub fn csv_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".csv"))
        .collect();
    names.sort();
    names
}

/// Everything left in a directory (used to check temp cleanup)
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
