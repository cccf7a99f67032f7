//! Durable record of processed remote files
//!
//! The state is a plain value threaded through a run and persisted through the
//! [`StateStore`] trait. The JSON layout is:
//!
//! ```json
//! { "processed": ["https://.../R1900001_001.nc"], "last_run": "2024-03-04T02:00:00Z" }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// URL of one remote data file; the dedup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteFileRef(String);

impl RemoteFileRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the URL, e.g. `R1900001_001.nc`
    pub fn base_name(&self) -> &str {
        let path = self.0.split(['?', '#']).next().unwrap_or(&self.0);
        path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
    }

    /// Output artifact name: base name with `suffix` replaced by `.csv`
    pub fn csv_file_name(&self, suffix: &str) -> String {
        let base = self.base_name();
        let stem = if base.len() >= suffix.len()
            && base.is_char_boundary(base.len() - suffix.len())
            && base[base.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
        {
            &base[..base.len() - suffix.len()]
        } else {
            base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base)
        };
        format!("{stem}.csv")
    }
}

impl fmt::Display for RemoteFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteFileRef {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for RemoteFileRef {
    fn from(url: String) -> Self {
        Self(url)
    }
}

/// Processed URLs plus the last completed run time
///
/// Only grows: there is no removal besides [`StateStore::reset`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StateRepr", into = "StateRepr")]
pub struct ProcessedState {
    processed: Vec<RemoteFileRef>,
    index: HashSet<RemoteFileRef>,
    pub last_run: Option<DateTime<Utc>>,
}

impl ProcessedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, file: &RemoteFileRef) -> bool {
        self.index.contains(file)
    }

    /// Record a processed file; returns false if it was already present
    pub fn insert(&mut self, file: RemoteFileRef) -> bool {
        if self.index.insert(file.clone()) {
            self.processed.push(file);
            true
        } else {
            false
        }
    }

    /// Processed files in the order they were recorded
    pub fn processed(&self) -> &[RemoteFileRef] {
        &self.processed
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn mark_run(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }
}

impl PartialEq for ProcessedState {
    fn eq(&self, other: &Self) -> bool {
        self.processed == other.processed && self.last_run == other.last_run
    }
}

#[derive(Serialize, Deserialize)]
struct StateRepr {
    #[serde(default)]
    processed: Vec<RemoteFileRef>,
    #[serde(default, deserialize_with = "deserialize_last_run")]
    last_run: Option<DateTime<Utc>>,
}

impl From<StateRepr> for ProcessedState {
    fn from(repr: StateRepr) -> Self {
        let mut state = ProcessedState {
            last_run: repr.last_run,
            ..Default::default()
        };
        for file in repr.processed {
            state.insert(file);
        }
        state
    }
}

impl From<ProcessedState> for StateRepr {
    fn from(state: ProcessedState) -> Self {
        StateRepr {
            processed: state.processed,
            last_run: state.last_run,
        }
    }
}

/// Accepts RFC 3339 as well as naive ISO-8601 (read as UTC)
fn deserialize_last_run<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid last_run '{raw}': {e}")))
}

/// Storage for [`ProcessedState`]
pub trait StateStore: Send + Sync {
    /// Persisted state, or an empty one if nothing was saved yet
    fn load(&self) -> Result<ProcessedState>;

    /// Persist the whole state as one unit
    fn save(&self, state: &ProcessedState) -> Result<()>;

    /// Forget everything (manual reset)
    fn reset(&self) -> Result<()>;
}

/// JSON file on local disk, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self) -> Result<ProcessedState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet, starting empty");
                return Ok(ProcessedState::new());
            },
            Err(e) => return Err(IngestError::state_io(&self.path, e)),
        };

        let state: ProcessedState = serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::state_io(&self.path, e))?;
        debug!(
            path = %self.path.display(),
            processed = state.len(),
            "Loaded processed state"
        );
        Ok(state)
    }

    fn save(&self, state: &ProcessedState) -> Result<()> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir).map_err(|e| IngestError::state_io(&self.path, e))?;

        let json = serde_json::to_vec_pretty(state).map_err(|e| IngestError::state_io(&self.path, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".state-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| IngestError::state_io(&self.path, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| IngestError::state_io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| IngestError::state_io(&self.path, e.error))?;

        debug!(path = %self.path.display(), processed = state.len(), "Saved processed state");
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Processed state reset");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::state_io(&self.path, e)),
        }
    }
}

/// In-process store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Option<ProcessedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ProcessedState) -> Self {
        Self {
            inner: Mutex::new(Some(state)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<ProcessedState>>> {
        self.inner
            .lock()
            .map_err(|_| IngestError::state_io(Path::new("<memory>"), "lock poisoned"))
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<ProcessedState> {
        Ok(self.lock()?.clone().unwrap_or_default())
    }

    fn save(&self, state: &ProcessedState) -> Result<()> {
        *self.lock()? = Some(state.clone());
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
