//! JSON checkpoint of run progress.
use chrono::{Local, NaiveDate};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::RunState;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error writing checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state for the local calendar day.
    pub fn load(&self) -> RunState {
        self.load_on(Local::now().date_naive())
    }

    /// Load the state, resetting `sent_today` when it was recorded on another day.
    /// A missing or unreadable file yields the default state.
    pub fn load_on(&self, today: NaiveDate) -> RunState {
        let mut state = match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<RunState>(&raw) {
                Ok(state) => state,
                Err(err) => {
                    warn!(?err, path = %self.path.display(), "corrupt checkpoint; starting fresh");
                    RunState::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => RunState::default(),
            Err(err) => {
                warn!(?err, path = %self.path.display(), "unreadable checkpoint; starting fresh");
                RunState::default()
            }
        };
        state.roll_over(today);
        state
    }

    /// Write the state through a temp file in the same directory, then rename
    /// it over the checkpoint.
    #[instrument(skip_all, fields(last_index = state.last_index, sent_today = state.sent_today))]
    pub fn save(&self, state: &RunState) -> Result<(), CheckpointError> {
        let io_err = |source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let body = serde_json::to_vec_pretty(state)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&body).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        debug!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let td = tempdir().unwrap();
        let store = CheckpointStore::new(td.path().join("state.json"));
        assert_eq!(store.load_on(day(1)), RunState::default());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let td = tempdir().unwrap();
        let path = td.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let store = CheckpointStore::new(&path);
        assert_eq!(store.load_on(day(1)), RunState::default());
    }

    #[test]
    fn stale_date_resets_sent_today() {
        let td = tempdir().unwrap();
        let store = CheckpointStore::new(td.path().join("state.json"));
        let state = RunState { last_index: 12, last_sent_date: Some(day(1)), sent_today: 9 };
        store.save(&state).unwrap();

        assert_eq!(store.load_on(day(1)).sent_today, 9);
        let next_day = store.load_on(day(2));
        assert_eq!(next_day.sent_today, 0);
        assert_eq!(next_day.last_index, 12);
    }

    #[test]
    fn save_then_reload_is_identical() {
        let td = tempdir().unwrap();
        let store = CheckpointStore::new(td.path().join("nested/state.json"));
        let state = RunState { last_index: 3, last_sent_date: Some(day(5)), sent_today: 2 };
        store.save(&state).unwrap();
        let loaded = store.load_on(day(5));
        store.save(&loaded).unwrap();
        assert_eq!(store.load_on(day(5)), state);
    }

    #[test]
    fn file_uses_documented_keys() {
        let td = tempdir().unwrap();
        let path = td.path().join("state.json");
        let store = CheckpointStore::new(&path);
        store
            .save(&RunState { last_index: 2, last_sent_date: Some(day(7)), sent_today: 1 })
            .unwrap();
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["last_index"], 2);
        assert_eq!(raw["last_sent_date"], "2024-03-07");
        assert_eq!(raw["sent_today"], 1);
        // no temp files left behind
        assert_eq!(fs::read_dir(td.path()).unwrap().count(), 1);
    }
}
