//! Local score history: a single JSON blob of completed-session records.
//!
//! Persistence is best-effort. Any IO or serialization failure is logged and
//! swallowed; gameplay and in-session scoring never depend on it.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::domain::PersistedGameRecord;

/// Most-recent-first cap on stored records.
pub const MAX_HISTORY: usize = 50;

/// File-backed history store. A `None` path disables persistence entirely
/// (loads return empty, saves are dropped with a log line).
#[derive(Clone, Debug)]
pub struct HistoryStore {
  path: Option<PathBuf>,
}

impl HistoryStore {
  /// Use HISTORY_PATH if set, else `./data/history.json`. Set HISTORY_PATH
  /// to the empty string to disable persistence.
  pub fn from_env() -> Self {
    let path = match std::env::var("HISTORY_PATH") {
      Ok(p) if p.is_empty() => {
        warn!(target: "portalrun_backend", "HISTORY_PATH empty; score persistence disabled");
        None
      }
      Ok(p) => Some(PathBuf::from(p)),
      Err(_) => Some(PathBuf::from("./data/history.json")),
    };
    Self { path }
  }

  pub fn at(path: PathBuf) -> Self {
    Self { path: Some(path) }
  }

  pub fn disabled() -> Self {
    Self { path: None }
  }

  /// Load history, most recent first. Empty on any error (logged).
  pub fn load(&self) -> Vec<PersistedGameRecord> {
    let Some(path) = &self.path else { return Vec::new() };
    match std::fs::read_to_string(path) {
      Ok(s) => match serde_json::from_str::<Vec<PersistedGameRecord>>(&s) {
        Ok(records) => records,
        Err(e) => {
          error!(target: "portalrun_backend", path = %path.display(), error = %e, "History blob unreadable; starting empty");
          Vec::new()
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
      Err(e) => {
        error!(target: "portalrun_backend", path = %path.display(), error = %e, "Failed to read history");
        Vec::new()
      }
    }
  }

  /// Prepend the record, truncate to [`MAX_HISTORY`], write back.
  /// Failures are logged, never propagated.
  pub fn save(&self, record: PersistedGameRecord) {
    let Some(path) = &self.path else {
      warn!(target: "portalrun_backend", "Persistence disabled; dropping game record");
      return;
    };

    let mut history = self.load();
    history.insert(0, record);
    history.truncate(MAX_HISTORY);

    if let Some(dir) = path.parent() {
      if !dir.as_os_str().is_empty() {
        if let Err(e) = std::fs::create_dir_all(dir) {
          error!(target: "portalrun_backend", dir = %dir.display(), error = %e, "Failed to create history directory");
          return;
        }
      }
    }

    match serde_json::to_string_pretty(&history) {
      Ok(json) => {
        if let Err(e) = std::fs::write(path, json) {
          error!(target: "portalrun_backend", path = %path.display(), error = %e, "Failed to write history");
        } else {
          info!(target: "portalrun_backend", path = %path.display(), entries = history.len(), "Saved game record");
        }
      }
      Err(e) => {
        error!(target: "portalrun_backend", error = %e, "Failed to serialize history");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;

  fn record(score: u32, ts: u64) -> PersistedGameRecord {
    PersistedGameRecord {
      topic: "science".into(),
      difficulty: Difficulty::Medium,
      score,
      total_questions: 10,
      percentage: score * 10,
      timestamp_ms: ts,
      wrong_answers: vec![],
    }
  }

  fn temp_store() -> (HistoryStore, PathBuf) {
    let path = std::env::temp_dir()
      .join(format!("portalrun-test-{}", uuid::Uuid::new_v4()))
      .join("history.json");
    (HistoryStore::at(path.clone()), path)
  }

  #[test]
  fn load_from_missing_file_is_empty() {
    let (store, _) = temp_store();
    assert!(store.load().is_empty());
  }

  #[test]
  fn save_prepends_most_recent_first() {
    let (store, path) = temp_store();
    store.save(record(5, 1));
    store.save(record(7, 2));
    let history = store.load();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].score, 7);
    assert_eq!(history[1].score, 5);
    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn history_truncates_at_cap_dropping_oldest() {
    let (store, path) = temp_store();
    for i in 0..(MAX_HISTORY as u64 + 1) {
      store.save(record((i % 10) as u32, i));
    }
    let history = store.load();
    assert_eq!(history.len(), MAX_HISTORY);
    // Newest kept, very first save gone.
    assert_eq!(history[0].timestamp_ms, MAX_HISTORY as u64);
    assert!(history.iter().all(|r| r.timestamp_ms != 0));
    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn disabled_store_swallows_saves() {
    let store = HistoryStore::disabled();
    store.save(record(5, 1));
    assert!(store.load().is_empty());
  }

  #[test]
  fn corrupt_blob_loads_as_empty() {
    let (store, path) = temp_store();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{not json").unwrap();
    assert!(store.load().is_empty());
    let _ = std::fs::remove_file(path);
  }
}
