//! Session persistence: the record shape and the store seam

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sessionstore::{JsonStore, LoadStatus, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::builder::Stage;
use crate::domain::{Plan, Profile};

/// What survives a restart: Profile and Plan, never the Repo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub output_dir: PathBuf,

    /// Units every Plan of this session must have
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            task_count: None,
            profile: None,
            plan: None,
            updated_at: None,
        }
    }

    /// Stage implied by which fields are present
    pub fn stage(&self) -> Stage {
        match (&self.profile, &self.plan) {
            (Some(_), Some(_)) => Stage::Planned,
            (Some(_), None) => Stage::Parsed,
            (None, _) => Stage::Init,
        }
    }
}

/// Durable session storage
///
/// Implementations must make `save` atomic: a reader never observes a
/// partially written record.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<SessionRecord>, StoreError>;
    fn save(&self, id: &str, record: SessionRecord) -> Result<(), StoreError>;
    fn ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Process-local store for tests and one-shot runs
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(id).cloned())
    }

    fn save(&self, id: &str, record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(id.to_string(), record);
        Ok(())
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Store backed by a single JSON file
pub struct FileSessionStore {
    inner: Mutex<JsonStore<SessionRecord>>,
}

impl FileSessionStore {
    /// Open the store, starting empty if the file is missing or corrupt
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        debug!(path = %path.display(), "FileSessionStore::open: called");
        let store = JsonStore::open(path);
        if let LoadStatus::Recovered { reason } = store.load_status() {
            warn!(path = %path.display(), %reason, "Session store was unreadable, starting with no sessions");
        }
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn load_status(&self) -> LoadStatus {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).load_status().clone()
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.get(id).cloned())
    }

    fn save(&self, id: &str, record: SessionRecord) -> Result<(), StoreError> {
        debug!(%id, "FileSessionStore::save: called");
        let mut store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        store.insert(id, record)
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        let store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Unit;
    use tempfile::TempDir;

    fn plan() -> Plan {
        Plan {
            title: "Kata".to_string(),
            description: "d".to_string(),
            units: vec![Unit {
                id: "task_1".to_string(),
                name: "One".to_string(),
                description: String::new(),
                target_files: vec![],
            }],
        }
    }

    #[test]
    fn test_stage_inference() {
        let mut record = SessionRecord::new("downloads/abc");
        assert_eq!(record.stage(), Stage::Init);

        record.profile = Some(Profile::new("Dev"));
        assert_eq!(record.stage(), Stage::Parsed);

        record.plan = Some(plan());
        assert_eq!(record.stage(), Stage::Planned);

        // A plan without a profile cannot be built on
        record.profile = None;
        assert_eq!(record.stage(), Stage::Init);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.save("b", SessionRecord::new("out/b")).unwrap();
        store.save("a", SessionRecord::new("out/a")).unwrap();

        assert_eq!(store.get("a").unwrap().unwrap().output_dir, PathBuf::from("out/a"));
        assert_eq!(store.ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut record = SessionRecord::new("out/s1");
        record.profile = Some(Profile::new("Dev"));
        record.plan = Some(plan());
        FileSessionStore::open(&path).save("s1", record.clone()).unwrap();

        let reopened = FileSessionStore::open(&path);
        assert_eq!(reopened.get("s1").unwrap(), Some(record));
        assert_eq!(reopened.ids().unwrap(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_file_store_corrupt_file_recovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileSessionStore::open(&path);
        assert!(matches!(store.load_status(), LoadStatus::Recovered { .. }));
        assert!(store.ids().unwrap().is_empty());

        store.save("s1", SessionRecord::new("out/s1")).unwrap();
        assert!(FileSessionStore::open(&path).get("s1").unwrap().is_some());
    }

    #[test]
    fn test_record_omits_absent_fields() {
        let json = serde_json::to_value(SessionRecord::new("out/x")).unwrap();
        assert_eq!(json, serde_json::json!({"output_dir": "out/x"}));
    }
}
