//! Core JsonStore implementation

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::StoreError;

/// What happened when the backing file was read at open time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// No backing file (or an empty one) - started empty
    Fresh,
    /// File parsed; `dropped` records failed to deserialize and were skipped
    Loaded { records: usize, dropped: usize },
    /// File unreadable or unparsable - started empty
    Recovered { reason: String },
}

/// Keyed record store persisted as a single JSON object
pub struct JsonStore<T> {
    path: PathBuf,
    records: BTreeMap<String, T>,
    status: LoadStatus,
}

impl<T> JsonStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Open the store at `path`, recovering to empty on a missing or corrupt file
    ///
    /// Never fails: a store that cannot be read is logged and replaced by an
    /// empty one, which the next successful write overwrites.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "JsonStore::open: called");
        let (records, status) = Self::load(&path);
        info!(path = %path.display(), ?status, "Opened record store");
        Self { path, records, status }
    }

    fn load(path: &Path) -> (BTreeMap<String, T>, LoadStatus) {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("JsonStore::load: no backing file");
                return (BTreeMap::new(), LoadStatus::Fresh);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Store file unreadable, starting from an empty store");
                return (BTreeMap::new(), LoadStatus::Recovered { reason: e.to_string() });
            }
        };

        if content.trim().is_empty() {
            debug!("JsonStore::load: backing file is empty");
            return (BTreeMap::new(), LoadStatus::Fresh);
        }

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Store file is corrupt, starting from an empty store");
                return (BTreeMap::new(), LoadStatus::Recovered { reason: e.to_string() });
            }
        };

        let mut records = BTreeMap::new();
        let mut dropped = 0;
        for (id, value) in raw {
            match serde_json::from_value::<T>(value) {
                Ok(record) => {
                    records.insert(id, record);
                }
                Err(e) => {
                    warn!(%id, error = %e, "Dropping unreadable record");
                    dropped += 1;
                }
            }
        }

        let status = LoadStatus::Loaded {
            records: records.len(),
            dropped,
        };
        (records, status)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the backing file looked when the store was opened
    pub fn load_status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// All record ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace a record and persist the whole store
    ///
    /// Records written by other handles since this one was opened are kept.
    /// If persisting fails the in-memory state is left as it was.
    pub fn insert(&mut self, id: impl Into<String>, record: T) -> Result<(), StoreError> {
        let id = id.into();
        debug!(%id, "JsonStore::insert: called");
        self.commit(|records| {
            records.insert(id, record);
        })
    }

    /// Remove a record and persist the whole store
    pub fn remove(&mut self, id: &str) -> Result<Option<T>, StoreError> {
        debug!(%id, "JsonStore::remove: called");
        self.commit(|records| records.remove(id))
    }

    /// Re-read the file, apply `change` and write the result, all under one lock
    ///
    /// The in-memory map is replaced only after the write succeeds.
    fn commit<R>(&mut self, change: impl FnOnce(&mut BTreeMap<String, T>) -> R) -> Result<R, StoreError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store.json".to_string());

        let lock_path = parent.join(format!(".{}.lock", file_name));
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        FileExt::lock_exclusive(&lock).map_err(|source| StoreError::Lock {
            path: lock_path.clone(),
            source,
        })?;

        // An unreadable file has nothing worth merging; our copy wins
        let mut next = match Self::load(&self.path) {
            (_, LoadStatus::Recovered { .. }) => self.records.clone(),
            (on_disk, _) => on_disk,
        };
        let result = change(&mut next);

        self.write(&parent, &file_name, &next)?;
        self.records = next;

        // Lock is released when `lock` is dropped
        debug!(count = self.records.len(), "JsonStore::commit: complete");
        Ok(result)
    }

    /// Write `records` via temp file + fsync + rename; caller holds the lock
    fn write(&self, parent: &Path, file_name: &str, records: &BTreeMap<String, T>) -> Result<(), StoreError> {
        debug!(path = %self.path.display(), count = records.len(), "JsonStore::write: called");
        let content = serde_json::to_string_pretty(records)?;

        let tmp_path = parent.join(format!(".{}.tmp", file_name));
        let mut tmp = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        tmp.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(tmp);

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            warn!(path = %self.path.display(), error = %e, "Persist failed, keeping previous records");
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&self.path, e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        name: String,
        count: u32,
    }

    fn rec(name: &str, count: u32) -> Rec {
        Rec {
            name: name.to_string(),
            count,
        }
    }

    #[test]
    fn test_open_missing_file_is_fresh() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Rec> = JsonStore::open(dir.path().join("sessions.json"));

        assert!(store.is_empty());
        assert_eq!(store.load_status(), &LoadStatus::Fresh);
    }

    #[test]
    fn test_insert_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = JsonStore::open(&path);
        store.insert("a", rec("alpha", 1)).unwrap();
        store.insert("b", rec("beta", 2)).unwrap();
        drop(store);

        let reopened: JsonStore<Rec> = JsonStore::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a"), Some(&rec("alpha", 1)));
        assert_eq!(reopened.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            reopened.load_status(),
            &LoadStatus::Loaded {
                records: 2,
                dropped: 0
            }
        );
    }

    #[test]
    fn test_insert_replaces_existing_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = JsonStore::open(&path);
        store.insert("a", rec("alpha", 1)).unwrap();
        store.insert("a", rec("alpha", 7)).unwrap();

        let reopened: JsonStore<Rec> = JsonStore::open(&path);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("a").map(|r| r.count), Some(7));
    }

    #[test]
    fn test_corrupt_file_recovers_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(&path, "{ this is not json").unwrap();

        let mut store: JsonStore<Rec> = JsonStore::open(&path);
        assert!(store.is_empty());
        assert!(matches!(store.load_status(), LoadStatus::Recovered { .. }));

        // Next write replaces the corrupt file
        store.insert("a", rec("alpha", 1)).unwrap();
        let reopened: JsonStore<Rec> = JsonStore::open(&path);
        assert_eq!(reopened.get("a"), Some(&rec("alpha", 1)));
    }

    #[test]
    fn test_truncated_file_recovers_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = JsonStore::open(&path);
        store.insert("a", rec("alpha", 1)).unwrap();
        let full = fs::read_to_string(&path).unwrap();
        fs::write(&path, &full[..full.len() / 2]).unwrap();

        let reopened: JsonStore<Rec> = JsonStore::open(&path);
        assert!(reopened.is_empty());
        assert!(matches!(reopened.load_status(), LoadStatus::Recovered { .. }));
    }

    #[test]
    fn test_bad_record_is_dropped_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        fs::write(
            &path,
            r#"{"good": {"name": "ok", "count": 3}, "bad": {"name": 42}}"#,
        )
        .unwrap();

        let store: JsonStore<Rec> = JsonStore::open(&path);
        assert_eq!(store.len(), 1);
        assert!(store.get("bad").is_none());
        assert_eq!(store.get("good"), Some(&rec("ok", 3)));
        assert_eq!(
            store.load_status(),
            &LoadStatus::Loaded {
                records: 1,
                dropped: 1
            }
        );
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = JsonStore::open(&path);
        store.insert("a", rec("alpha", 1)).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join(".sessions.json.tmp").exists());
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the final rename fail
        let path = dir.path().join("sessions.json");
        fs::create_dir(&path).unwrap();

        let mut store: JsonStore<Rec> = JsonStore::open(&path);
        assert!(store.insert("a", rec("alpha", 1)).is_err());
        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut store = JsonStore::open(&path);
        store.insert("a", rec("alpha", 1)).unwrap();
        store.insert("b", rec("beta", 2)).unwrap();
        assert_eq!(store.remove("a").unwrap(), Some(rec("alpha", 1)));
        assert_eq!(store.remove("missing").unwrap(), None);

        let reopened: JsonStore<Rec> = JsonStore::open(&path);
        assert_eq!(reopened.ids(), vec!["b".to_string()]);
    }

    #[test]
    fn test_insert_keeps_records_from_other_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let mut first: JsonStore<Rec> = JsonStore::open(&path);
        let mut second: JsonStore<Rec> = JsonStore::open(&path);
        first.insert("a", rec("alpha", 1)).unwrap();
        second.insert("b", rec("beta", 2)).unwrap();

        // The write also refreshed the second handle
        assert_eq!(second.get("a"), Some(&rec("alpha", 1)));
        let reopened: JsonStore<Rec> = JsonStore::open(&path);
        assert_eq!(reopened.ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("sessions.json");

        let mut store = JsonStore::open(&path);
        store.insert("a", rec("alpha", 1)).unwrap();
        assert!(path.exists());
    }
}
