//! Durable operator overrides keyed by node id.
//!
//! Two instances exist at runtime: display label overrides and task
//! assignment overrides. Each is a flat `String -> String` JSON object on
//! disk, rewritten through a temp file and a rename so a crash mid-write
//! leaves the previous snapshot intact. Persistence is best effort: the
//! in-memory map stays authoritative when the disk refuses a write.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Resolution of one override field for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    /// No operator opinion has ever been recorded.
    Inherit,
    /// An operator removed a previous value during this process lifetime.
    Cleared,
    /// An operator value is in force.
    Set(String),
}

impl Override {
    pub fn value(&self) -> Option<&str> {
        match self {
            Override::Set(value) => Some(value.as_str()),
            Override::Inherit | Override::Cleared => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Override::Set(_))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    values: BTreeMap<String, String>,
    cleared: HashSet<String>,
}

/// JSON-backed override store.
#[derive(Debug)]
pub struct OverrideStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl OverrideStore {
    /// Open the store at `path`. Absent or corrupt files load as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Cannot create state directory {}: {}", parent.display(), e);
            }
        }

        let values = match load_values(&path) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Ignoring unreadable override store {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        tracing::debug!("Loaded {} overrides from {}", values.len(), path.display());

        Self {
            path: Some(path),
            state: Mutex::new(StoreState {
                values,
                cleared: HashSet::new(),
            }),
        }
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().values.get(key).cloned()
    }

    pub fn resolve(&self, key: &str) -> Override {
        let state = self.state.lock();
        match state.values.get(key) {
            Some(value) => Override::Set(value.clone()),
            None if state.cleared.contains(key) => Override::Cleared,
            None => Override::Inherit,
        }
    }

    /// Record `value` for `key`. Blank values clear the key instead.
    pub fn set(&self, key: &str, value: &str) {
        if value.trim().is_empty() {
            self.clear(key);
            return;
        }
        let mut state = self.state.lock();
        state.cleared.remove(key);
        state.values.insert(key.to_string(), value.to_string());
        self.persist(&state.values);
    }

    pub fn clear(&self, key: &str) {
        let mut state = self.state.lock();
        let existed = state.values.remove(key).is_some();
        state.cleared.insert(key.to_string());
        if existed {
            self.persist(&state.values);
        }
    }

    /// Copy of every stored override.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.state.lock().values.clone()
    }

    fn persist(&self, values: &BTreeMap<String, String>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomic(path, values) {
            tracing::warn!("Failed to persist overrides to {}: {}", path.display(), e);
        }
    }
}

fn load_values(path: &Path) -> Result<BTreeMap<String, String>, Error> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let serde_json::Value::Object(map) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect())
}

fn write_atomic(path: &Path, values: &BTreeMap<String, String>) -> Result<(), Error> {
    let tmp_path = path.with_extension("tmp");
    let data = serde_json::to_string_pretty(values)?;
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_persists_and_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("labels.json");

        let store = OverrideStore::open(&path);
        store.set("rpi-07", "Garage Pi");
        assert_eq!(store.get("rpi-07").as_deref(), Some("Garage Pi"));
        assert!(!temp_dir.path().join("labels.tmp").exists());

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("rpi-07").map(String::as_str), Some("Garage Pi"));

        let reopened = OverrideStore::open(&path);
        assert_eq!(reopened.resolve("rpi-07"), Override::Set("Garage Pi".to_string()));
    }

    #[test]
    fn test_tri_state_resolution() {
        let store = OverrideStore::in_memory();
        assert_eq!(store.resolve("rpi-01"), Override::Inherit);

        store.set("rpi-01", "Backup");
        assert!(store.resolve("rpi-01").is_set());

        store.clear("rpi-01");
        assert_eq!(store.resolve("rpi-01"), Override::Cleared);
        assert_eq!(store.resolve("rpi-01").value(), None);

        store.set("rpi-01", "   ");
        assert_eq!(store.resolve("rpi-01"), Override::Cleared);
    }

    #[test]
    fn test_corrupt_and_non_object_files_load_empty() {
        let temp_dir = TempDir::new().unwrap();
        let corrupt = temp_dir.path().join("tasks.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(OverrideStore::open(&corrupt).entries().is_empty());

        let list = temp_dir.path().join("labels.json");
        std::fs::write(&list, "[1, 2, 3]").unwrap();
        assert!(OverrideStore::open(&list).entries().is_empty());
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        std::fs::write(&path, r#"{"rpi-02": 42, "rpi-03": "Backups"}"#).unwrap();

        let store = OverrideStore::open(&path);
        assert_eq!(store.get("rpi-02").as_deref(), Some("42"));
        assert_eq!(store.get("rpi-03").as_deref(), Some("Backups"));
    }

    #[test]
    fn test_clear_removes_key_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");

        let store = OverrideStore::open(&path);
        store.set("rpi-04", "Media server");
        store.clear("rpi-04");

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(on_disk.is_empty());
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = temp_dir.path().join("labels.json");
        std::fs::create_dir_all(&path).unwrap();

        let store = OverrideStore::open(&path);
        store.set("rpi-05", "Workshop");
        assert_eq!(store.get("rpi-05").as_deref(), Some("Workshop"));
    }
}
