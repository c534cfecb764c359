use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RANKING_KEY: &str = "sprintaiko-ranking";
pub const HISPEED_KEY: &str = "sprintaiko-hispeed";
pub const NOTES_COUNT_KEY: &str = "sprintaiko-notes-count";
pub const VOLUME_KEY: &str = "sprintaiko-volume";
pub const ANIMATION_SPEED_KEY: &str = "sprintaiko-animation-speed";
pub const KEY_CONFIG_KEY: &str = "sprintaiko-key-config";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("save file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("save file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key-value persistence. A missing key always means "use the default".
pub trait Store {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

impl<T: Store + ?Sized> Store for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Keeps everything in memory; used when saving is switched off.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` and `remove` calls so far.
    #[cfg(test)]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn record_write(&mut self, key: &str) {
        self.writes += 1;
        debug!("In-memory write #{} to {:?}.", self.writes, key);
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.record_write(key);
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.record_write(key);
        self.values.remove(key);
        Ok(())
    }
}

/// A flat JSON object on disk, rewritten whole after every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens the save file. A missing or unreadable file starts an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match read_values(&path) {
            Ok(Some(values)) => {
                info!("Loaded {} saved values from '{}'.", values.len(), path.display());
                values
            }
            Ok(None) => {
                info!("No save file at '{}', starting fresh.", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Ignoring save file '{}': {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<Option<BTreeMap<String, String>>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

impl Store for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_memory_store_sets_and_removes() {
        let mut store: Box<dyn Store> = Box::new(MemoryStore::new());
        assert_eq!(store.get(VOLUME_KEY), None);
        store.set(VOLUME_KEY, "0.5").unwrap();
        assert_eq!(store.get(VOLUME_KEY).as_deref(), Some("0.5"));
        store.remove(VOLUME_KEY).unwrap();
        assert_eq!(store.get(VOLUME_KEY), None);
    }

    #[test]
    fn memory_store_counts_every_write() {
        let mut store = MemoryStore::new();
        assert_eq!(store.writes(), 0);
        store.set(RANKING_KEY, "[]").unwrap();
        store.remove(RANKING_KEY).unwrap();
        store.remove(RANKING_KEY).unwrap();
        assert_eq!(store.writes(), 3);
        assert_eq!(store.get(RANKING_KEY), None);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save").join("sprintaiko.json");

        let mut store = JsonFileStore::open(&path);
        store.set(HISPEED_KEY, "1.5").unwrap();
        store.set(KEY_CONFIG_KEY, r#"{"don_left":";"}"#).unwrap();
        store.set(NOTES_COUNT_KEY, "250").unwrap();
        store.remove(NOTES_COUNT_KEY).unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get(HISPEED_KEY).as_deref(), Some("1.5"));
        assert_eq!(reopened.get(KEY_CONFIG_KEY).as_deref(), Some(r#"{"don_left":";"}"#));
        assert_eq!(reopened.get(NOTES_COUNT_KEY), None);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprintaiko.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(RANKING_KEY), None);
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn unwritable_target_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // The save path is an existing directory, so the write itself fails.
        let mut store = JsonFileStore::open(dir.path());
        assert!(matches!(store.set(VOLUME_KEY, "0.3"), Err(StoreError::Io(_))));
    }
}
