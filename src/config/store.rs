//! Persisted screen id ↔ connector mapping
//!
//! The store is a write-back cache: entries are changed in memory and only
//! reach the disk on `sync()`. The pool decides when to sync (cooldown timer
//! and shutdown).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::settings::Settings;
use crate::constants::config;

/// Durable key → string mapping. Keys are screen ids rendered as decimal strings.
pub trait ConnectorStore {
    /// All stored (key, connector) pairs
    fn read_all(&self) -> Vec<(String, String)>;

    fn write_entry(&mut self, key: &str, value: &str);

    fn delete_entry(&mut self, key: &str);

    /// Flush pending changes to durable storage
    fn sync(&mut self) -> Result<()>;
}

/// On-disk layout of the connectors file
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectorsFile {
    #[serde(rename = "ScreenConnectors", default)]
    connectors: BTreeMap<String, String>,
}

/// JSON file store under the user config directory
#[derive(Debug)]
pub struct JsonConnectorStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl JsonConnectorStore {
    pub fn default_path() -> PathBuf {
        Settings::config_dir().join(config::CONNECTORS_FILENAME)
    }

    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt file is logged and treated as empty too, so a
    /// broken mapping never prevents startup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<ConnectorsFile>(&contents) {
                Ok(file) => {
                    info!(path = %path.display(), count = file.connectors.len(), "Loaded screen connector mapping");
                    file.connectors
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt screen connector file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No screen connector file yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read screen connector file, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl ConnectorStore for JsonConnectorStore {
    fn read_all(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn write_entry(&mut self, key: &str, value: &str) {
        if self.entries.get(key).map(String::as_str) != Some(value) {
            self.entries.insert(key.to_string(), value.to_string());
            self.dirty = true;
        }
    }

    fn delete_entry(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
    }

    fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory {:?}", parent))?;
        }

        let file = ConnectorsFile {
            connectors: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize screen connectors")?;

        // Write next to the target and rename so a crash never leaves a half-written file
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write screen connectors to {:?}", tmp_path))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move screen connectors into place at {:?}", self.path))?;

        self.dirty = false;
        info!(path = %self.path.display(), count = self.entries.len(), "Saved screen connector mapping");
        Ok(())
    }
}

/// Store that never touches the disk (`--no-persist`, tests)
#[derive(Debug, Default, Clone)]
pub struct MemoryConnectorStore {
    entries: BTreeMap<String, String>,
    syncs: usize,
}

impl MemoryConnectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            syncs: 0,
        }
    }

    /// How many times `sync()` was called
    pub fn sync_count(&self) -> usize {
        self.syncs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl ConnectorStore for MemoryConnectorStore {
    fn read_all(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn write_entry(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn delete_entry(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn sync(&mut self) -> Result<()> {
        self.syncs += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConnectorStore::open(dir.path().join("screen_connectors.json"));
        assert!(store.read_all().is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_json_store_sync_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("screen_connectors.json");

        let mut store = JsonConnectorStore::open(&path);
        store.write_entry("0", "eDP-1");
        store.write_entry("1", "HDMI-1");
        assert!(store.is_dirty());
        store.sync().unwrap();
        assert!(!store.is_dirty());

        let reopened = JsonConnectorStore::open(&path);
        assert_eq!(
            reopened.read_all(),
            vec![
                ("0".to_string(), "eDP-1".to_string()),
                ("1".to_string(), "HDMI-1".to_string()),
            ]
        );

        // Grouped under the same section name the mapping has always used
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["ScreenConnectors"]["1"], "HDMI-1");
    }

    #[test]
    fn test_json_store_delete_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen_connectors.json");

        let mut store = JsonConnectorStore::open(&path);
        store.write_entry("0", "eDP-1");
        store.write_entry("3", "DP-1");
        store.sync().unwrap();

        store.delete_entry("3");
        store.sync().unwrap();

        let reopened = JsonConnectorStore::open(&path);
        assert_eq!(reopened.read_all().len(), 1);
    }

    #[test]
    fn test_json_store_unchanged_write_is_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonConnectorStore::open(dir.path().join("screen_connectors.json"));
        store.write_entry("0", "eDP-1");
        store.sync().unwrap();

        store.write_entry("0", "eDP-1");
        store.delete_entry("9");
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_json_store_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen_connectors.json");
        fs::write(&path, "{{{ definitely not json").unwrap();

        let store = JsonConnectorStore::open(&path);
        assert!(store.read_all().is_empty());
    }

    #[test]
    fn test_memory_store_counts_syncs() {
        let mut store = MemoryConnectorStore::with_entries([("0", "eDP-1")]);
        assert_eq!(store.get("0"), Some("eDP-1"));
        store.sync().unwrap();
        store.sync().unwrap();
        assert_eq!(store.sync_count(), 2);
    }
}
