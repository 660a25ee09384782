//! Persistence layer: a durable key-value store of JSON documents keyed by
//! logical collection name ("students", "activities", ...), with a change
//! notification channel so another session's writes can be folded back into
//! in-memory state.
//!
//! The domain store depends only on the `StateStore` trait; the storage
//! medium is an adapter. Malformed stored content is treated as absent — the
//! caller falls back to the collection's initial empty value.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const NOTIFY_CAPACITY: usize = 16;

pub trait StateStore: Send + Sync {
    /// Fetch the document stored under `key`, or None if absent/unreadable.
    fn get(&self, key: &str) -> Option<Value>;

    /// Replace the document stored under `key`. Write failures are logged,
    /// never propagated; subscribers are notified either way.
    fn set(&self, key: &str, value: Value);

    /// Subscribe to key names of subsequent writes. Notifications are
    /// advisory: receivers re-read and deep-compare before acting.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// One `<key>.json` file per logical key under a root directory.
pub struct FileStore {
    root: PathBuf,
    notify: broadcast::Sender<String>,
}

impl FileStore {
    /// Root from DATA_DIR (default "./data"); the directory is created eagerly
    /// so the first write cannot fail on a missing parent.
    pub fn from_env() -> Self {
        let root = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into());
        Self::new(PathBuf::from(root))
    }

    pub fn new(root: PathBuf) -> Self {
        if let Err(e) = std::fs::create_dir_all(&root) {
            error!(target: "edututor_backend", path = %root.display(), error = %e, "Failed to create data directory");
        } else {
            info!(target: "edututor_backend", path = %root.display(), "File store ready");
        }
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { root, notify }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                debug!(target: "edututor_backend", %key, error = %e, "Store key not readable");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                error!(target: "edututor_backend", %key, error = %e, "Corrupt stored JSON; treating as absent");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value) {
        let path = self.path_for(key);
        match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&path, text) {
                    error!(target: "edututor_backend", %key, error = %e, "Failed to persist store key");
                }
            }
            Err(e) => {
                error!(target: "edututor_backend", %key, error = %e, "Failed to serialize store key");
            }
        }
        let _ = self.notify.send(key.to_string());
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notify.subscribe()
    }
}

/// In-process adapter for tests.
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
    notify: broadcast::Sender<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { data: Mutex::new(HashMap::new()), notify }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        if let Ok(mut data) = self.data.lock() {
            data.insert(key.to_string(), value);
        }
        let _ = self.notify.send(key.to_string());
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_store_round_trips_documents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("data"));
        assert!(store.get("students").is_none());

        store.set("students", json!([{"id": "s1", "name": "Ana"}]));
        let loaded = store.get("students").unwrap();
        assert_eq!(loaded[0]["name"], "Ana");
    }

    #[test]
    fn file_store_treats_corrupt_content_as_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        std::fs::write(tmp.path().join("answers.json"), "{not json").unwrap();
        assert!(store.get("answers").is_none());
    }

    #[test]
    fn writes_notify_subscribers_with_the_key() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.set("goals", json!([]));
        assert_eq!(rx.try_recv().unwrap(), "goals");
    }
}
