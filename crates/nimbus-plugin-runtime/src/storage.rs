//! Per-plugin key/value storage.
//!
//! A [`Storage`] facade partitions a shared [`KeyValueStore`] by namespace
//! (`global:<plugin>` or `workspace:<plugin>`). Physical keys take the form
//! `plugin:<namespace>:<key>` and values are stored as JSON text.

use nimbus_core::{Disposable, NimbusError, NimbusResult, PluginId};
use nimbus_plugin_api::StorageScope;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Local string-to-string store shared by every plugin.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> NimbusResult<Option<String>>;
    fn set(&self, key: &str, value: String) -> NimbusResult<()>;
    fn remove(&self, key: &str) -> NimbusResult<()>;
    /// Returns every key starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> NimbusResult<Vec<String>>;
}

impl std::fmt::Debug for dyn KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyValueStore")
    }
}

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> NimbusResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> NimbusResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> NimbusResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> NimbusResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// The whole map is rewritten on every change through a temporary file
/// and a rename.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> NimbusResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| NimbusError::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| NimbusError::Storage(format!("Corrupt store {}: {}", path.display(), e)))?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened key/value store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> NimbusResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| NimbusError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| NimbusError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| NimbusError::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> NimbusResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    /// The in-memory map only changes once the file write succeeded.
    fn set(&self, key: &str, value: String) -> NimbusResult<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> NimbusResult<()> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> NimbusResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Notification delivered to [`Storage::on_did_change`] listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub namespace: String,
    pub key: String,
    pub value: Value,
}

type ChangeListener = Arc<dyn Fn(&StorageChange) + Send + Sync>;

/// Key/value facade scoped to one plugin and one scope.
pub struct Storage {
    namespace: String,
    store: Arc<dyn KeyValueStore>,
    listeners: Arc<RwLock<Vec<(u64, ChangeListener)>>>,
    next_listener: AtomicU64,
}

impl Storage {
    pub fn new(scope: StorageScope, plugin_id: &PluginId, store: Arc<dyn KeyValueStore>) -> Self {
        let prefix = match scope {
            StorageScope::Global => "global",
            StorageScope::Workspace => "workspace",
        };
        Self {
            namespace: format!("{prefix}:{plugin_id}"),
            store,
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Returns `global:<id>` or `workspace:<id>`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn physical_key(&self, key: &str) -> String {
        format!("plugin:{}:{}", self.namespace, key)
    }

    /// Reads `key`, falling back to `default` when it is absent or does not
    /// parse as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: Option<T>) -> Option<T> {
        match self.get_value(key) {
            Some(value) => serde_json::from_value(value).map_or(default, Some),
            None => default,
        }
    }

    /// Reads `key` as raw JSON.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(&self.physical_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(namespace = %self.namespace, key = %key, error = %e, "Storage read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(namespace = %self.namespace, key = %key, error = %e, "Stored value is not JSON");
                None
            }
        }
    }

    /// Writes `value` under `key`; the last write wins.
    pub async fn update<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> NimbusResult<()> {
        self.set_value(key, serde_json::to_value(value)?)
    }

    /// Writes raw JSON under `key` and notifies listeners.
    pub fn set_value(&self, key: &str, value: Value) -> NimbusResult<()> {
        self.store.set(&self.physical_key(key), serde_json::to_string(&value)?)?;

        let listeners: Vec<ChangeListener> = self.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        if !listeners.is_empty() {
            let change = StorageChange {
                namespace: self.namespace.clone(),
                key: key.to_string(),
                value,
            };
            for listener in listeners {
                listener(&change);
            }
        }
        Ok(())
    }

    /// Lists the logical keys in this namespace.
    pub fn keys(&self) -> NimbusResult<Vec<String>> {
        let prefix = self.physical_key("");
        Ok(self
            .store
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Calls `listener` after every successful write to this namespace.
    pub fn on_did_change<F>(&self, listener: F) -> Disposable
    where
        F: Fn(&StorageChange) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));

        let listeners = Arc::clone(&self.listeners);
        Disposable::new(move || listeners.write().retain(|(existing, _)| *existing != id))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("namespace", &self.namespace)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
