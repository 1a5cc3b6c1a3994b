//! Shared runtime state.

use crate::commands::CommandRegistry;
use crate::languages::LanguageRegistry;
use crate::storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use crate::window::{WindowBackend, WindowFacade};
use nimbus_config::{AppConfig, PluginConfig};
use nimbus_core::NimbusResult;
use std::sync::Arc;

/// Registries and services shared by every plugin of one runtime.
///
/// Passed explicitly to each component so several runtimes can live in one
/// process.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    pub commands: CommandRegistry,
    pub languages: LanguageRegistry,
    pub window: WindowFacade,
    pub kv_store: Arc<dyn KeyValueStore>,
    pub config: Arc<PluginConfig>,
}

impl RuntimeState {
    /// Creates a state with built-in languages, a headless window and an
    /// in-memory key/value store.
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        Self {
            commands: CommandRegistry::new(),
            languages: LanguageRegistry::with_builtins(),
            window: WindowFacade::headless(),
            kv_store: Arc::new(MemoryKeyValueStore::new()),
            config: Arc::new(config),
        }
    }

    /// Builds the state described by `config`, opening the file store when
    /// a storage path is configured.
    pub fn from_config(config: &AppConfig) -> NimbusResult<Self> {
        let state = Self::new(config.plugins.clone());
        match &config.storage.path {
            Some(path) => Ok(state.with_kv_store(Arc::new(FileKeyValueStore::open(path)?))),
            None => Ok(state),
        }
    }

    #[must_use]
    pub fn with_window_backend(mut self, backend: Arc<dyn WindowBackend>) -> Self {
        self.window = WindowFacade::new(backend);
        self
    }

    #[must_use]
    pub fn with_kv_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.kv_store = store;
        self
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(PluginConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_independent() {
        let a = RuntimeState::default();
        let b = RuntimeState::default();

        let _registration = a.commands.register(
            nimbus_core::PluginId::new("p1").command("x"),
            crate::commands::sync_handler(|_| Ok(serde_json::Value::Null)),
        );

        assert!(a.commands.has_command("p1.x"));
        assert!(!b.commands.has_command("p1.x"));
        assert!(b.languages.contains("javascript"));
    }

    #[test]
    fn test_from_config_opens_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.path = Some(dir.path().join("kv.json"));

        let state = RuntimeState::from_config(&config).unwrap();
        state.kv_store.set("plugin:global:p1:k", "1".to_string()).unwrap();

        assert!(dir.path().join("kv.json").exists());
    }
}
