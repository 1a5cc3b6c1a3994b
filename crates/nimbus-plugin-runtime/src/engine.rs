//! Plugin engine.
//!
//! Owns every loaded plugin and serializes lifecycle operations
//! (initialize, install, uninstall, shutdown) behind one async mutex.
//! Lifecycle operations report success as a `bool` and log the cause of a
//! failure; the `try_` variants return the underlying error.

use crate::compiler::{CompileService, CompilerDispatcher, HttpCompileService};
use crate::loader::{LoadedPlugin, PluginLoader, PluginOrigin};
use crate::native::{default_plugins, NativePlugin};
use crate::persistence::{HttpPluginStore, MemoryPluginStore, PluginStore};
use crate::state::RuntimeState;
use crate::validator;
use nimbus_config::AppConfig;
use nimbus_core::{NimbusError, NimbusResult};
use nimbus_plugin_api::{LanguageConfiguration, PluginManifest, PluginState, StoredPlugin};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

tokio::task_local! {
    /// Name of the lifecycle operation running on the current task.
    static LIFECYCLE: &'static str;
}

struct Entry {
    plugin: Arc<LoadedPlugin>,
    seq: u64,
}

/// Orchestrates plugin lifecycle against one [`RuntimeState`].
pub struct PluginEngine {
    state: RuntimeState,
    loader: PluginLoader,
    store: Arc<dyn PluginStore>,
    compiler: CompilerDispatcher,
    defaults: Vec<Arc<dyn NativePlugin>>,
    plugins: RwLock<HashMap<String, Entry>>,
    transitions: RwLock<HashMap<String, PluginState>>,
    failures: RwLock<HashMap<String, String>>,
    lifecycle: Mutex<()>,
    initialized: AtomicBool,
    next_seq: AtomicU64,
}

impl PluginEngine {
    /// Creates an engine. Compile requests use the default compile timeout
    /// until [`with_compile_timeout`](Self::with_compile_timeout) is called.
    pub fn new(state: RuntimeState, store: Arc<dyn PluginStore>, compile_service: Arc<dyn CompileService>) -> Self {
        let timeout = nimbus_config::CompilerServiceConfig::default().timeout();
        Self {
            loader: PluginLoader::new(state.clone()),
            compiler: CompilerDispatcher::new(state.languages.clone(), compile_service, timeout),
            state,
            store,
            defaults: default_plugins(),
            plugins: RwLock::new(HashMap::new()),
            transitions: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(()),
            initialized: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Builds an engine from application configuration: file-backed storage
    /// when a path is set, HTTP persistence when enabled, HTTP compiler.
    pub fn from_config(config: &AppConfig) -> NimbusResult<Self> {
        let state = RuntimeState::from_config(config)?;

        let store: Arc<dyn PluginStore> = if config.persistence.enabled {
            Arc::new(HttpPluginStore::new(&config.persistence)?)
        } else {
            info!("Remote persistence disabled, installed plugins live in memory");
            Arc::new(MemoryPluginStore::new())
        };
        let compile_service = Arc::new(HttpCompileService::new(&config.compiler)?);

        Ok(Self::new(state, store, compile_service).with_compile_timeout(config.compiler.timeout()))
    }

    #[must_use]
    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compiler = self.compiler.with_timeout(timeout);
        self
    }

    /// Replaces the plugins seeded by [`initialize`](Self::initialize).
    #[must_use]
    pub fn with_default_plugins(mut self, defaults: Vec<Arc<dyn NativePlugin>>) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &RuntimeState {
        &self.state
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    // ============ Lifecycle ============

    /// Loads the default plugins, then every stored plugin in order.
    ///
    /// Idempotent. A plugin that fails to load is skipped with a warning;
    /// an unreachable store leaves only the defaults loaded.
    pub async fn initialize(&self) -> NimbusResult<()> {
        self.serialized("initialize", || async {
            if self.is_initialized() {
                debug!("Plugin engine already initialized");
                return Ok(());
            }
            if !self.state.config.enabled {
                info!("Plugin system disabled, skipping initialization");
                self.initialized.store(true, Ordering::Release);
                return Ok(());
            }

            if self.state.config.load_defaults {
                for plugin in &self.defaults {
                    let id = plugin.manifest().id;
                    match self.load_native(Arc::clone(plugin), PluginOrigin::Builtin).await {
                        Ok(loaded) => self.insert(loaded),
                        Err(e) => warn!(plugin_id = %id, error = %e, "Skipping default plugin"),
                    }
                }
            }

            match self.store.list().await {
                Ok(stored) => {
                    debug!(count = stored.len(), "Restoring installed plugins");
                    for record in stored {
                        let id = record.manifest.id.clone();
                        match self.load_sandboxed(record.manifest, &record.code).await {
                            Ok(loaded) => self.insert(loaded),
                            Err(e) => warn!(plugin_id = %id, error = %e, "Skipping installed plugin"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Could not fetch installed plugins"),
            }

            self.initialized.store(true, Ordering::Release);
            info!(plugins = self.plugins.read().len(), "Plugin engine initialized");
            Ok(())
        })
        .await
    }

    /// Installs and persists a sandboxed plugin. Returns `false` on any
    /// failure; the runtime is left as it was, including any language
    /// records the plugin replaced.
    pub async fn install_plugin(&self, manifest: PluginManifest, code: &str) -> bool {
        let id = manifest.id.clone();
        match self.try_install_plugin(manifest, code).await {
            Ok(()) => true,
            Err(e) => {
                warn!(plugin_id = %id, error = %e, "Plugin install failed");
                false
            }
        }
    }

    pub async fn try_install_plugin(&self, manifest: PluginManifest, code: &str) -> NimbusResult<()> {
        self.serialized("install", || async move {
            validator::check(&manifest)?;
            let record = StoredPlugin {
                manifest: manifest.clone(),
                code: code.to_string(),
            };

            let plugin = self.load_sandboxed(manifest, code).await?;

            if let Err(e) = self.store.save(&record).await {
                warn!(plugin_id = %plugin.id(), error = %e, "Persisting plugin failed, discarding it");
                plugin.discard().await;
                self.failures.write().insert(record.manifest.id, e.to_string());
                return Err(e);
            }

            info!(plugin_id = %plugin.id(), version = %plugin.manifest().version, "Plugin installed");
            self.insert(plugin);
            Ok(())
        })
        .await
    }

    /// Activates a native plugin for this process only; it is not persisted.
    pub async fn install_native(&self, plugin: Arc<dyn NativePlugin>) -> bool {
        let id = plugin.manifest().id;
        let result = self
            .serialized("install", || async {
                let loaded = self.load_native(plugin, PluginOrigin::Builtin).await?;
                self.insert(loaded);
                Ok(())
            })
            .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(plugin_id = %id, error = %e, "Native plugin install failed");
                false
            }
        }
    }

    /// Uninstalls a plugin. Returns `false` on any failure, in which case
    /// the plugin stays loaded.
    pub async fn uninstall_plugin(&self, id: &str) -> bool {
        match self.try_uninstall_plugin(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(plugin_id = %id, error = %e, "Plugin uninstall failed");
                false
            }
        }
    }

    /// Deletes the stored record first so that a persistence failure leaves
    /// the plugin fully loaded, then tears it down and drops it from the map.
    pub async fn try_uninstall_plugin(&self, id: &str) -> NimbusResult<()> {
        self.serialized("uninstall", || async {
            let plugin = self
                .plugin(id)
                .ok_or_else(|| NimbusError::PluginNotFound(id.to_string()))?;

            if plugin.origin() == PluginOrigin::Installed {
                self.store.delete(plugin.id()).await?;
            }

            self.transitions.write().insert(id.to_string(), PluginState::Unloading);
            plugin.unload().await;
            self.plugins.write().remove(id);
            self.transitions.write().remove(id);

            info!(plugin_id = %id, "Plugin uninstalled");
            Ok(())
        })
        .await
    }

    /// Tears down every plugin, newest first, without touching the store.
    /// A later [`initialize`](Self::initialize) starts from scratch.
    pub async fn shutdown(&self) -> NimbusResult<()> {
        self.serialized("shutdown", || async {
            let mut entries: Vec<(u64, Arc<LoadedPlugin>)> = self
                .plugins
                .read()
                .values()
                .map(|entry| (entry.seq, Arc::clone(&entry.plugin)))
                .collect();
            entries.sort_by(|a, b| b.0.cmp(&a.0));

            for (_, plugin) in &entries {
                self.transitions
                    .write()
                    .insert(plugin.id().to_string(), PluginState::Unloading);
                plugin.unload().await;
                self.plugins.write().remove(plugin.id().as_str());
                self.transitions.write().remove(plugin.id().as_str());
            }

            self.failures.write().clear();
            self.initialized.store(false, Ordering::Release);
            info!(unloaded = entries.len(), "Plugin engine shut down");
            Ok(())
        })
        .await
    }

    // ============ Read surface ============

    /// Manifests of loaded plugins in load order.
    #[must_use]
    pub fn installed_plugins(&self) -> Vec<PluginManifest> {
        self.loaded_plugins()
            .iter()
            .map(|plugin| plugin.manifest().clone())
            .collect()
    }

    /// Loaded plugins in load order.
    #[must_use]
    pub fn loaded_plugins(&self) -> Vec<Arc<LoadedPlugin>> {
        let plugins = self.plugins.read();
        let mut entries: Vec<&Entry> = plugins.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| Arc::clone(&entry.plugin)).collect()
    }

    #[must_use]
    pub fn plugin(&self, id: &str) -> Option<Arc<LoadedPlugin>> {
        self.plugins.read().get(id).map(|entry| Arc::clone(&entry.plugin))
    }

    #[must_use]
    pub fn plugin_state(&self, id: &str) -> PluginState {
        if let Some(state) = self.transitions.read().get(id) {
            return *state;
        }
        if self.plugins.read().contains_key(id) {
            PluginState::Active
        } else if self.failures.read().contains_key(id) {
            PluginState::Failed
        } else {
            PluginState::Unloaded
        }
    }

    /// Why the last load of `id` failed, if it did.
    #[must_use]
    pub fn plugin_error(&self, id: &str) -> Option<String> {
        self.failures.read().get(id).cloned()
    }

    #[must_use]
    pub fn languages(&self) -> Vec<LanguageConfiguration> {
        self.state.languages.all()
    }

    #[must_use]
    pub fn language(&self, id: &str) -> Option<LanguageConfiguration> {
        self.state.languages.get(id)
    }

    #[must_use]
    pub fn language_for_file(&self, file_name: &str) -> Option<LanguageConfiguration> {
        self.state.languages.for_file_name(file_name)
    }

    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.commands()
    }

    pub async fn execute_command(&self, command: &str, args: Vec<Value>) -> NimbusResult<Value> {
        self.state.commands.execute(command, args).await
    }

    pub async fn compile_and_run(&self, language_id: &str, code: &str, file_name: &str) -> NimbusResult<String> {
        self.compiler.compile_and_run(language_id, code, file_name).await
    }

    // ============ Internals ============

    /// Runs `f` holding the lifecycle lock. A lifecycle call made from
    /// inside another on the same task fails instead of deadlocking.
    async fn serialized<F, Fut, T>(&self, operation: &'static str, f: F) -> NimbusResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = NimbusResult<T>>,
    {
        if let Ok(outer) = LIFECYCLE.try_with(|outer| *outer) {
            return Err(NimbusError::Reentrant(format!("{operation} called during {outer}")));
        }

        let _guard = self.lifecycle.lock().await;
        LIFECYCLE.scope(operation, f()).await
    }

    async fn load_sandboxed(&self, manifest: PluginManifest, code: &str) -> NimbusResult<LoadedPlugin> {
        let id = manifest.id.clone();
        self.tracked(&id, self.loader.load(manifest, code, PluginOrigin::Installed))
            .await
    }

    async fn load_native(&self, plugin: Arc<dyn NativePlugin>, origin: PluginOrigin) -> NimbusResult<LoadedPlugin> {
        let id = plugin.manifest().id;
        self.tracked(&id, self.loader.load_native(plugin, origin)).await
    }

    /// Rejects duplicates and records the loading/failed state around `load`.
    async fn tracked<Fut>(&self, id: &str, load: Fut) -> NimbusResult<LoadedPlugin>
    where
        Fut: Future<Output = NimbusResult<LoadedPlugin>>,
    {
        if self.plugins.read().contains_key(id) {
            return Err(NimbusError::DuplicatePlugin(id.to_string()));
        }

        self.failures.write().remove(id);
        self.transitions.write().insert(id.to_string(), PluginState::Loading);
        let result = load.await;
        self.transitions.write().remove(id);

        if let Err(e) = &result {
            if !matches!(e, NimbusError::Validation(_)) {
                self.failures.write().insert(id.to_string(), e.to_string());
            }
        }
        result
    }

    fn insert(&self, plugin: LoadedPlugin) {
        plugin.context().commit();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.plugins.write().insert(
            plugin.id().to_string(),
            Entry {
                plugin: Arc::new(plugin),
                seq,
            },
        );
    }
}

impl std::fmt::Debug for PluginEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEngine")
            .field("plugins", &self.plugins.read().len())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::MockCompileService;
    use crate::context::PluginContext;
    use crate::persistence::MockPluginStore;
    use async_trait::async_trait;

    fn engine_with(store: MockPluginStore) -> PluginEngine {
        PluginEngine::new(
            RuntimeState::default(),
            Arc::new(store),
            Arc::new(MockCompileService::new()),
        )
    }

    #[tokio::test]
    async fn test_initialize_seeds_defaults_and_is_idempotent() {
        let mut store = MockPluginStore::new();
        store.expect_list().times(1).returning(|| Ok(Vec::new()));
        let engine = engine_with(store);

        engine.initialize().await.unwrap();
        engine.initialize().await.unwrap();

        let ids: Vec<_> = engine.installed_plugins().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["nimbus.core-languages", "nimbus.themes", "nimbus.file-manager"]);
        assert!(engine.is_initialized());
        assert_eq!(engine.plugin_state("nimbus.themes"), PluginState::Active);
    }

    #[tokio::test]
    async fn test_initialize_survives_unreachable_store() {
        let mut store = MockPluginStore::new();
        store
            .expect_list()
            .returning(|| Err(NimbusError::external("plugin-store", "connection refused")));
        let engine = engine_with(store);

        engine.initialize().await.unwrap();
        assert_eq!(engine.installed_plugins().len(), 3);
    }

    #[tokio::test]
    async fn test_builtin_uninstall_skips_store() {
        let mut store = MockPluginStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store.expect_delete().never();
        let engine = engine_with(store);
        engine.initialize().await.unwrap();

        assert!(engine.uninstall_plugin("nimbus.themes").await);
        assert_eq!(engine.plugin_state("nimbus.themes"), PluginState::Unloaded);
        assert!(!engine.uninstall_plugin("nimbus.themes").await);
    }

    struct Nested {
        engine: Arc<PluginEngine>,
    }

    #[async_trait]
    impl NativePlugin for Nested {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new("nested", "Nested", "1.0.0")
        }

        async fn activate(&self, _context: Arc<PluginContext>) -> NimbusResult<()> {
            self.engine.try_uninstall_plugin("nimbus.themes").await
        }
    }

    #[tokio::test]
    async fn test_reentrant_lifecycle_call_fails() {
        let mut store = MockPluginStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        let engine = Arc::new(engine_with(store));
        engine.initialize().await.unwrap();

        let installed = engine
            .install_native(Arc::new(Nested {
                engine: Arc::clone(&engine),
            }))
            .await;

        assert!(!installed);
        assert_eq!(engine.plugin_state("nested"), PluginState::Failed);
        assert!(engine.plugin_error("nested").unwrap().contains("Reentrant"));
        assert_eq!(engine.plugin_state("nimbus.themes"), PluginState::Active);
    }

    #[tokio::test]
    async fn test_shutdown_allows_fresh_initialize() {
        let mut store = MockPluginStore::new();
        store.expect_list().times(2).returning(|| Ok(Vec::new()));
        let engine = engine_with(store);

        engine.initialize().await.unwrap();
        engine.shutdown().await.unwrap();
        assert!(engine.installed_plugins().is_empty());
        assert!(!engine.is_initialized());

        engine.initialize().await.unwrap();
        assert_eq!(engine.installed_plugins().len(), 3);
    }
}
