//! Per-plugin capability bundle.

use crate::commands::CommandHandler;
use crate::state::RuntimeState;
use crate::storage::Storage;
use crate::window::WindowFacade;
use nimbus_core::{Disposable, NimbusResult, PluginId};
use nimbus_plugin_api::{LanguageConfiguration, LanguageConfigurationPatch, StorageScope};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Everything one plugin may touch, scoped to its identity.
///
/// Every registration made through the context is recorded as a
/// subscription. [`dispose_all`](Self::dispose_all) undoes them in reverse
/// order on uninstall.
///
/// Until [`commit`](Self::commit) is called the context also remembers the
/// language records each registration displaced, so that
/// [`rollback`](Self::rollback) can leave the registry exactly as the load
/// found it.
pub struct PluginContext {
    plugin_id: PluginId,
    extension_path: String,
    global_state: Storage,
    workspace_state: Storage,
    subscriptions: Mutex<Vec<Arc<Disposable>>>,
    staged: Mutex<Option<Vec<(String, Option<LanguageConfiguration>)>>>,
    state: RuntimeState,
}

impl PluginContext {
    pub fn new(plugin_id: PluginId, state: &RuntimeState) -> Self {
        let extension_path = Path::new(&state.config.extension_root)
            .join(plugin_id.as_str())
            .to_string_lossy()
            .into_owned();

        Self {
            global_state: Storage::new(StorageScope::Global, &plugin_id, Arc::clone(&state.kv_store)),
            workspace_state: Storage::new(StorageScope::Workspace, &plugin_id, Arc::clone(&state.kv_store)),
            plugin_id,
            extension_path,
            subscriptions: Mutex::new(Vec::new()),
            staged: Mutex::new(Some(Vec::new())),
            state: state.clone(),
        }
    }

    #[must_use]
    pub const fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    #[must_use]
    pub fn extension_path(&self) -> &str {
        &self.extension_path
    }

    #[must_use]
    pub const fn global_state(&self) -> &Storage {
        &self.global_state
    }

    #[must_use]
    pub const fn workspace_state(&self) -> &Storage {
        &self.workspace_state
    }

    #[must_use]
    pub const fn storage(&self, scope: StorageScope) -> &Storage {
        match scope {
            StorageScope::Global => &self.global_state,
            StorageScope::Workspace => &self.workspace_state,
        }
    }

    #[must_use]
    pub const fn window(&self) -> &WindowFacade {
        &self.state.window
    }

    /// Registers `<plugin>.<name>`.
    pub fn register_command(&self, name: &str, handler: Arc<dyn CommandHandler>) -> NimbusResult<Arc<Disposable>> {
        let id = self.plugin_id.command(name);
        let registration = self.state.commands.register(id, handler)?;
        Ok(self.subscribe(registration))
    }

    pub fn register_language(&self, config: LanguageConfiguration) -> Arc<Disposable> {
        self.stage_language(&config.id);
        let registration = self.state.languages.register(config);
        self.subscribe(registration)
    }

    pub fn set_language_configuration(&self, id: &str, patch: LanguageConfigurationPatch) -> Arc<Disposable> {
        self.stage_language(id);
        let registration = self.state.languages.set_configuration(id, patch);
        self.subscribe(registration)
    }

    fn stage_language(&self, id: &str) {
        if let Some(staged) = self.staged.lock().as_mut() {
            staged.push((id.to_string(), self.state.languages.get(id)));
        }
    }

    /// Adds a disposable to the subscription list.
    pub fn subscribe(&self, disposable: Disposable) -> Arc<Disposable> {
        let disposable = Arc::new(disposable);
        self.subscriptions.lock().push(Arc::clone(&disposable));
        disposable
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Disposes every subscription, newest first, and empties the list.
    pub fn dispose_all(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        debug!(plugin_id = %self.plugin_id, count = subscriptions.len(), "Disposing plugin subscriptions");
        for subscription in subscriptions.into_iter().rev() {
            subscription.dispose();
        }
    }

    /// Marks the load as kept. Later disposal deletes languages outright.
    pub fn commit(&self) {
        self.staged.lock().take();
    }

    /// Undoes an uncommitted load: disposes every subscription, then puts
    /// back the language records that were displaced, oldest last.
    pub fn rollback(&self) {
        let staged = self.staged.lock().take().unwrap_or_default();
        self.dispose_all();
        debug!(plugin_id = %self.plugin_id, count = staged.len(), "Restoring displaced languages");
        for (id, snapshot) in staged.into_iter().rev() {
            self.state.languages.restore(&id, snapshot);
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("extension_path", &self.extension_path)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sync_handler;
    use serde_json::json;

    fn context(state: &RuntimeState) -> PluginContext {
        PluginContext::new(PluginId::new("p1"), state)
    }

    #[tokio::test]
    async fn test_commands_are_namespaced() {
        let state = RuntimeState::default();
        let ctx = context(&state);

        ctx.register_command("hello", sync_handler(|_| Ok(json!("world")))).unwrap();

        assert_eq!(state.commands.execute("p1.hello", vec![]).await.unwrap(), json!("world"));
        assert_eq!(ctx.subscription_count(), 1);
    }

    #[test]
    fn test_dispose_all_reverses_registrations() {
        let state = RuntimeState::default();
        let ctx = context(&state);
        let original = state.languages.get("python").unwrap();

        ctx.register_language(LanguageConfiguration::new("lua"));
        ctx.set_language_configuration(
            "python",
            LanguageConfigurationPatch {
                aliases: Some(vec!["Py3".to_string()]),
                ..LanguageConfigurationPatch::default()
            },
        );
        ctx.register_command("run", sync_handler(|_| Ok(json!(null)))).unwrap();

        ctx.dispose_all();

        assert!(!state.languages.contains("lua"));
        assert_eq!(state.languages.get("python").unwrap(), original);
        assert!(!state.commands.has_command("p1.run"));
        assert_eq!(ctx.subscription_count(), 0);
    }

    #[test]
    fn test_rollback_restores_replaced_languages() {
        let state = RuntimeState::default();
        let ctx = context(&state);
        let original = state.languages.get("python").unwrap();

        ctx.register_language(LanguageConfiguration::new("python").with_extensions([".pyx"]));
        ctx.set_language_configuration(
            "python",
            LanguageConfigurationPatch {
                aliases: Some(vec!["Cython".to_string()]),
                ..LanguageConfigurationPatch::default()
            },
        );
        ctx.register_language(LanguageConfiguration::new("lua"));

        ctx.rollback();

        assert_eq!(state.languages.get("python").unwrap(), original);
        assert!(!state.languages.contains("lua"));
        assert_eq!(ctx.subscription_count(), 0);
    }

    #[test]
    fn test_committed_context_deletes_on_dispose() {
        let state = RuntimeState::default();
        let ctx = context(&state);

        ctx.register_language(LanguageConfiguration::new("python"));
        ctx.commit();
        ctx.dispose_all();

        assert!(!state.languages.contains("python"));
    }

    #[test]
    fn test_failed_registration_is_not_recorded() {
        let state = RuntimeState::default();
        let first = context(&state);
        let second = context(&state);

        first.register_command("run", sync_handler(|_| Ok(json!(1)))).unwrap();
        assert!(second.register_command("run", sync_handler(|_| Ok(json!(2)))).is_err());

        assert_eq!(second.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_scopes() {
        let state = RuntimeState::default();
        let ctx = context(&state);

        ctx.global_state().update("k", &1).await.unwrap();
        ctx.workspace_state().update("k", &2).await.unwrap();

        assert_eq!(ctx.storage(StorageScope::Global).get::<i32>("k", None), Some(1));
        assert_eq!(ctx.storage(StorageScope::Workspace).get::<i32>("k", None), Some(2));
        assert!(ctx.extension_path().ends_with("p1"));
    }
}
