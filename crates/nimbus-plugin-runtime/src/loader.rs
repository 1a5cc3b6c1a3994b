//! Plugin loader.
//!
//! Turns a manifest plus code into an activated [`LoadedPlugin`]. A load
//! either completes or leaves nothing behind: every contribution made on
//! the way is recorded in the plugin's context and disposed if a later step
//! fails.

use crate::context::PluginContext;
use crate::native::NativePlugin;
use crate::sandbox::{self, Isolate, IsolateOptions};
use crate::state::RuntimeState;
use crate::validator;
use chrono::{DateTime, Utc};
use nimbus_core::{with_timeout, NimbusError, NimbusResult, PluginId};
use nimbus_plugin_api::PluginManifest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a plugin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginOrigin {
    /// Shipped with the host; never persisted.
    Builtin,
    /// Installed by the user and stored remotely.
    Installed,
}

enum PluginCode {
    Native(Arc<dyn NativePlugin>),
    Sandboxed(Isolate),
}

/// An activated plugin.
pub struct LoadedPlugin {
    manifest: PluginManifest,
    origin: PluginOrigin,
    context: Arc<PluginContext>,
    code: PluginCode,
    activated_at: DateTime<Utc>,
}

impl LoadedPlugin {
    #[must_use]
    pub fn id(&self) -> &PluginId {
        self.context.plugin_id()
    }

    #[must_use]
    pub const fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    #[must_use]
    pub const fn origin(&self) -> PluginOrigin {
        self.origin
    }

    #[must_use]
    pub const fn activated_at(&self) -> DateTime<Utc> {
        self.activated_at
    }

    #[must_use]
    pub fn context(&self) -> &Arc<PluginContext> {
        &self.context
    }

    #[must_use]
    pub const fn is_sandboxed(&self) -> bool {
        matches!(self.code, PluginCode::Sandboxed(_))
    }

    /// Deactivates the plugin, disposes its subscriptions and stops its
    /// isolate. A failing `deactivate` is logged and teardown continues.
    pub async fn unload(&self) {
        self.teardown(false).await;
        debug!(plugin_id = %self.id(), "Plugin unloaded");
    }

    /// Like [`unload`](Self::unload) for a plugin that was never committed:
    /// language records it displaced are put back.
    pub async fn discard(&self) {
        self.teardown(true).await;
        debug!(plugin_id = %self.id(), "Plugin discarded");
    }

    async fn teardown(&self, restore: bool) {
        let deactivated = match &self.code {
            PluginCode::Native(plugin) => plugin.deactivate().await,
            PluginCode::Sandboxed(isolate) => isolate.deactivate().await,
        };
        if let Err(e) = deactivated {
            warn!(plugin_id = %self.id(), error = %e, "Plugin deactivate failed");
        }

        if restore {
            self.context.rollback();
        } else {
            self.context.dispose_all();
        }

        if let PluginCode::Sandboxed(isolate) = &self.code {
            isolate.shutdown().await;
        }
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("id", &self.manifest.id)
            .field("version", &self.manifest.version)
            .field("origin", &self.origin)
            .field("sandboxed", &self.is_sandboxed())
            .field("activated_at", &self.activated_at)
            .finish()
    }
}

/// Builds contexts and activates plugins against a [`RuntimeState`].
#[derive(Debug, Clone)]
pub struct PluginLoader {
    state: RuntimeState,
}

impl PluginLoader {
    #[must_use]
    pub const fn new(state: RuntimeState) -> Self {
        Self { state }
    }

    /// Loads sandboxed plugin code.
    ///
    /// Steps: validate, build a fresh context, start the isolate (which
    /// requires an `activate` export), register the manifest's languages,
    /// then run `activate` under the activation timeout.
    pub async fn load(&self, manifest: PluginManifest, source: &str, origin: PluginOrigin) -> NimbusResult<LoadedPlugin> {
        validator::check(&manifest)?;
        let plugin_id = PluginId::new(manifest.id.clone());
        let context = Arc::new(PluginContext::new(plugin_id.clone(), &self.state));
        debug!(plugin_id = %plugin_id, version = %manifest.version, "Loading sandboxed plugin");

        let wasm = sandbox::decode_source(plugin_id.as_str(), source)?;
        let options = IsolateOptions::from_config(&self.state.config);
        let isolate = match Isolate::spawn(Arc::clone(&context), wasm, options).await {
            Ok(isolate) => isolate,
            Err(e) => {
                rollback(&context, &e);
                return Err(e);
            }
        };

        register_manifest_languages(&manifest, &context);

        if let Err(e) = isolate.activate().await {
            let e = activation_error(plugin_id.as_str(), e);
            rollback(&context, &e);
            isolate.shutdown().await;
            return Err(e);
        }

        info!(plugin_id = %plugin_id, commands = context.subscription_count(), "Plugin activated");
        Ok(LoadedPlugin {
            manifest,
            origin,
            context,
            code: PluginCode::Sandboxed(isolate),
            activated_at: Utc::now(),
        })
    }

    /// Loads a plugin compiled into the host.
    pub async fn load_native(&self, plugin: Arc<dyn NativePlugin>, origin: PluginOrigin) -> NimbusResult<LoadedPlugin> {
        let manifest = plugin.manifest();
        validator::check(&manifest)?;
        let plugin_id = PluginId::new(manifest.id.clone());
        let context = Arc::new(PluginContext::new(plugin_id.clone(), &self.state));
        debug!(plugin_id = %plugin_id, "Loading native plugin");

        register_manifest_languages(&manifest, &context);

        let timeout = self.state.config.activation_timeout();
        let operation = format!("activation of plugin {plugin_id}");
        let activated = with_timeout(timeout, &operation, || plugin.activate(Arc::clone(&context))).await;
        if let Err(e) = activated {
            let e = activation_error(plugin_id.as_str(), e);
            rollback(&context, &e);
            return Err(e);
        }

        info!(plugin_id = %plugin_id, "Native plugin activated");
        Ok(LoadedPlugin {
            manifest,
            origin,
            context,
            code: PluginCode::Native(plugin),
            activated_at: Utc::now(),
        })
    }
}

fn register_manifest_languages(manifest: &PluginManifest, context: &PluginContext) {
    for language in &manifest.contributes.languages {
        context.register_language(language.clone());
    }
}

fn rollback(context: &PluginContext, error: &NimbusError) {
    warn!(
        plugin_id = %context.plugin_id(),
        error = %error,
        rolled_back = context.subscription_count(),
        "Plugin load failed, rolling back"
    );
    context.rollback();
}

fn activation_error(plugin_id: &str, error: NimbusError) -> NimbusError {
    match error {
        e @ (NimbusError::Activation { .. } | NimbusError::Timeout(_) | NimbusError::Reentrant(_)) => e,
        other => NimbusError::activation(plugin_id, other),
    }
}
