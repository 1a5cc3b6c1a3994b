//! Plugins compiled into the host.

use crate::context::PluginContext;
use async_trait::async_trait;
use nimbus_core::NimbusResult;
use nimbus_plugin_api::{PluginCategory, PluginManifest, ThemeContribution};
use std::sync::Arc;
use tracing::info;

/// A plugin implemented in Rust and trusted with direct context access.
#[async_trait]
pub trait NativePlugin: Send + Sync {
    fn manifest(&self) -> PluginManifest;

    async fn activate(&self, context: Arc<PluginContext>) -> NimbusResult<()>;

    async fn deactivate(&self) -> NimbusResult<()> {
        Ok(())
    }
}

/// Plugins enabled on every fresh runtime.
#[must_use]
pub fn default_plugins() -> Vec<Arc<dyn NativePlugin>> {
    vec![
        Arc::new(CoreLanguageSupport),
        Arc::new(DefaultThemes),
        Arc::new(FileManager),
    ]
}

pub struct CoreLanguageSupport;

#[async_trait]
impl NativePlugin for CoreLanguageSupport {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("nimbus.core-languages", "Core Language Support", env!("CARGO_PKG_VERSION"))
            .with_category(PluginCategory::Language)
            .with_description("Syntax and run configurations for the built-in languages")
    }

    async fn activate(&self, context: Arc<PluginContext>) -> NimbusResult<()> {
        info!(plugin_id = %context.plugin_id(), "Core language support activated");
        Ok(())
    }
}

pub struct DefaultThemes;

#[async_trait]
impl NativePlugin for DefaultThemes {
    fn manifest(&self) -> PluginManifest {
        let mut manifest = PluginManifest::new("nimbus.themes", "Default Themes", env!("CARGO_PKG_VERSION"))
            .with_category(PluginCategory::Theme)
            .with_description("Light and dark editor themes");
        manifest.contributes.themes = vec![
            ThemeContribution {
                id: "nimbus-dark".to_string(),
                label: "Nimbus Dark".to_string(),
                ui_theme: "vs-dark".to_string(),
                path: "themes/nimbus-dark.json".to_string(),
            },
            ThemeContribution {
                id: "nimbus-light".to_string(),
                label: "Nimbus Light".to_string(),
                ui_theme: "vs".to_string(),
                path: "themes/nimbus-light.json".to_string(),
            },
        ];
        manifest
    }

    async fn activate(&self, context: Arc<PluginContext>) -> NimbusResult<()> {
        info!(plugin_id = %context.plugin_id(), "Default themes activated");
        Ok(())
    }
}

pub struct FileManager;

#[async_trait]
impl NativePlugin for FileManager {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("nimbus.file-manager", "File Manager", env!("CARGO_PKG_VERSION"))
            .with_category(PluginCategory::Productivity)
            .with_description("Workspace file explorer")
    }

    async fn activate(&self, context: Arc<PluginContext>) -> NimbusResult<()> {
        info!(plugin_id = %context.plugin_id(), "File manager activated");
        Ok(())
    }
}
