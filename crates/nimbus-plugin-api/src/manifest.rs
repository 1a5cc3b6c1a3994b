//! Plugin manifest and contribution records.

use crate::LanguageConfiguration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative metadata describing a plugin.
///
/// String fields default to empty when absent so that a malformed manifest
/// reaches the validator instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Globally unique plugin id.
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Semantic version (not format-checked).
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub category: PluginCategory,
    /// Events that should trigger activation.
    #[serde(default)]
    pub activation_events: Vec<String>,
    #[serde(default)]
    pub contributes: Contributes,
    /// Engine compatibility; required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engines: Option<EngineCompatibility>,
}

impl PluginManifest {
    /// Creates a manifest with the required fields filled in.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            engines: Some(EngineCompatibility::default()),
            ..Self::default()
        }
    }

    /// Builder: set the category.
    #[must_use]
    pub fn with_category(mut self, category: PluginCategory) -> Self {
        self.category = category;
        self
    }

    /// Builder: set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: contribute a language.
    #[must_use]
    pub fn with_language(mut self, language: LanguageConfiguration) -> Self {
        self.contributes.languages.push(language);
        self
    }

    /// Builder: set the engine compatibility range.
    #[must_use]
    pub fn with_engine(mut self, range: impl Into<String>) -> Self {
        self.engines = Some(EngineCompatibility { nimbus: range.into() });
        self
    }
}

/// Closed set of plugin categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginCategory {
    Language,
    Theme,
    #[default]
    Utility,
    Debugger,
    Formatter,
    Linter,
    Debugging,
    Productivity,
    GameDev,
    Database,
}

/// Host versions a plugin declares itself compatible with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCompatibility {
    /// Version range, e.g. `^1.0.0`.
    #[serde(default)]
    pub nimbus: String,
}

impl Default for EngineCompatibility {
    fn default() -> Self {
        Self {
            nimbus: "^1.0.0".to_string(),
        }
    }
}

/// Extension points a plugin adds to the host.
///
/// Only structural presence is checked; entries may still be malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<LanguageConfiguration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<ThemeContribution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandContribution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keybindings: Vec<KeybindingContribution>,
    /// Menu location → items.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub menus: BTreeMap<String, Vec<MenuItemContribution>>,
    /// Free-form settings schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeContribution {
    pub id: String,
    pub label: String,
    /// Base theme, e.g. `vs-dark`.
    #[serde(default)]
    pub ui_theme: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContribution {
    /// Local command name; qualified with the plugin id at registration.
    pub command: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeybindingContribution {
    pub command: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemContribution {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// A persisted install: the manifest and the plugin's source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlugin {
    pub manifest: PluginManifest,
    pub code: String,
}
