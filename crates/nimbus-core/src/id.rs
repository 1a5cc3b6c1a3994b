//! Typed identifiers for plugins and their commands.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A strongly-typed wrapper for plugin IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    /// Creates a new plugin ID.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the plugin key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the fully qualified id of a command owned by this plugin.
    #[must_use]
    pub fn command(&self, name: impl Into<String>) -> CommandId {
        CommandId::new(self.clone(), name)
    }
}

impl Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PluginId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PluginId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A command key namespaced by the plugin that owns it.
///
/// The qualified form is `<plugin_id>.<name>`. Plugin ids may themselves
/// contain dots, so the pair is kept structured and only flattened for
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId {
    plugin_id: PluginId,
    name: String,
}

impl CommandId {
    /// Creates a command id from its owner and local name.
    #[must_use]
    pub fn new(plugin_id: PluginId, name: impl Into<String>) -> Self {
        Self {
            plugin_id,
            name: name.into(),
        }
    }

    /// Returns the owning plugin.
    #[must_use]
    pub const fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Returns the local command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fully qualified key.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.plugin_id, self.name)
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plugin_id, self.name)
    }
}
