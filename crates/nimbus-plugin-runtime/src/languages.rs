//! Language registry.

use crate::builtin_languages::builtin_languages;
use nimbus_core::Disposable;
use nimbus_plugin_api::{LanguageConfiguration, LanguageConfigurationPatch};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of language configurations keyed by language id.
///
/// Cloning shares the same table.
#[derive(Clone, Default)]
pub struct LanguageRegistry {
    languages: Arc<RwLock<HashMap<String, LanguageConfiguration>>>,
}

impl LanguageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in languages.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut languages = registry.languages.write();
            for language in builtin_languages() {
                languages.insert(language.id.clone(), language);
            }
        }
        registry
    }

    /// Inserts or fully replaces the entry for `config.id`.
    ///
    /// Disposing deletes the entry; a replaced record is not restored.
    pub fn register(&self, config: LanguageConfiguration) -> Disposable {
        let id = config.id.clone();
        let replaced = self.languages.write().insert(id.clone(), config).is_some();
        debug!(language = %id, replaced, "Language registered");

        let languages = Arc::clone(&self.languages);
        Disposable::new(move || {
            languages.write().remove(&id);
            debug!(language = %id, "Language disposed");
        })
    }

    /// Shallow-merges `patch` over the entry for `id`.
    ///
    /// Disposing restores the exact record that was present before. When
    /// no entry exists the patch becomes a fresh registration and disposing
    /// deletes it.
    pub fn set_configuration(&self, id: &str, patch: LanguageConfigurationPatch) -> Disposable {
        let previous = {
            let mut languages = self.languages.write();
            let previous = languages.get(id).cloned();
            let next = match &previous {
                Some(existing) => patch.apply_to(existing),
                None => patch.into_configuration(id),
            };
            languages.insert(id.to_string(), next);
            previous
        };
        debug!(language = %id, merged = previous.is_some(), "Language configuration updated");

        let languages = Arc::clone(&self.languages);
        let id = id.to_string();
        Disposable::new(move || {
            let mut languages = languages.write();
            match previous {
                Some(snapshot) => {
                    languages.insert(id, snapshot);
                }
                None => {
                    languages.remove(&id);
                }
            }
        })
    }

    /// Puts back a snapshot taken with [`get`](Self::get). `None` removes
    /// the entry.
    pub fn restore(&self, id: &str, snapshot: Option<LanguageConfiguration>) {
        let mut languages = self.languages.write();
        match snapshot {
            Some(config) => {
                languages.insert(id.to_string(), config);
            }
            None => {
                languages.remove(id);
            }
        }
        debug!(language = %id, present = languages.contains_key(id), "Language restored");
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<LanguageConfiguration> {
        self.languages.read().get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.languages.read().contains_key(id)
    }

    /// Lists every language, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<LanguageConfiguration> {
        let mut languages: Vec<LanguageConfiguration> = self.languages.read().values().cloned().collect();
        languages.sort_by(|a, b| a.id.cmp(&b.id));
        languages
    }

    /// Finds the language claiming a file extension. Ties resolve to the
    /// smallest id.
    #[must_use]
    pub fn for_extension(&self, extension: &str) -> Option<LanguageConfiguration> {
        self.languages
            .read()
            .values()
            .filter(|l| l.handles_extension(extension))
            .min_by(|a, b| a.id.cmp(&b.id))
            .cloned()
    }

    /// Finds the language for a file name by its final extension.
    #[must_use]
    pub fn for_file_name(&self, file_name: &str) -> Option<LanguageConfiguration> {
        let (_, extension) = file_name.rsplit_once('.')?;
        self.for_extension(extension)
    }
}

impl std::fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("languages", &self.languages.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_plugin_api::{CompilerConfiguration, SyntaxConfiguration};

    fn lua(alias: &str) -> LanguageConfiguration {
        LanguageConfiguration::new("lua")
            .with_aliases([alias])
            .with_extensions([".lua"])
    }

    #[test]
    fn test_builtins_seeded() {
        let registry = LanguageRegistry::with_builtins();
        assert!(registry.contains("javascript"));
        assert!(registry.contains("python"));
        assert!(LanguageRegistry::new().all().is_empty());
    }

    #[test]
    fn test_register_replaces_and_dispose_deletes() {
        let registry = LanguageRegistry::new();

        let _first = registry.register(lua("Lua"));
        let second = registry.register(lua("LuaJIT"));
        assert_eq!(registry.get("lua").unwrap().aliases, vec!["LuaJIT"]);

        second.dispose();
        assert!(registry.get("lua").is_none());
    }

    #[test]
    fn test_set_configuration_merges_and_restores() {
        let registry = LanguageRegistry::new();
        let original = lua("Lua").with_compiler(CompilerConfiguration::new("lua", ["${file}"]));
        let _registration = registry.register(original.clone());

        let patch = LanguageConfigurationPatch {
            syntax: Some(SyntaxConfiguration {
                line_comment: Some("--".to_string()),
                ..SyntaxConfiguration::default()
            }),
            ..LanguageConfigurationPatch::default()
        };
        let update = registry.set_configuration("lua", patch);

        let merged = registry.get("lua").unwrap();
        assert_eq!(merged.aliases, vec!["Lua"]);
        assert_eq!(merged.compiler, original.compiler);
        assert_eq!(merged.syntax.unwrap().line_comment.as_deref(), Some("--"));

        update.dispose();
        assert_eq!(registry.get("lua").unwrap(), original);
    }

    #[test]
    fn test_set_configuration_on_absent_language() {
        let registry = LanguageRegistry::new();
        let patch = LanguageConfigurationPatch {
            extensions: Some(vec![".zig".to_string()]),
            ..LanguageConfigurationPatch::default()
        };

        let update = registry.set_configuration("zig", patch);
        assert_eq!(registry.get("zig").unwrap().extensions, vec![".zig"]);

        update.dispose();
        assert!(!registry.contains("zig"));
    }

    #[test]
    fn test_restore_snapshot() {
        let registry = LanguageRegistry::new();
        let _registration = registry.register(lua("Lua"));
        let snapshot = registry.get("lua");

        registry.register(lua("LuaJIT")).dispose();
        assert!(!registry.contains("lua"));

        registry.restore("lua", snapshot);
        assert_eq!(registry.get("lua").unwrap().aliases, vec!["Lua"]);

        registry.restore("lua", None);
        assert!(!registry.contains("lua"));
    }

    #[test]
    fn test_lookup_by_extension() {
        let registry = LanguageRegistry::with_builtins();
        assert_eq!(registry.for_extension(".py").unwrap().id, "python");
        assert_eq!(registry.for_extension("rs").unwrap().id, "rust");
        assert_eq!(registry.for_file_name("src/app.test.ts").unwrap().id, "typescript");
        assert!(registry.for_file_name("Makefile").is_none());
    }

    #[test]
    fn test_all_sorted() {
        let registry = LanguageRegistry::with_builtins();
        let ids: Vec<String> = registry.all().into_iter().map(|l| l.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
