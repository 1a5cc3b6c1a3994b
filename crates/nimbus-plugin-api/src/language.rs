//! Language configuration records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a language is recognized and compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfiguration {
    /// Unique language id, e.g. `python`.
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// File extensions including the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax: Option<SyntaxConfiguration>,
}

impl LanguageConfiguration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: CompilerConfiguration) -> Self {
        self.compiler = Some(compiler);
        self
    }

    #[must_use]
    pub fn with_syntax(mut self, syntax: SyntaxConfiguration) -> Self {
        self.syntax = Some(syntax);
        self
    }

    /// Returns true if `extension` (with or without the leading dot) belongs
    /// to this language. Matching is case-insensitive.
    #[must_use]
    pub fn handles_extension(&self, extension: &str) -> bool {
        let wanted = extension.trim_start_matches('.');
        self.extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(wanted))
    }
}

/// Command line used by the compile service to build or run a file.
///
/// `args` may contain `${file}` and `${fileBasenameNoExtension}`; they are
/// substituted per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfiguration {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,
}

impl CompilerConfiguration {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Editor hints for highlighting and bracket matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxConfiguration {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub operators: Vec<String>,
    #[serde(default)]
    pub brackets: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_comment: Option<(String, String)>,
}

/// Partial language configuration; present fields replace the target's
/// fields wholesale (shallow merge).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfigurationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax: Option<SyntaxConfiguration>,
}

impl LanguageConfigurationPatch {
    /// Returns `base` with every present field of the patch applied.
    #[must_use]
    pub fn apply_to(&self, base: &LanguageConfiguration) -> LanguageConfiguration {
        let mut merged = base.clone();
        if let Some(aliases) = &self.aliases {
            merged.aliases.clone_from(aliases);
        }
        if let Some(extensions) = &self.extensions {
            merged.extensions.clone_from(extensions);
        }
        if let Some(compiler) = &self.compiler {
            merged.compiler = Some(compiler.clone());
        }
        if let Some(syntax) = &self.syntax {
            merged.syntax = Some(syntax.clone());
        }
        merged
    }

    /// Builds a complete configuration for `id` from the patch alone.
    #[must_use]
    pub fn into_configuration(self, id: impl Into<String>) -> LanguageConfiguration {
        LanguageConfiguration {
            id: id.into(),
            aliases: self.aliases.unwrap_or_default(),
            extensions: self.extensions.unwrap_or_default(),
            compiler: self.compiler,
            syntax: self.syntax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> LanguageConfiguration {
        LanguageConfiguration::new("python")
            .with_aliases(["Python"])
            .with_extensions([".py"])
            .with_compiler(CompilerConfiguration::new("python3", ["${file}"]))
    }

    #[test]
    fn test_patch_is_shallow() {
        let patch = LanguageConfigurationPatch {
            extensions: Some(vec![".py".into(), ".pyw".into()]),
            ..Default::default()
        };

        let merged = patch.apply_to(&python());
        assert_eq!(merged.extensions, vec![".py", ".pyw"]);
        assert_eq!(merged.aliases, vec!["Python"]);
        assert_eq!(merged.compiler.unwrap().command, "python3");
    }

    #[test]
    fn test_patch_into_fresh_configuration() {
        let patch = LanguageConfigurationPatch {
            aliases: Some(vec!["Zig".into()]),
            ..Default::default()
        };
        let config = patch.into_configuration("zig");
        assert_eq!(config.id, "zig");
        assert_eq!(config.aliases, vec!["Zig"]);
        assert!(config.extensions.is_empty());
        assert!(config.compiler.is_none());
    }

    #[test]
    fn test_handles_extension() {
        let config = python();
        assert!(config.handles_extension(".py"));
        assert!(config.handles_extension("PY"));
        assert!(!config.handles_extension(".pyc"));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let compiler = CompilerConfiguration {
            output_extension: Some(".out".into()),
            ..CompilerConfiguration::new("gcc", ["${file}"])
        };
        let json = serde_json::to_value(&compiler).unwrap();
        assert_eq!(json["outputExtension"], ".out");
        assert!(json.get("workingDirectory").is_none());
    }
}
