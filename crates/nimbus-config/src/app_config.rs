//! Application configuration structures.

use nimbus_core::telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Plugin runtime configuration.
    #[serde(default)]
    pub plugins: PluginConfig,

    /// Remote store of installed plugins.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// External compile service.
    #[serde(default)]
    pub compiler: CompilerServiceConfig,

    /// Local key/value storage backing plugin state.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "nimbus".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Enable the plugin system.
    pub enabled: bool,
    /// Load the built-in default plugins on initialize.
    pub load_defaults: bool,
    /// Base directory reported to plugins as their extension path.
    pub extension_root: String,
    /// Activation timeout in milliseconds.
    pub activation_timeout_ms: u64,
    /// Command dispatch timeout in milliseconds.
    pub dispatch_timeout_ms: u64,
    /// Maximum linear memory per plugin in bytes.
    pub max_memory_bytes: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            load_defaults: true,
            extension_root: "./extensions".to_string(),
            activation_timeout_ms: 10_000,
            dispatch_timeout_ms: 30_000,
            max_memory_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl PluginConfig {
    /// Returns the activation timeout as a Duration.
    #[must_use]
    pub const fn activation_timeout(&self) -> Duration {
        Duration::from_millis(self.activation_timeout_ms)
    }

    /// Returns the dispatch timeout as a Duration.
    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// Remote persistence of installed plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Use the HTTP endpoint; when false installs only live in memory.
    pub enabled: bool,
    /// Base URL of the installed-plugins collection.
    pub base_url: String,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:3000/api/plugins".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl PersistenceConfig {
    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// External compile service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerServiceConfig {
    /// Compile endpoint URL.
    pub endpoint: String,
    /// Compile request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CompilerServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/compile".to_string(),
            timeout_secs: 60,
        }
    }
}

impl CompilerServiceConfig {
    /// Returns the compile timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local key/value storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file backing plugin storage; in-memory when absent.
    pub path: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Builds the tracing configuration for the host binary.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryConfig {
        let level = self.log_level.to_lowercase();
        TelemetryConfig {
            filter: format!("{},nimbus={}", level, level),
            format: if self.log_format.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            ..TelemetryConfig::default()
        }
    }
}
