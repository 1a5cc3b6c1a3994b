//! Unified error type for the plugin runtime.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for all Nimbus crates.
///
/// Registry lookups and the compiler dispatcher surface these directly;
/// engine lifecycle operations log them and report a boolean instead.
#[derive(Error, Debug)]
pub enum NimbusError {
    // ============ Manifest / Lifecycle Errors ============
    /// Manifest is missing required fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// A plugin with the same id is already loaded
    #[error("Plugin already installed: {0}")]
    DuplicatePlugin(String),

    /// Plugin not found
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Plugin code could not be prepared for execution
    #[error("Plugin loading error: {0}")]
    PluginLoading(String),

    /// Thrown by or during a plugin's `activate`
    #[error("Activation failed for plugin {plugin_id}: {message}")]
    Activation { plugin_id: String, message: String },

    /// A lifecycle operation was issued from inside another one
    #[error("Reentrant lifecycle call: {0}")]
    Reentrant(String),

    /// Sandbox trap or ABI violation
    #[error("Sandbox error: {plugin_id} - {message}")]
    Sandbox { plugin_id: String, message: String },

    // ============ Registry Errors ============
    /// Command id is not registered
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Registration collides with an existing entry
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Compiler Errors ============
    /// Language has no compiler configuration
    #[error("No compiler configuration for language {0}")]
    CompilerConfigMissing(String),

    /// Compile service rejected the request
    #[error("Compilation failed: {0}")]
    Compilation(String),

    // ============ Infrastructure Errors ============
    /// Key/value storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External service error
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NimbusError {
    /// Returns the HTTP-style status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::PluginNotFound(_) | Self::CommandNotFound(_) => 404,
            Self::DuplicatePlugin(_) | Self::Conflict(_) | Self::Reentrant(_) => 409,
            Self::CompilerConfigMissing(_) | Self::Compilation(_) => 422,
            Self::ExternalService { .. } => 502,
            Self::Timeout(_) => 503,
            Self::PluginLoading(_)
            | Self::Activation { .. }
            | Self::Sandbox { .. }
            | Self::Storage(_)
            | Self::Configuration(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicatePlugin(_) => "DUPLICATE_PLUGIN",
            Self::PluginNotFound(_) => "PLUGIN_NOT_FOUND",
            Self::PluginLoading(_) => "PLUGIN_LOADING_ERROR",
            Self::Activation { .. } => "ACTIVATION_ERROR",
            Self::Reentrant(_) => "REENTRANT_CALL",
            Self::Sandbox { .. } => "SANDBOX_ERROR",
            Self::CommandNotFound(_) => "COMMAND_NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::CompilerConfigMissing(_) => "COMPILER_CONFIG_MISSING",
            Self::Compilation(_) => "COMPILATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates an activation error for a plugin.
    #[must_use]
    pub fn activation<T: ToString>(plugin_id: &str, message: T) -> Self {
        Self::Activation {
            plugin_id: plugin_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Creates a sandbox error for a plugin.
    #[must_use]
    pub fn sandbox<T: ToString>(plugin_id: &str, message: T) -> Self {
        Self::Sandbox {
            plugin_id: plugin_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external<S: Into<String>, T: ToString>(service: S, message: T) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks whether the error was caused by a missing registry entry.
    ///
    /// Callers use this to tell "this id does not exist" apart from a
    /// handler that ran and failed.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CommandNotFound(_) | Self::PluginNotFound(_) | Self::CompilerConfigMissing(_)
        )
    }
}

impl From<serde_json::Error> for NimbusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error view handed to UI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-level validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
}

impl FieldError {
    /// Creates a field error for a required field that is absent.
    #[must_use]
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            message: format!("{} is required", field),
            code: "REQUIRED".to_string(),
        }
    }
}

impl ErrorResponse {
    /// Creates a new error response from a `NimbusError`.
    #[must_use]
    pub fn from_error(error: &NimbusError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }

    /// Sets field-level validation errors.
    #[must_use]
    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&NimbusError> for ErrorResponse {
    fn from(error: &NimbusError) -> Self {
        Self::from_error(error)
    }
}
