//! Configuration validation.
//!
//! Collects every problem in one pass so operators can fix a config file
//! without a restart per error.

use crate::AppConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String },
    /// A resource cap must be positive.
    NonPositiveLimit { name: String },
    /// Extension root cannot be empty.
    EmptyExtensionRoot,
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::NonPositiveTimeout { name } => {
                write!(f, "Timeout '{}' must be positive", name)
            }
            Self::NonPositiveLimit { name } => {
                write!(f, "Limit '{}' must be positive", name)
            }
            Self::EmptyExtensionRoot => write!(f, "plugins.extension_root cannot be empty"),
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                    value
                )
            }
            Self::InvalidLogFormat { value } => {
                write!(f, "Invalid log format: '{}' (valid: pretty, json)", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
    /// Valid log formats.
    const VALID_LOG_FORMATS: &'static [&'static str] = &["pretty", "json"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_plugins(&config.plugins, &mut errors);
        Self::validate_persistence(&config.persistence, &mut errors);
        Self::validate_compiler(&config.compiler, &mut errors);
        Self::validate_observability(&config.observability, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_plugins(config: &crate::PluginConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.extension_root.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyExtensionRoot);
        }
        if config.activation_timeout_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "plugins.activation_timeout_ms".to_string(),
            });
        }
        if config.dispatch_timeout_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "plugins.dispatch_timeout_ms".to_string(),
            });
        }
        if config.max_memory_bytes == 0 {
            errors.push(ConfigValidationError::NonPositiveLimit {
                name: "plugins.max_memory_bytes".to_string(),
            });
        }
    }

    fn validate_persistence(config: &crate::PersistenceConfig, errors: &mut Vec<ConfigValidationError>) {
        if !config.enabled {
            return;
        }

        Self::validate_http_url("persistence", &config.base_url, errors);
        if config.request_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "persistence.request_timeout_secs".to_string(),
            });
        }
    }

    fn validate_compiler(config: &crate::CompilerServiceConfig, errors: &mut Vec<ConfigValidationError>) {
        Self::validate_http_url("compiler", &config.endpoint, errors);
        if config.timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "compiler.timeout_secs".to_string(),
            });
        }
    }

    fn validate_observability(config: &crate::ObservabilityConfig, errors: &mut Vec<ConfigValidationError>) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        let format = config.log_format.to_lowercase();
        if !Self::VALID_LOG_FORMATS.contains(&format.as_str()) {
            errors.push(ConfigValidationError::InvalidLogFormat {
                value: config.log_format.clone(),
            });
        }
    }

    fn validate_http_url(url_type: &str, value: &str, errors: &mut Vec<ConfigValidationError>) {
        match Url::parse(value) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: url_type.to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: url_type.to_string(),
                message: format!("{}: {}", value, e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.plugins.activation_timeout_ms = 0;
        config.plugins.max_memory_bytes = 0;
        config.compiler.endpoint = "not a url".to_string();
        config.observability.log_level = "verbose".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ConfigValidationError::NonPositiveTimeout {
            name: "plugins.activation_timeout_ms".to_string()
        }));
        assert!(errors.contains(&ConfigValidationError::InvalidLogLevel {
            value: "verbose".to_string()
        }));
    }

    #[test]
    fn test_persistence_url_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.persistence.base_url = "ftp://example.com/plugins".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.persistence.enabled = true;
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(
            &errors[0],
            ConfigValidationError::InvalidUrl { url_type, .. } if url_type == "persistence"
        ));
    }

    #[test]
    fn test_error_display() {
        let err = ConfigValidationError::NonPositiveTimeout {
            name: "compiler.timeout_secs".to_string(),
        };
        assert_eq!(err.to_string(), "Timeout 'compiler.timeout_secs' must be positive");
    }
}
