//! Manifest validation.
//!
//! Only the fields the runtime cannot work without are checked. Version
//! strings are not parsed and contribution blocks are not schema-checked.

use nimbus_core::{FieldError, NimbusError, NimbusResult};
use nimbus_plugin_api::PluginManifest;

/// Returns true when every required manifest field is present.
#[must_use]
pub fn validate(manifest: &PluginManifest) -> bool {
    missing_fields(manifest).is_empty()
}

/// Like [`validate`], but reports which fields are missing.
pub fn check(manifest: &PluginManifest) -> NimbusResult<()> {
    let missing = missing_fields(manifest);
    if missing.is_empty() {
        return Ok(());
    }

    let fields = missing.iter().map(|e| e.field.as_str()).collect::<Vec<_>>().join(", ");
    let subject = if manifest.id.trim().is_empty() {
        "manifest".to_string()
    } else {
        format!("manifest of {}", manifest.id)
    };
    Err(NimbusError::validation(format!("{subject} is missing required fields: {fields}")))
}

/// Collects one [`FieldError`] per missing required field.
#[must_use]
pub fn missing_fields(manifest: &PluginManifest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("id", &manifest.id),
        ("name", &manifest.name),
        ("version", &manifest.version),
    ] {
        if value.trim().is_empty() {
            errors.push(FieldError::missing(field));
        }
    }

    let has_engine = manifest
        .engines
        .as_ref()
        .is_some_and(|engines| !engines.nimbus.trim().is_empty());
    if !has_engine {
        errors.push(FieldError::missing("engines.nimbus"));
    }

    errors
}
