//! # Nimbus Greeter Plugin
//!
//! Sample sandboxed plugin demonstrating the guest SDK. It registers a
//! `greet` command and counts its own activations in global storage.
//!
//! Build for the sandbox with
//! `cargo build -p nimbus-greeter-plugin --target wasm32-unknown-unknown --release`.

use nimbus_plugin_api::{CommandContribution, PluginCategory, PluginManifest};

pub const PLUGIN_ID: &str = "nimbus.greeter";
pub const GREET_COMMAND: &str = "greet";
pub const ACTIVATIONS_KEY: &str = "activations";

/// Manifest to install alongside the compiled module.
#[must_use]
pub fn manifest() -> PluginManifest {
    let mut manifest = PluginManifest::new(PLUGIN_ID, "Greeter", env!("CARGO_PKG_VERSION"))
        .with_category(PluginCategory::Utility)
        .with_description("Says hello from inside the sandbox");
    manifest.author = "Nimbus Team".to_string();
    manifest.contributes.commands.push(CommandContribution {
        command: GREET_COMMAND.to_string(),
        title: "Say Hello".to_string(),
        category: Some("Greeter".to_string()),
    });
    manifest
}

/// Builds the greeting for an optional name.
#[must_use]
pub fn greeting(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("Hello, {name}!"),
        None => "Hello, world!".to_string(),
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm {
    use super::{greeting, ACTIVATIONS_KEY, GREET_COMMAND};
    use nimbus_plugin_api::guest::{self, GuestPlugin};
    use nimbus_plugin_api::{LogLevel, MessageLevel, StorageScope};
    use serde_json::Value;

    pub struct Greeter;

    impl GuestPlugin for Greeter {
        fn activate() -> Result<(), String> {
            let count = guest::storage_get::<u64>(StorageScope::Global, ACTIVATIONS_KEY)?.unwrap_or(0) + 1;
            guest::storage_update(StorageScope::Global, ACTIVATIONS_KEY, &count)?;
            guest::register_command(GREET_COMMAND)?;
            guest::log(LogLevel::Info, &format!("greeter activated {count} time(s)"));
            Ok(())
        }

        fn deactivate() {
            guest::log(LogLevel::Info, "greeter deactivated");
        }

        fn dispatch(command: &str, args: Vec<Value>) -> Result<Value, String> {
            match command {
                GREET_COMMAND => {
                    let message = greeting(args.first().and_then(Value::as_str));
                    guest::show_message(MessageLevel::Info, &message)?;
                    Ok(Value::String(message))
                }
                other => Err(format!("unknown command: {other}")),
            }
        }
    }

    nimbus_plugin_api::export_plugin!(Greeter);
}
