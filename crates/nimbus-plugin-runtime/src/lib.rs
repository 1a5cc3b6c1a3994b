//! # Nimbus Plugin Runtime
//!
//! Extension runtime for the Nimbus IDE. Loads plugins into Wasmtime
//! isolates, wires their contributions into the command and language
//! registries, persists installs and dispatches compile requests.

pub mod builtin_languages;
pub mod commands;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod languages;
pub mod loader;
pub mod native;
pub mod persistence;
pub mod sandbox;
pub mod state;
pub mod storage;
pub mod validator;
pub mod window;

pub use commands::{async_handler, sync_handler, CommandHandler, CommandRegistry};
pub use compiler::{substitute_placeholders, CompileRequest, CompileResponse, CompileService, CompilerDispatcher, HttpCompileService};
pub use context::PluginContext;
pub use engine::PluginEngine;
pub use languages::LanguageRegistry;
pub use loader::{LoadedPlugin, PluginLoader, PluginOrigin};
pub use native::{default_plugins, NativePlugin};
pub use persistence::{HttpPluginStore, MemoryPluginStore, PluginStore};
pub use state::RuntimeState;
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, Storage, StorageChange};
pub use window::{HeadlessWindow, InputBoxOptions, InputBoxPrompt, WindowBackend, WindowFacade};
