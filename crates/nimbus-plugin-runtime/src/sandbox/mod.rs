//! WebAssembly isolates for plugin code.
//!
//! Each sandboxed plugin gets its own wasmtime engine, store and thread.
//! The guest sees a single import, `nimbus.host_call`, and exchanges JSON
//! messages with the host through it; there is no shared heap.

mod bridge;
mod isolate;

pub use isolate::{Isolate, IsolateOptions};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use nimbus_core::{NimbusError, NimbusResult};

/// Turns plugin source into bytes wasmtime can compile.
///
/// Source starting with `(` is WebAssembly text; anything else must be a
/// base64-encoded module.
pub fn decode_source(plugin_id: &str, source: &str) -> NimbusResult<Vec<u8>> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(NimbusError::PluginLoading(format!("plugin {plugin_id} has no code")));
    }

    if trimmed.starts_with('(') {
        return Ok(trimmed.as_bytes().to_vec());
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| NimbusError::PluginLoading(format!("plugin {plugin_id} code is neither WAT nor base64: {e}")))
}
