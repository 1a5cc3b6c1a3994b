//! Common test infrastructure for plugin runtime integration tests.
//!
//! Guest plugins are assembled as WebAssembly text so every test can shape
//! exactly what `activate` and `dispatch` do.

#![allow(dead_code)]

use async_trait::async_trait;
use nimbus_config::PluginConfig;
use nimbus_core::{NimbusError, NimbusResult, PluginId};
use nimbus_plugin_api::{pack, HostRequest, PluginManifest, Reply, StoredPlugin};
use nimbus_plugin_runtime::{HttpCompileService, MemoryPluginStore, PluginEngine, PluginStore, RuntimeState};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

const DATA_START: usize = 16;
const MIN_HEAP: usize = 4096;

/// What the guest's `activate` does after issuing its host requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Trap,
    Status(i32),
    Spin,
}

/// Builder for a guest module in WAT form.
#[derive(Debug, Clone)]
pub struct WatPlugin {
    activate_requests: Vec<HostRequest>,
    activate: Outcome,
    export_activate: bool,
    dispatch_requests: Vec<HostRequest>,
    dispatch_reply: Option<Reply>,
    deactivate: Option<Outcome>,
    extra_import: bool,
}

impl WatPlugin {
    pub fn new() -> Self {
        Self {
            activate_requests: Vec::new(),
            activate: Outcome::Ok,
            export_activate: true,
            dispatch_requests: Vec::new(),
            dispatch_reply: None,
            deactivate: None,
            extra_import: false,
        }
    }

    /// Issued in order by `activate`.
    pub fn on_activate(mut self, request: HostRequest) -> Self {
        self.activate_requests.push(request);
        self
    }

    pub fn register_command(self, name: &str) -> Self {
        self.on_activate(HostRequest::RegisterCommand { name: name.to_string() })
    }

    pub fn activate_outcome(mut self, outcome: Outcome) -> Self {
        self.activate = outcome;
        self
    }

    pub fn without_activate(mut self) -> Self {
        self.export_activate = false;
        self
    }

    /// Exports `dispatch`, which issues `requests` and then answers every
    /// command with `reply`.
    pub fn dispatch(mut self, requests: Vec<HostRequest>, reply: Reply) -> Self {
        self.dispatch_requests = requests;
        self.dispatch_reply = Some(reply);
        self
    }

    pub fn dispatch_ok(self, value: Value) -> Self {
        self.dispatch(Vec::new(), Reply::Ok(value))
    }

    pub fn deactivate(mut self, outcome: Outcome) -> Self {
        self.deactivate = Some(outcome);
        self
    }

    pub fn with_extra_import(mut self) -> Self {
        self.extra_import = true;
        self
    }

    pub fn build(&self) -> String {
        let mut data = DataSection::default();
        let activate_calls: Vec<(usize, usize)> = self.activate_requests.iter().map(|r| data.push_json(r)).collect();
        let dispatch_calls: Vec<(usize, usize)> = self.dispatch_requests.iter().map(|r| data.push_json(r)).collect();
        let reply = self.dispatch_reply.as_ref().map(|r| data.push_json(r));
        let heap = data.end().next_multiple_of(8).max(MIN_HEAP);

        let mut wat = String::from("(module\n");
        wat.push_str("  (import \"nimbus\" \"host_call\" (func $host_call (param i32 i32) (result i64)))\n");
        if self.extra_import {
            wat.push_str("  (import \"env\" \"abort\" (func $abort (param i32)))\n");
        }
        wat.push_str("  (memory (export \"memory\") 2)\n");
        let _ = writeln!(wat, "  (global $heap (mut i32) (i32.const {heap}))");
        wat.push_str(&data.render());

        wat.push_str(concat!(
            "  (func $alloc (export \"alloc\") (param $len i32) (result i32)\n",
            "    (local $ptr i32)\n",
            "    (local.set $ptr (global.get $heap))\n",
            "    (global.set $heap (i32.add (global.get $heap) (local.get $len)))\n",
            "    (local.get $ptr))\n",
            "  (func (export \"dealloc\") (param i32 i32))\n",
        ));

        if self.export_activate {
            wat.push_str("  (func (export \"activate\") (result i32)\n");
            wat.push_str(&calls(&activate_calls));
            wat.push_str(&finish(self.activate));
            wat.push_str(")\n");
        }

        if let Some((ptr, len)) = reply {
            wat.push_str("  (func (export \"dispatch\") (param i32 i32) (result i64)\n");
            wat.push_str(&calls(&dispatch_calls));
            let _ = writeln!(wat, "    (i64.const {}))", pack(ptr as u32, len as u32));
        }

        if let Some(outcome) = self.deactivate {
            wat.push_str("  (func (export \"deactivate\")\n");
            match outcome {
                Outcome::Trap => wat.push_str("    unreachable"),
                Outcome::Spin => wat.push_str("    (loop $spin (br $spin))"),
                Outcome::Ok | Outcome::Status(_) => wat.push_str("    nop"),
            }
            wat.push_str(")\n");
        }

        wat.push_str(")\n");
        wat
    }
}

impl Default for WatPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct DataSection {
    segments: Vec<(usize, String)>,
    cursor: usize,
}

impl DataSection {
    fn push_json<T: serde::Serialize>(&mut self, value: &T) -> (usize, usize) {
        let text = serde_json::to_string(value).expect("serializable test payload");
        let offset = DATA_START + self.cursor;
        let len = text.len();
        self.cursor += len;
        self.segments.push((offset, text));
        (offset, len)
    }

    fn end(&self) -> usize {
        DATA_START + self.cursor
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (offset, text) in &self.segments {
            let _ = writeln!(out, "  (data (i32.const {offset}) \"{}\")", escape(text));
        }
        out
    }
}

fn calls(calls: &[(usize, usize)]) -> String {
    let mut out = String::new();
    for (ptr, len) in calls {
        let _ = writeln!(out, "    (drop (call $host_call (i32.const {ptr}) (i32.const {len})))");
    }
    out
}

fn finish(outcome: Outcome) -> String {
    match outcome {
        Outcome::Ok => "    (i32.const 0)".to_string(),
        Outcome::Status(status) => format!("    (i32.const {status})"),
        Outcome::Trap => "    unreachable".to_string(),
        Outcome::Spin => "    (loop $spin (br $spin))\n    (i32.const 0)".to_string(),
    }
}

/// Escapes a byte string for a WAT string literal.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'"' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{byte:02x}");
            }
        }
    }
    out
}

pub fn manifest(id: &str) -> PluginManifest {
    PluginManifest::new(id, format!("Plugin {id}"), "1.0.0")
}

pub fn test_config() -> PluginConfig {
    PluginConfig {
        activation_timeout_ms: 2_000,
        dispatch_timeout_ms: 2_000,
        ..PluginConfig::default()
    }
}

/// Compile service pointing at a closed port; engine tests never compile.
pub fn offline_compiler() -> Arc<HttpCompileService> {
    Arc::new(HttpCompileService::with_client(
        reqwest::Client::new(),
        "http://127.0.0.1:9/api/compile",
    ))
}

/// Engine without default plugins, backed by `store`.
pub fn engine_with_config(config: PluginConfig, store: Arc<dyn PluginStore>) -> PluginEngine {
    PluginEngine::new(RuntimeState::new(config), store, offline_compiler()).with_default_plugins(Vec::new())
}

pub fn engine_with_store(store: Arc<dyn PluginStore>) -> PluginEngine {
    engine_with_config(test_config(), store)
}

pub fn engine() -> (PluginEngine, Arc<MemoryPluginStore>) {
    let store = Arc::new(MemoryPluginStore::new());
    (engine_with_store(Arc::clone(&store) as Arc<dyn PluginStore>), store)
}

/// Store whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl PluginStore for FailingStore {
    async fn list(&self) -> NimbusResult<Vec<StoredPlugin>> {
        Ok(Vec::new())
    }

    async fn save(&self, _plugin: &StoredPlugin) -> NimbusResult<()> {
        Err(NimbusError::external("plugin-store", "HTTP error 503 Service Unavailable"))
    }

    async fn delete(&self, _id: &PluginId) -> NimbusResult<()> {
        Err(NimbusError::external("plugin-store", "HTTP error 503 Service Unavailable"))
    }
}

/// In-memory store whose deletes always fail.
#[derive(Debug, Default)]
pub struct UndeletableStore {
    inner: MemoryPluginStore,
}

impl UndeletableStore {
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }
}

#[async_trait]
impl PluginStore for UndeletableStore {
    async fn list(&self) -> NimbusResult<Vec<StoredPlugin>> {
        self.inner.list().await
    }

    async fn save(&self, plugin: &StoredPlugin) -> NimbusResult<()> {
        self.inner.save(plugin).await
    }

    async fn delete(&self, _id: &PluginId) -> NimbusResult<()> {
        Err(NimbusError::external("plugin-store", "HTTP error 500 Internal Server Error"))
    }
}
