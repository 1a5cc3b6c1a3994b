//! Host side of the guest ABI.
//!
//! Requests arrive through `nimbus.host_call(ptr, len)`, are decoded from
//! guest memory, served against the plugin's [`PluginContext`] and answered
//! by writing a [`Reply`] into a buffer obtained from the guest's `alloc`.

use super::isolate::IsolateChannel;
use crate::commands::CommandHandler;
use crate::context::PluginContext;
use anyhow::anyhow;
use async_trait::async_trait;
use nimbus_core::{NimbusResult, PluginId};
use nimbus_plugin_api::{exports, pack, HostRequest, LogLevel, MessageLevel, Reply, HOST_CALL, HOST_MODULE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};
use wasmtime::{AsContext, Caller, Extern, Linker, Memory, StoreLimits, StoreLimitsBuilder};

/// Data owned by an isolate's wasmtime store.
pub(super) struct HostState {
    pub(super) limits: StoreLimits,
    bridge: HostBridge,
}

impl HostState {
    pub(super) fn new(bridge: HostBridge, max_memory_bytes: usize) -> Self {
        Self {
            limits: StoreLimitsBuilder::new()
                .memory_size(max_memory_bytes)
                .instances(1)
                .table_elements(10_000)
                .trap_on_grow_failure(true)
                .build(),
            bridge,
        }
    }
}

/// Serves guest requests for one plugin.
pub(super) struct HostBridge {
    context: Arc<PluginContext>,
    channel: IsolateChannel,
    dispatch_timeout: Duration,
    runtime: Option<Handle>,
    dispatchable: bool,
}

impl HostBridge {
    pub(super) fn new(
        context: Arc<PluginContext>,
        channel: IsolateChannel,
        dispatch_timeout: Duration,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            context,
            channel,
            dispatch_timeout,
            runtime,
            dispatchable: false,
        }
    }

    pub(super) fn plugin_id(&self) -> &PluginId {
        self.context.plugin_id()
    }

    /// Commands can only be registered by guests exporting `dispatch`.
    pub(super) fn set_dispatchable(&mut self, dispatchable: bool) {
        self.dispatchable = dispatchable;
    }

    fn handle(&self, request: HostRequest) -> Result<Value, String> {
        match request {
            HostRequest::RegisterCommand { name } => {
                if !self.dispatchable {
                    return Err(format!("cannot register {name}: plugin does not export `dispatch`"));
                }
                let handler = Arc::new(GuestCommand {
                    channel: self.channel.clone(),
                    command: name.clone(),
                    timeout: self.dispatch_timeout,
                });
                self.context
                    .register_command(&name, handler)
                    .map(|_| Value::Null)
                    .map_err(|e| e.to_string())
            }
            HostRequest::RegisterLanguage { config } => {
                self.context.register_language(config);
                Ok(Value::Null)
            }
            HostRequest::SetLanguageConfiguration { id, patch } => {
                self.context.set_language_configuration(&id, patch);
                Ok(Value::Null)
            }
            HostRequest::StorageGet { scope, key } => {
                Ok(self.context.storage(scope).get_value(&key).unwrap_or(Value::Null))
            }
            HostRequest::StorageUpdate { scope, key, value } => self
                .context
                .storage(scope)
                .set_value(&key, value)
                .map(|()| Value::Null)
                .map_err(|e| e.to_string()),
            HostRequest::ShowMessage { level, message, actions } => {
                self.show_message(level, message, actions);
                Ok(Value::Null)
            }
            HostRequest::Log { level, message } => {
                self.log(level, &message);
                Ok(Value::Null)
            }
            HostRequest::ExtensionPath => Ok(Value::String(self.context.extension_path().to_string())),
        }
    }

    fn show_message(&self, level: MessageLevel, message: String, actions: Vec<String>) {
        let Some(runtime) = &self.runtime else {
            warn!(plugin_id = %self.plugin_id(), message = %message, "No async runtime, message dropped");
            return;
        };

        let window = self.context.window().clone();
        runtime.spawn(async move {
            window.show_message(level, &message, &actions).await;
        });
    }

    fn log(&self, level: LogLevel, message: &str) {
        let plugin_id = self.plugin_id();
        match level {
            LogLevel::Trace => trace!(plugin_id = %plugin_id, "{}", message),
            LogLevel::Debug => debug!(plugin_id = %plugin_id, "{}", message),
            LogLevel::Info => info!(plugin_id = %plugin_id, "{}", message),
            LogLevel::Warn => warn!(plugin_id = %plugin_id, "{}", message),
            LogLevel::Error => error!(plugin_id = %plugin_id, "{}", message),
        }
    }
}

/// Command handler that forwards invocations to the guest's `dispatch`.
struct GuestCommand {
    channel: IsolateChannel,
    command: String,
    timeout: Duration,
}

#[async_trait]
impl CommandHandler for GuestCommand {
    async fn call(&self, args: Vec<Value>) -> NimbusResult<Value> {
        self.channel.dispatch(&self.command, args, self.timeout).await
    }
}

/// Adds `nimbus.host_call` to the linker.
pub(super) fn define(linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
    linker.func_wrap(
        HOST_MODULE,
        HOST_CALL,
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| host_call(&mut caller, ptr, len),
    )?;
    Ok(())
}

fn host_call(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<i64> {
    let memory = guest_memory(caller)?;
    let bytes = read_guest(&memory, &*caller, ptr as u32, len as u32)?;

    let reply: Reply = match serde_json::from_slice::<HostRequest>(&bytes) {
        Ok(request) => caller.data().bridge.handle(request).into(),
        Err(e) => Reply::error(format!("malformed host request: {e}")),
    };
    write_reply(caller, &reply)
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> wasmtime::Result<Memory> {
    caller
        .get_export(exports::MEMORY)
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("plugin does not export `{}`", exports::MEMORY))
}

/// Copies the reply into guest memory; returns 0 when the guest has no
/// `alloc` and therefore cannot receive it.
fn write_reply(caller: &mut Caller<'_, HostState>, reply: &Reply) -> wasmtime::Result<i64> {
    let Some(alloc) = caller.get_export(exports::ALLOC).and_then(Extern::into_func) else {
        return Ok(0);
    };
    let alloc = alloc.typed::<i32, i32>(&*caller)?;

    let bytes = serde_json::to_vec(reply)?;
    let len = i32::try_from(bytes.len())?;
    let ptr = alloc.call(&mut *caller, len)?;

    let memory = guest_memory(caller)?;
    memory.write(&mut *caller, ptr as u32 as usize, &bytes)?;
    Ok(pack(ptr as u32, len as u32))
}

/// Copies `len` bytes at `ptr` out of guest memory.
pub(super) fn read_guest<S: AsContext>(memory: &Memory, store: &S, ptr: u32, len: u32) -> wasmtime::Result<Vec<u8>> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| anyhow!("guest buffer at {start} overflows"))?;

    memory
        .data(store)
        .get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| anyhow!("guest buffer {start}..{end} is out of bounds"))
}
