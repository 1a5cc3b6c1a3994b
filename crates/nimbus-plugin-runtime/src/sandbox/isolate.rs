//! Isolate lifecycle and the thread that drives a guest instance.

use super::bridge::{self, HostBridge, HostState};
use crate::context::PluginContext;
use nimbus_config::PluginConfig;
use nimbus_core::{with_timeout, NimbusError, NimbusResult, PluginId};
use nimbus_plugin_api::{exports, unpack, DispatchRequest, Reply, HOST_CALL, HOST_MODULE};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wasmtime::{Config, Engine, ExternType, Instance, Linker, Module, Store, Trap, WasmBacktraceDetails};

/// Limits applied to one isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolateOptions {
    pub activation_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub max_memory_bytes: usize,
}

impl IsolateOptions {
    #[must_use]
    pub const fn from_config(config: &PluginConfig) -> Self {
        Self {
            activation_timeout: config.activation_timeout(),
            dispatch_timeout: config.dispatch_timeout(),
            max_memory_bytes: config.max_memory_bytes,
        }
    }
}

impl Default for IsolateOptions {
    fn default() -> Self {
        Self::from_config(&PluginConfig::default())
    }
}

pub(super) enum IsolateCommand {
    Activate {
        timeout: Duration,
        reply: oneshot::Sender<NimbusResult<()>>,
    },
    Dispatch {
        request: DispatchRequest,
        timeout: Duration,
        reply: oneshot::Sender<NimbusResult<Value>>,
    },
    Deactivate {
        timeout: Duration,
        reply: oneshot::Sender<NimbusResult<()>>,
    },
    Shutdown,
}

/// Sending half of an isolate's request queue.
#[derive(Clone)]
pub(super) struct IsolateChannel {
    plugin_id: PluginId,
    sender: mpsc::Sender<IsolateCommand>,
}

impl IsolateChannel {
    async fn request<T>(
        &self,
        operation: &str,
        timeout: Duration,
        build: impl FnOnce(oneshot::Sender<NimbusResult<T>>) -> IsolateCommand,
    ) -> NimbusResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .map_err(|_| NimbusError::sandbox(self.plugin_id.as_str(), "isolate is not running"))?;

        let plugin_id = self.plugin_id.as_str();
        with_timeout(timeout, operation, || async move {
            response
                .await
                .map_err(|_| NimbusError::sandbox(plugin_id, "isolate stopped before replying"))?
        })
        .await
    }

    pub(super) async fn dispatch(&self, command: &str, args: Vec<Value>, timeout: Duration) -> NimbusResult<Value> {
        let request = DispatchRequest {
            command: command.to_string(),
            args,
        };
        let operation = format!("command {}.{}", self.plugin_id, command);
        self.request(&operation, timeout, |reply| IsolateCommand::Dispatch {
            request,
            timeout,
            reply,
        })
        .await
    }

    fn shutdown(&self) {
        // Fails only when the thread is already gone.
        let _ = self.sender.send(IsolateCommand::Shutdown);
    }
}

#[derive(Debug, Clone, Copy)]
struct GuestExports {
    dispatch: bool,
    deactivate: bool,
}

/// A running guest module owned by one plugin.
pub struct Isolate {
    plugin_id: PluginId,
    channel: IsolateChannel,
    options: IsolateOptions,
    exports: GuestExports,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Isolate {
    /// Compiles and instantiates `wasm` on a dedicated thread.
    ///
    /// Fails if the module does not compile, imports anything other than
    /// `nimbus.host_call`, lacks an `activate` export, or exceeds the
    /// memory cap.
    pub async fn spawn(context: Arc<PluginContext>, wasm: Vec<u8>, options: IsolateOptions) -> NimbusResult<Self> {
        let plugin_id = context.plugin_id().clone();
        let (sender, receiver) = mpsc::channel();
        let channel = IsolateChannel {
            plugin_id: plugin_id.clone(),
            sender,
        };

        let bridge = HostBridge::new(context, channel.clone(), options.dispatch_timeout, Handle::try_current().ok());
        let (ready, started) = oneshot::channel();

        let thread = thread::Builder::new()
            .name(format!("nimbus-isolate-{plugin_id}"))
            .spawn(move || match GuestInstance::instantiate(&wasm, bridge, options) {
                Ok(instance) => {
                    if ready.send(Ok(instance.exports)).is_ok() {
                        instance.serve(&receiver);
                    }
                }
                Err(e) => {
                    let _ = ready.send(Err(e));
                }
            })
            .map_err(|e| NimbusError::internal(format!("failed to start isolate thread: {e}")))?;

        let id = plugin_id.as_str();
        let startup = with_timeout(options.activation_timeout, &format!("startup of plugin {id}"), || async move {
            started
                .await
                .map_err(|_| NimbusError::sandbox(id, "isolate thread exited during startup"))?
        })
        .await;

        match startup {
            Ok(exports) => {
                debug!(plugin_id = %plugin_id, dispatch = exports.dispatch, "Isolate started");
                Ok(Self {
                    plugin_id,
                    channel,
                    options,
                    exports,
                    thread: Mutex::new(Some(thread)),
                })
            }
            Err(e) => {
                channel.shutdown();
                Err(e)
            }
        }
    }

    #[must_use]
    pub const fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    /// Returns true if the guest can receive command invocations.
    #[must_use]
    pub const fn accepts_commands(&self) -> bool {
        self.exports.dispatch
    }

    /// Runs the guest's `activate`, bounded by the activation timeout.
    pub async fn activate(&self) -> NimbusResult<()> {
        let timeout = self.options.activation_timeout;
        let operation = format!("activation of plugin {}", self.plugin_id);
        self.channel
            .request(&operation, timeout, |reply| IsolateCommand::Activate { timeout, reply })
            .await
    }

    /// Invokes one of the guest's commands directly.
    pub async fn dispatch(&self, command: &str, args: Vec<Value>) -> NimbusResult<Value> {
        self.channel.dispatch(command, args, self.options.dispatch_timeout).await
    }

    /// Runs the guest's `deactivate` if it exports one.
    pub async fn deactivate(&self) -> NimbusResult<()> {
        if !self.exports.deactivate {
            return Ok(());
        }
        let timeout = self.options.dispatch_timeout;
        let operation = format!("deactivation of plugin {}", self.plugin_id);
        self.channel
            .request(&operation, timeout, |reply| IsolateCommand::Deactivate { timeout, reply })
            .await
    }

    /// Stops the isolate thread and waits for it to exit.
    pub async fn shutdown(&self) {
        self.channel.shutdown();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => debug!(plugin_id = %self.plugin_id, "Isolate stopped"),
                _ => warn!(plugin_id = %self.plugin_id, "Isolate thread did not exit cleanly"),
            }
        }
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.channel.shutdown();
    }
}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate")
            .field("plugin_id", &self.plugin_id)
            .field("options", &self.options)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

/// Guest instance living on the isolate thread.
struct GuestInstance {
    plugin_id: PluginId,
    _ticker: EpochTicker,
    store: Store<HostState>,
    instance: Instance,
    exports: GuestExports,
}

impl GuestInstance {
    fn instantiate(wasm: &[u8], mut bridge: HostBridge, options: IsolateOptions) -> NimbusResult<Self> {
        let plugin_id = bridge.plugin_id().clone();
        let id = plugin_id.as_str();

        let mut config = Config::new();
        config.epoch_interruption(true);
        config.wasm_threads(false);
        config.wasm_backtrace_details(WasmBacktraceDetails::Disable);
        let engine =
            Engine::new(&config).map_err(|e| NimbusError::sandbox(id, format!("failed to create engine: {e}")))?;

        let module = Module::new(&engine, wasm)
            .map_err(|e| NimbusError::PluginLoading(format!("plugin {id} failed to compile: {e}")))?;
        check_imports(id, &module)?;
        let exports = inspect_exports(id, &module)?;
        bridge.set_dispatchable(exports.dispatch);

        let mut store = Store::new(&engine, HostState::new(bridge, options.max_memory_bytes));
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(&engine);
        bridge::define(&mut linker).map_err(|e| NimbusError::sandbox(id, e))?;

        let ticker = EpochTicker::start(&engine, id)?;
        let instance = guarded(&mut store, options.activation_timeout, |store| {
            linker.instantiate(store, &module)
        })
        .map_err(|e| describe(id, "instantiation", &e))?;

        Ok(Self {
            plugin_id,
            _ticker: ticker,
            store,
            instance,
            exports,
        })
    }

    fn serve(mut self, receiver: &mpsc::Receiver<IsolateCommand>) {
        while let Ok(command) = receiver.recv() {
            match command {
                IsolateCommand::Activate { timeout, reply } => {
                    let _ = reply.send(self.activate(timeout));
                }
                IsolateCommand::Dispatch {
                    request,
                    timeout,
                    reply,
                } => {
                    let _ = reply.send(self.dispatch(&request, timeout));
                }
                IsolateCommand::Deactivate { timeout, reply } => {
                    let _ = reply.send(self.deactivate(timeout));
                }
                IsolateCommand::Shutdown => break,
            }
        }
        debug!(plugin_id = %self.plugin_id, "Isolate thread exiting");
    }

    fn activate(&mut self, timeout: Duration) -> NimbusResult<()> {
        let id = self.plugin_id.as_str();
        let activate = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, exports::ACTIVATE)
            .map_err(|e| NimbusError::PluginLoading(format!("plugin {id} has an unusable `activate` export: {e}")))?;

        let status = guarded(&mut self.store, timeout, |store| activate.call(store, ()))
            .map_err(|e| describe(id, "activate", &e))?;

        if status != 0 {
            return Err(NimbusError::activation(id, format!("activate returned status {status}")));
        }
        Ok(())
    }

    fn deactivate(&mut self, timeout: Duration) -> NimbusResult<()> {
        let id = self.plugin_id.as_str();
        let deactivate = self
            .instance
            .get_typed_func::<(), ()>(&mut self.store, exports::DEACTIVATE)
            .map_err(|e| NimbusError::sandbox(id, e))?;

        guarded(&mut self.store, timeout, |store| deactivate.call(store, ()))
            .map_err(|e| describe(id, "deactivate", &e))
    }

    fn dispatch(&mut self, request: &DispatchRequest, timeout: Duration) -> NimbusResult<Value> {
        let plugin_id = self.plugin_id.clone();
        let id = plugin_id.as_str();
        let abi = |e: wasmtime::Error| NimbusError::sandbox(id, e);

        let dispatch = self
            .instance
            .get_typed_func::<(i32, i32), i64>(&mut self.store, exports::DISPATCH)
            .map_err(abi)?;
        let alloc = self
            .instance
            .get_typed_func::<i32, i32>(&mut self.store, exports::ALLOC)
            .map_err(abi)?;
        let memory = self
            .instance
            .get_memory(&mut self.store, exports::MEMORY)
            .ok_or_else(|| NimbusError::sandbox(id, "plugin does not export `memory`"))?;
        let payload = serde_json::to_vec(request)?;

        let packed = guarded(&mut self.store, timeout, |store| {
            let len = i32::try_from(payload.len())?;
            let ptr = alloc.call(&mut *store, len)?;
            memory.write(&mut *store, ptr as u32 as usize, &payload)?;
            dispatch.call(&mut *store, (ptr, len))
        })
        .map_err(|e| describe(id, &format!("dispatch of {}", request.command), &e))?;

        if packed == 0 {
            return Ok(Value::Null);
        }

        let (ptr, len) = unpack(packed);
        let bytes = bridge::read_guest(&memory, &self.store, ptr, len).map_err(abi)?;
        self.release(ptr, len, timeout);

        let reply: Reply = serde_json::from_slice(&bytes)
            .map_err(|e| NimbusError::sandbox(id, format!("malformed dispatch reply: {e}")))?;
        reply.into_result().map_err(|message| NimbusError::sandbox(id, message))
    }

    /// Hands a reply buffer back to the guest allocator when it exports `dealloc`.
    fn release(&mut self, ptr: u32, len: u32, timeout: Duration) {
        let Ok(dealloc) = self
            .instance
            .get_typed_func::<(i32, i32), ()>(&mut self.store, exports::DEALLOC)
        else {
            return;
        };

        if let Err(e) = guarded(&mut self.store, timeout, |store| {
            dealloc.call(store, (ptr as i32, len as i32))
        }) {
            debug!(plugin_id = %self.plugin_id, error = %e, "Guest dealloc failed");
        }
    }
}

fn check_imports(plugin_id: &str, module: &Module) -> NimbusResult<()> {
    for import in module.imports() {
        let allowed = import.module() == HOST_MODULE
            && import.name() == HOST_CALL
            && matches!(import.ty(), ExternType::Func(_));
        if !allowed {
            return Err(NimbusError::PluginLoading(format!(
                "plugin {plugin_id} imports {}.{}; only {HOST_MODULE}.{HOST_CALL} is available",
                import.module(),
                import.name()
            )));
        }
    }
    Ok(())
}

fn inspect_exports(plugin_id: &str, module: &Module) -> NimbusResult<GuestExports> {
    let exports_func = |name: &str| matches!(module.get_export(name), Some(ExternType::Func(_)));

    if !exports_func(exports::ACTIVATE) {
        return Err(NimbusError::PluginLoading(format!(
            "plugin {plugin_id} does not export an `activate` function"
        )));
    }

    Ok(GuestExports {
        dispatch: exports_func(exports::DISPATCH),
        deactivate: exports_func(exports::DEACTIVATE),
    })
}

/// Period of the epoch clock that bounds guest calls.
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Advances an engine's epoch every [`EPOCH_TICK`] until dropped.
///
/// One ticker serves every call into the instance.
struct EpochTicker {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EpochTicker {
    fn start(engine: &Engine, plugin_id: &str) -> NimbusResult<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let engine = engine.clone();
        let handle = thread::Builder::new()
            .name(format!("nimbus-epoch-{plugin_id}"))
            .spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(EPOCH_TICK) {
                    engine.increment_epoch();
                }
            })
            .map_err(|e| NimbusError::sandbox(plugin_id, format!("failed to start epoch ticker: {e}")))?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Number of ticks that covers at least `timeout`. The extra tick absorbs
/// the phase of the clock when the deadline is armed.
fn deadline_ticks(timeout: Duration) -> u64 {
    let ticks = timeout.as_nanos().div_ceil(EPOCH_TICK.as_nanos()) + 1;
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

/// Runs guest code with an epoch deadline armed for `timeout`.
fn guarded<R>(
    store: &mut Store<HostState>,
    timeout: Duration,
    call: impl FnOnce(&mut Store<HostState>) -> wasmtime::Result<R>,
) -> wasmtime::Result<R> {
    store.set_epoch_deadline(deadline_ticks(timeout));
    call(store)
}

fn describe(plugin_id: &str, phase: &str, error: &wasmtime::Error) -> NimbusError {
    if matches!(error.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
        return NimbusError::Timeout(format!("{phase} of plugin {plugin_id} was interrupted"));
    }
    NimbusError::sandbox(plugin_id, format!("{phase} failed: {error:#}"))
}
