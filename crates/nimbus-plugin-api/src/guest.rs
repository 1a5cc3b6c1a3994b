//! Guest-side SDK over the host ABI.
//!
//! Plugins implement [`GuestPlugin`] and call [`export_plugin!`] once:
//!
//! ```ignore
//! struct Hello;
//!
//! impl nimbus_plugin_api::guest::GuestPlugin for Hello {
//!     fn activate() -> Result<(), String> {
//!         nimbus_plugin_api::guest::register_command("hello")
//!     }
//!
//!     fn dispatch(command: &str, _args: Vec<serde_json::Value>) -> Result<serde_json::Value, String> {
//!         Ok(format!("{command} from the sandbox").into())
//!     }
//! }
//!
//! nimbus_plugin_api::export_plugin!(Hello);
//! ```

#![allow(unsafe_code)]

use crate::{
    pack, unpack, DispatchRequest, HostRequest, LanguageConfiguration, LogLevel, MessageLevel, Reply,
    StorageScope,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[link(wasm_import_module = "nimbus")]
extern "C" {
    fn host_call(ptr: i32, len: i32) -> i64;
}

/// Behaviour of a sandboxed plugin.
pub trait GuestPlugin {
    /// Runs once when the host loads the plugin.
    fn activate() -> Result<(), String>;

    /// Runs when the plugin is uninstalled.
    fn deactivate() {}

    /// Handles an invocation of one of the plugin's registered commands.
    fn dispatch(command: &str, args: Vec<Value>) -> Result<Value, String> {
        Err(format!("command '{command}' is not handled ({} args)", args.len()))
    }
}

/// Sends a raw request to the host.
pub fn call(request: &HostRequest) -> Result<Value, String> {
    let bytes = serde_json::to_vec(request).map_err(|e| e.to_string())?;
    let packed = unsafe { host_call(bytes.as_ptr() as i32, bytes.len() as i32) };
    if packed == 0 {
        return Ok(Value::Null);
    }

    let (ptr, len) = unpack(packed);
    // The host wrote into a buffer obtained from `alloc`, so ownership moves back here.
    let data = unsafe { Vec::from_raw_parts(ptr as *mut u8, len as usize, len as usize) };
    let reply: Reply = serde_json::from_slice(&data).map_err(|e| e.to_string())?;
    reply.into_result()
}

pub fn register_command(name: &str) -> Result<(), String> {
    call(&HostRequest::RegisterCommand { name: name.to_string() }).map(|_| ())
}

pub fn register_language(config: LanguageConfiguration) -> Result<(), String> {
    call(&HostRequest::RegisterLanguage { config }).map(|_| ())
}

pub fn storage_get<T: DeserializeOwned>(scope: StorageScope, key: &str) -> Result<Option<T>, String> {
    let value = call(&HostRequest::StorageGet {
        scope,
        key: key.to_string(),
    })?;
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(|e| e.to_string())
}

pub fn storage_update<T: Serialize>(scope: StorageScope, key: &str, value: &T) -> Result<(), String> {
    let value = serde_json::to_value(value).map_err(|e| e.to_string())?;
    call(&HostRequest::StorageUpdate {
        scope,
        key: key.to_string(),
        value,
    })
    .map(|_| ())
}

pub fn show_message(level: MessageLevel, message: &str) -> Result<(), String> {
    call(&HostRequest::ShowMessage {
        level,
        message: message.to_string(),
        actions: Vec::new(),
    })
    .map(|_| ())
}

/// Writes a line to the host log. Failures are ignored.
pub fn log(level: LogLevel, message: &str) {
    let _ = call(&HostRequest::Log {
        level,
        message: message.to_string(),
    });
}

pub fn extension_path() -> Result<String, String> {
    match call(&HostRequest::ExtensionPath)? {
        Value::String(path) => Ok(path),
        other => Err(format!("unexpected extension path: {other}")),
    }
}

#[doc(hidden)]
pub fn alloc(len: i32) -> i32 {
    let mut buf = Vec::<u8>::with_capacity(len.max(0) as usize);
    let ptr = buf.as_mut_ptr();
    std::mem::forget(buf);
    ptr as i32
}

#[doc(hidden)]
pub fn dealloc(ptr: i32, len: i32) {
    if ptr == 0 || len <= 0 {
        return;
    }
    drop(unsafe { Vec::from_raw_parts(ptr as *mut u8, len as usize, len as usize) });
}

#[doc(hidden)]
pub fn run_activate<P: GuestPlugin>() -> i32 {
    match P::activate() {
        Ok(()) => 0,
        Err(message) => {
            log(LogLevel::Error, &message);
            1
        }
    }
}

#[doc(hidden)]
pub fn run_dispatch<P: GuestPlugin>(ptr: i32, len: i32) -> i64 {
    let data = unsafe { Vec::from_raw_parts(ptr as *mut u8, len as usize, len as usize) };
    let reply: Reply = match serde_json::from_slice::<DispatchRequest>(&data) {
        Ok(request) => P::dispatch(&request.command, request.args).into(),
        Err(e) => Reply::error(e.to_string()),
    };

    let Ok(bytes) = serde_json::to_vec(&reply) else {
        return 0;
    };
    let bytes = bytes.into_boxed_slice();
    let len = bytes.len() as u32;
    let ptr = Box::leak(bytes).as_mut_ptr() as u32;
    pack(ptr, len)
}

/// Emits the ABI exports for a [`GuestPlugin`] implementation.
#[macro_export]
macro_rules! export_plugin {
    ($plugin:ty) => {
        #[no_mangle]
        pub extern "C" fn alloc(len: i32) -> i32 {
            $crate::guest::alloc(len)
        }

        #[no_mangle]
        pub extern "C" fn dealloc(ptr: i32, len: i32) {
            $crate::guest::dealloc(ptr, len)
        }

        #[no_mangle]
        pub extern "C" fn activate() -> i32 {
            $crate::guest::run_activate::<$plugin>()
        }

        #[no_mangle]
        pub extern "C" fn deactivate() {
            <$plugin as $crate::guest::GuestPlugin>::deactivate()
        }

        #[no_mangle]
        pub extern "C" fn dispatch(ptr: i32, len: i32) -> i64 {
            $crate::guest::run_dispatch::<$plugin>(ptr, len)
        }
    };
}
