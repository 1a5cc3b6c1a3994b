//! Messages exchanged between the host and a sandboxed plugin.
//!
//! Every message is a JSON document copied across the isolate boundary; no
//! memory is shared. Guests call the single host import
//! `nimbus.host_call(ptr, len) -> i64` with a serialized [`HostRequest`] and
//! receive a packed pointer to a serialized [`Reply`].

use crate::{LanguageConfiguration, LanguageConfigurationPatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Module name of the host import.
pub const HOST_MODULE: &str = "nimbus";
/// Function name of the host import.
pub const HOST_CALL: &str = "host_call";

/// Export names looked up on a guest module.
pub mod exports {
    pub const MEMORY: &str = "memory";
    pub const ACTIVATE: &str = "activate";
    pub const DEACTIVATE: &str = "deactivate";
    pub const ALLOC: &str = "alloc";
    pub const DEALLOC: &str = "dealloc";
    pub const DISPATCH: &str = "dispatch";
}

/// Which storage facade a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScope {
    Global,
    Workspace,
}

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Severity of a plugin log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// A capability request issued by a guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostRequest {
    /// Register `<plugin>.<name>`; invocations are routed to the guest's
    /// `dispatch` export.
    RegisterCommand { name: String },
    RegisterLanguage { config: LanguageConfiguration },
    SetLanguageConfiguration {
        id: String,
        patch: LanguageConfigurationPatch,
    },
    StorageGet { scope: StorageScope, key: String },
    StorageUpdate {
        scope: StorageScope,
        key: String,
        value: Value,
    },
    /// Fire-and-forget; the chosen action is not reported back.
    ShowMessage {
        level: MessageLevel,
        message: String,
        #[serde(default)]
        actions: Vec<String>,
    },
    Log { level: LogLevel, message: String },
    ExtensionPath,
}

/// Outcome envelope used for host responses and guest dispatch results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Ok(Value),
    Error(String),
}

impl Reply {
    pub fn ok(value: impl Into<Value>) -> Self {
        Self::Ok(value.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Converts the envelope into a `Result`.
    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Error(message) => Err(message),
        }
    }
}

impl From<Result<Value, String>> for Reply {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(message) => Self::Error(message),
        }
    }
}

/// Payload handed to a guest's `dispatch` export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Local command name (without the plugin prefix).
    pub command: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Packs a guest pointer and length into the `i64` return convention.
#[must_use]
pub const fn pack(ptr: u32, len: u32) -> i64 {
    (((ptr as u64) << 32) | len as u64) as i64
}

/// Splits a packed `i64` into `(ptr, len)`.
#[must_use]
pub const fn unpack(packed: i64) -> (u32, u32) {
    let raw = packed as u64;
    ((raw >> 32) as u32, raw as u32)
}
