//! # Nimbus Plugin API
//!
//! Data model shared by the Nimbus host and its plugins: manifests,
//! contribution records, language configuration, and the JSON messages
//! exchanged across the sandbox boundary.
//!
//! This crate compiles for both the host (native) and guest
//! (`wasm32-unknown-unknown`) targets. With the `guest` feature on a wasm
//! target it also exposes [`guest`], a thin SDK over the host ABI.

pub mod language;
pub mod manifest;
pub mod protocol;

#[cfg(all(feature = "guest", target_arch = "wasm32"))]
pub mod guest;

pub use language::*;
pub use manifest::*;
pub use protocol::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Plugin lifecycle state.
///
/// `Unloaded → Loading → Active → Unloading → Unloaded`; `Failed` is
/// reached from `Loading` and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Not present in the runtime.
    Unloaded,
    /// Code is being prepared or `activate` is running.
    Loading,
    /// Activated and contributing.
    Active,
    /// Being torn down.
    Unloading,
    /// Load aborted; nothing of the plugin remains registered.
    Failed,
}

impl PluginState {
    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unloaded, Self::Loading)
                | (Self::Loading, Self::Active | Self::Failed)
                | (Self::Active, Self::Unloading)
                | (Self::Unloading, Self::Unloaded)
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Unloading => "unloading",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}
