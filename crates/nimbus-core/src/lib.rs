//! # Nimbus Core
//!
//! Core types, error definitions, and shared utilities for the Nimbus
//! plugin runtime. Every other crate in the workspace builds on these
//! foundational abstractions.

pub mod disposable;
pub mod error;
pub mod id;
pub mod result;
pub mod telemetry;
pub mod timeout;

pub use disposable::*;
pub use error::*;
pub use id::*;
pub use result::*;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use timeout::*;
