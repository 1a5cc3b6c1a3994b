//! # Nimbus Config
//!
//! Configuration management for the Nimbus plugin runtime.
//! Supports layered configuration from files and environment variables,
//! validated up front so that a bad value fails at startup.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
