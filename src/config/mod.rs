//! Configuration model for critsec.
//!
//! This module defines the Config struct that represents `critsec.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, validation of config values, and
//! building the configured lock driver.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::Backend;
