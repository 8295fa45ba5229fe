//! Shared configuration and execution-mode types.
//!
//! # Invariants
//! - A `Config` that passed `validate` has at least one world.
//! - GPU execution always carries a device id.

mod config;
mod types;

pub use config::{Config, ConfigError, DEFAULT_DATA_DIR, STATIC_OBJECT_FILES};
pub use types::{CompileMode, ExecMode, RenderSize};
