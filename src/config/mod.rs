//! Configuration module for Trellis.
//!
//! Handles compiler settings and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, CompileSettings, SchemaSettings, Settings, SettingsError};
