//! Configuration module for strata.
//!
//! Handles view settings, the CLI connection and environment variables.

mod settings;

pub use settings::{expand_env_vars, ConnectionSettings, Settings, SettingsError, ViewSettings};
