//! CLI-specific functionality for the switchboard binary
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, Commands, ExecutionMode};
pub use config::{ConfigDiscovery, ConfigError, SwitchboardConfig, default_providers};
