//! Environment constants and path utilities for the switchboard.
//!
//! Centralizes config file locations and the environment variables that
//! carry provider credentials and base URLs.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const SWITCHBOARD_DIR_NAME: &str = ".switchboard";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "switchboard.toml";

/// System-wide configuration file (Unix-like systems)
pub const SYSTEM_CONFIG_FILE: &str = "/etc/switchboard/config.toml";

/// Default `tracing` filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "llm_switchboard=info";

/// Environment variables of the built-in providers
pub mod providers {
    pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
    pub const OPENROUTER_BASE_URL: &str = "OPENROUTER_BASE_URL";

    pub const DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
    pub const DEEPSEEK_BASE_URL: &str = "DEEPSEEK_BASE_URL";

    pub const QWEN_API_KEY: &str = "QWEN_API_KEY";
    pub const QWEN_BASE_URL: &str = "QWEN_BASE_URL";

    pub const GOOGLE_CLI_API_KEY: &str = "GOOGLE_CLI_API_KEY";
    pub const GOOGLE_CLI_BASE_URL: &str = "GOOGLE_CLI_BASE_URL";
}

/// Credential variable conventionally used for a provider name:
/// `google-cli` becomes `GOOGLE_CLI_API_KEY`.
pub fn api_key_var(provider: &str) -> String {
    format!("{}_API_KEY", env_prefix(provider))
}

/// Base URL override variable for a provider name.
pub fn base_url_var(provider: &str) -> String {
    format!("{}_BASE_URL", env_prefix(provider))
}

fn env_prefix(provider: &str) -> String {
    provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(SWITCHBOARD_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(SWITCHBOARD_DIR_NAME).join(CONFIG_FILE_NAME)
}
