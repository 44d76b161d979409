//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit path given on the command line
//! 2. Current directory: ./switchboard.toml or ./.switchboard/config.toml
//! 3. User config: ~/.switchboard/config.toml
//! 4. System config: /etc/switchboard/config.toml
//! 5. Built-in defaults
//!
//! Whatever the source, the environment overlay is applied last.

use crate::env::{self, providers as vars};
use crate::health::HealthConfig;
use crate::recovery::RecoveryConfig;
use crate::registry::{Credential, ProviderConfig, RateLimitPolicy};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid TOML configuration: {0}")]
    InvalidToml(#[from] toml::de::Error),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Everything needed to build a [`Switchboard`](crate::Switchboard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub providers: Vec<ProviderConfig>,
    pub health: HealthConfig,
    pub recovery: RecoveryConfig,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            health: HealthConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// The four providers known out of the box. Credentials are read from the
/// environment when probed.
pub fn default_providers() -> Vec<ProviderConfig> {
    let models = |names: &[&str]| names.iter().map(|m| m.to_string()).collect::<Vec<_>>();
    vec![
        ProviderConfig::new(
            "openrouter",
            Credential::env(vars::OPENROUTER_API_KEY),
            "https://openrouter.ai/api/v1",
            models(&["gpt-4", "gpt-3.5-turbo", "claude-3-opus", "claude-3-sonnet"]),
            1,
        )
        .with_rate_limits(RateLimitPolicy::new(60, 1000, 10000)),
        ProviderConfig::new(
            "deepseek",
            Credential::env(vars::DEEPSEEK_API_KEY),
            "https://api.deepseek.com/v1",
            models(&["deepseek-chat", "deepseek-coder"]),
            2,
        )
        .with_rate_limits(RateLimitPolicy::new(30, 500, 5000)),
        ProviderConfig::new(
            "qwen",
            Credential::env(vars::QWEN_API_KEY),
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
            models(&["qwen-turbo", "qwen-plus", "qwen-max"]),
            3,
        )
        .with_rate_limits(RateLimitPolicy::new(40, 800, 8000)),
        ProviderConfig::new(
            "google-cli",
            Credential::env(vars::GOOGLE_CLI_API_KEY),
            "https://generativelanguage.googleapis.com/v1beta",
            models(&["gemini-1.5-flash", "gemini-1.5-pro"]),
            4,
        )
        .with_rate_limits(RateLimitPolicy::new(50, 1000, 10000)),
    ]
}

impl SwitchboardConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `<NAME>_BASE_URL` and `<NAME>_API_KEY` from the environment.
    ///
    /// A base URL variable replaces the configured URL. Providers without a
    /// credential handle of their own get their `<NAME>_API_KEY` variable,
    /// whether or not it is set yet.
    pub fn apply_env_overrides(&mut self) {
        for provider in &mut self.providers {
            let url_var = env::base_url_var(&provider.name);
            if let Some(url) = non_empty_var(&url_var) {
                debug!("{} overrides base url of {}", url_var, provider.name);
                provider.base_url = url;
            }
        }
        self.fill_missing_credentials();
    }

    /// Point every provider without a credential handle at its
    /// `<NAME>_API_KEY` variable.
    pub fn fill_missing_credentials(&mut self) {
        for provider in &mut self.providers {
            if provider.credential.is_present() || provider.name.trim().is_empty() {
                continue;
            }
            let key_var = env::api_key_var(&provider.name);
            if non_empty_var(&key_var).is_none() {
                warn!(
                    "Provider {} has no credential and {} is not set",
                    provider.name, key_var
                );
            }
            debug!("{} supplies the credential of {}", key_var, provider.name);
            provider.credential = Credential::env(key_var);
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std_env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the explicit file if given, otherwise the first file found in the
    /// hierarchy, otherwise the defaults; then apply the environment overlay.
    pub fn load(explicit: Option<&Path>) -> Result<SwitchboardConfig, ConfigError> {
        let mut config = match explicit {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                SwitchboardConfig::from_toml_file(path)?
            }
            None => Self::discover_config()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<SwitchboardConfig, ConfigError> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return SwitchboardConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(SwitchboardConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        for candidate in Self::get_config_candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    pub fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_FILE));

        candidates
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Create a default config file in the user's home directory
    pub fn create_default_user_config() -> Result<PathBuf, ConfigError> {
        let home_dir = Self::get_home_dir().ok_or(ConfigError::NoHomeDir)?;

        let config_dir = env::user_config_dir_path(&home_dir);
        let config_path = env::user_config_file_path(&home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
                path: config_dir.clone(),
                source,
            })?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            SwitchboardConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::find_config_file() {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
    }
}
