//! # LLM Switchboard
//!
//! Keeps a pool of LLM API providers usable: tracks their configuration and
//! health, decides which one should serve the next request, and reacts to
//! failures by classifying them and switching to a healthy alternative.
//!
//! ## Architecture Overview
//!
//! - **[`registry`]**: Provider configurations, health status, usage counters
//!   and the current/fallback selection
//! - **[`health`]**: Periodic concurrent probing of every enabled provider
//! - **[`recovery`]**: Error classification, recovery strategies and the
//!   error log
//! - **[`switchboard`]**: Context object wiring the three together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_switchboard::{ConfigDiscovery, Switchboard};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigDiscovery::load(None)?;
//!     let switchboard = Switchboard::new(config)?;
//!     switchboard.monitor().run_probe_pass().await;
//!
//!     match switchboard.select_best() {
//!         Some(provider) => println!("Routing to {}", provider),
//!         None => println!("No healthy provider"),
//!     }
//!     Ok(())
//! }
//! ```

/// Provider registry: configuration, status, usage and selection.
pub mod registry;

/// Health monitoring of registered providers.
///
/// Probes run concurrently behind the [`health::HealthProbe`] trait and
/// every result flows into the registry through a single update path.
pub mod health;

/// Error classification and recovery.
pub mod recovery;

/// High-level context object owning registry, monitor and dispatcher.
pub mod switchboard;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use cli::{ConfigDiscovery, ConfigError, SwitchboardConfig};
pub use health::{HealthCheckResult, HealthConfig, HealthMonitor, HealthProbe, HttpProbe};
pub use recovery::{
    ErrorCategory, ErrorClassifier, ErrorContext, ErrorRecord, RecoveryAction,
    RecoveryDispatcher, RecoveryOutcome, RecoveryStrategy,
};
pub use registry::{
    Credential, HealthState, ProviderConfig, ProviderRegistry, ProviderStatus, RegistryError,
    RegistryEvent,
};
pub use switchboard::{Switchboard, SwitchboardStatus};
