//! # Switchboard context
//!
//! Owns one [`ProviderRegistry`], one [`HealthMonitor`] and one
//! [`RecoveryDispatcher`] wired to each other, and exposes the in-process
//! contract used by request-sending code:
//!
//! ```text
//!            ┌───────────────────────────────────────────┐
//!  probes ──▶│ HealthMonitor ──▶ ProviderRegistry ◀──────│── select_best / record_usage
//!            │                        ▲                  │
//!  errors ──▶│ RecoveryDispatcher ────┘                  │
//!            └───────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use llm_switchboard::{Switchboard, SwitchboardConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let switchboard = Switchboard::new(SwitchboardConfig::default())?;
//!     switchboard.start();
//!
//!     if let Some(provider) = switchboard.select_best() {
//!         // ... send the request, then report the outcome
//!         switchboard.record_usage(&provider, 512, 0.002, true);
//!     }
//!
//!     switchboard.shutdown().await;
//!     Ok(())
//! }
//! ```

use crate::cli::SwitchboardConfig;
use crate::health::{HealthMonitor, HealthProbe, HealthSummary};
use crate::recovery::{ErrorContext, ErrorRecord, ErrorStats, RecoveryDispatcher};
use crate::registry::{ProviderRegistry, ProviderStatus, RegistryError, StatusCounts};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Switchboard {
    registry: Arc<ProviderRegistry>,
    monitor: HealthMonitor,
    recovery: RecoveryDispatcher,
}

/// Point-in-time view of the whole switchboard.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchboardStatus {
    pub providers: Vec<ProviderStatus>,
    pub current: Option<String>,
    pub fallback_order: Vec<String>,
    pub counts: StatusCounts,
    pub health: HealthSummary,
    pub errors: ErrorStats,
    pub monitoring: bool,
    pub is_healthy: bool,
}

impl Switchboard {
    /// Build a switchboard that probes providers over HTTP.
    ///
    /// Invalid provider entries are logged and skipped.
    pub fn new(config: SwitchboardConfig) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::new());
        let monitor = HealthMonitor::with_http(registry.clone(), config.health.clone())
            .context("Failed to initialize health monitor")?;
        Ok(Self::assemble(registry, monitor, config))
    }

    /// Build a switchboard around a custom probe implementation.
    pub fn with_probe(config: SwitchboardConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let registry = Arc::new(ProviderRegistry::new());
        let monitor = HealthMonitor::new(registry.clone(), probe, config.health.clone());
        Self::assemble(registry, monitor, config)
    }

    fn assemble(
        registry: Arc<ProviderRegistry>,
        monitor: HealthMonitor,
        mut config: SwitchboardConfig,
    ) -> Self {
        config.fill_missing_credentials();
        let mut registered = 0;
        for provider in config.providers {
            let name = provider.name.clone();
            match registry.register(provider) {
                Ok(()) => registered += 1,
                Err(e) => warn!("Skipping provider '{}': {}", name, e),
            }
        }
        info!("Switchboard initialized with {} providers", registered);

        let recovery = RecoveryDispatcher::new(registry.clone(), config.recovery);
        Self {
            registry,
            monitor,
            recovery,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    pub fn recovery(&self) -> &RecoveryDispatcher {
        &self.recovery
    }

    /// Start periodic health monitoring. Requires a Tokio runtime.
    pub fn start(&self) {
        self.monitor.start();
    }

    /// Stop monitoring and wait for the background loop to exit.
    pub async fn shutdown(&self) {
        info!("Shutting down switchboard...");
        self.monitor.shutdown().await;
    }

    pub fn select_best(&self) -> Option<String> {
        self.registry.select_best()
    }

    pub fn set_current(&self, name: &str) -> Result<(), RegistryError> {
        self.registry.set_current(name)
    }

    pub fn current_provider(&self) -> Option<String> {
        self.registry.current_provider()
    }

    pub fn record_usage(&self, provider: &str, tokens: u64, cost: f64, success: bool) {
        self.registry.record_usage(provider, tokens, cost, success);
    }

    /// Record a failed call and run the matching recovery strategy.
    pub fn handle_error(
        &self,
        provider: &str,
        error: impl Display,
        context: Option<ErrorContext>,
    ) -> ErrorRecord {
        self.recovery.handle_error(provider, error, context)
    }

    pub fn provider_status(&self, name: &str) -> Option<ProviderStatus> {
        self.registry.provider_status(name)
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.recovery.error_stats()
    }

    pub fn status(&self) -> SwitchboardStatus {
        let counts = self.registry.system_health();
        SwitchboardStatus {
            providers: self.registry.all_statuses(),
            current: self.registry.current_provider(),
            fallback_order: self.registry.fallback_order(),
            is_healthy: counts.healthy > 0 && counts.down == 0,
            counts,
            health: self.monitor.system_health(),
            errors: self.recovery.error_stats(),
            monitoring: self.monitor.is_running(),
        }
    }
}
