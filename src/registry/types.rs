use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque reference to a provider secret.
///
/// The registry never needs the secret itself; it is resolved only when a
/// probe is about to be sent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// Name of an environment variable holding the key.
    Env(String),
    /// Key supplied directly in configuration.
    Inline(String),
}

impl Credential {
    pub fn env(var: impl Into<String>) -> Self {
        Credential::Env(var.into())
    }

    pub fn inline(key: impl Into<String>) -> Self {
        Credential::Inline(key.into())
    }

    /// Whether the handle itself is well formed (it may still resolve to nothing).
    pub fn is_present(&self) -> bool {
        match self {
            Credential::Env(var) => !var.trim().is_empty(),
            Credential::Inline(key) => !key.trim().is_empty(),
        }
    }

    /// Resolve the handle to the actual secret, if one is available.
    pub fn resolve(&self) -> Option<String> {
        match self {
            Credential::Env(var) => std::env::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty()),
            Credential::Inline(key) if !key.trim().is_empty() => Some(key.clone()),
            Credential::Inline(_) => None,
        }
    }
}

impl Default for Credential {
    /// An empty handle, which never resolves.
    fn default() -> Self {
        Credential::Env(String::new())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Env(var) => f.debug_tuple("Env").field(var).finish(),
            Credential::Inline(_) => f.write_str("Inline(<redacted>)"),
        }
    }
}

/// Requests allowed per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
}

impl RateLimitPolicy {
    pub fn new(per_minute: u32, per_hour: u32, per_day: u32) -> Self {
        Self {
            requests_per_minute: per_minute,
            requests_per_hour: per_hour,
            requests_per_day: per_day,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.requests_per_minute == 0 || self.requests_per_hour == 0 || self.requests_per_day == 0
        {
            return Err("rate limits must be positive".to_string());
        }
        if self.requests_per_minute > self.requests_per_hour
            || self.requests_per_hour > self.requests_per_day
        {
            return Err(format!(
                "rate limits must not shrink with a longer window (minute={}, hour={}, day={})",
                self.requests_per_minute, self.requests_per_hour, self.requests_per_day
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(60, 1000, 10000)
    }
}

/// Rolling counters kept alongside a provider's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Percentage of successful requests, `None` until the first call completes.
    pub success_rate: Option<f64>,
    pub average_response_time_ms: Option<f64>,
    pub response_samples: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Static configuration of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Missing in a config file means "not set yet"; the loader fills in the
    /// provider's `<NAME>_API_KEY` variable.
    #[serde(default)]
    pub credential: Credential,
    pub base_url: String,
    pub models: Vec<String>,
    #[serde(default)]
    pub rate_limits: RateLimitPolicy,
    /// Lower is preferred.
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "is_default_stats")]
    pub stats: ProviderStats,
}

fn default_true() -> bool {
    true
}

fn is_default_stats(stats: &ProviderStats) -> bool {
    *stats == ProviderStats::default()
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        credential: Credential,
        base_url: impl Into<String>,
        models: Vec<String>,
        priority: u32,
    ) -> Self {
        Self {
            name: name.into(),
            credential,
            base_url: base_url.into(),
            models,
            rate_limits: RateLimitPolicy::default(),
            priority,
            enabled: true,
            stats: ProviderStats::default(),
        }
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimitPolicy) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check every admission rule, returning the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !self.credential.is_present() {
            return Err("credential handle must not be empty".to_string());
        }
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| format!("invalid base url '{}': {}", self.base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported base url scheme '{}'", url.scheme()));
        }
        if self.models.is_empty() {
            return Err("at least one model is required".to_string());
        }
        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err("model identifiers must not be empty".to_string());
        }
        if self.priority == 0 {
            return Err("priority must be positive".to_string());
        }
        self.rate_limits.validate()
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Observed health of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Down,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Down => "down",
        }
    }

    pub fn needs_attention(&self) -> bool {
        matches!(self, HealthState::Degraded | HealthState::Down)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub state: HealthState,
    pub last_check: DateTime<Utc>,
    pub response_time: Duration,
    pub error: Option<String>,
    pub available: bool,
}

impl ProviderStatus {
    pub(crate) fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: HealthState::Unknown,
            last_check: Utc::now(),
            response_time: Duration::ZERO,
            error: None,
            available: false,
        }
    }

    /// Eligible for normal selection.
    pub fn is_selectable(&self) -> bool {
        self.available && self.state == HealthState::Healthy
    }
}

/// Partial status merged by [`ProviderRegistry::update_status`](super::ProviderRegistry::update_status).
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub state: Option<HealthState>,
    pub response_time: Option<Duration>,
    /// `Some(None)` clears a previously recorded error.
    pub error: Option<Option<String>>,
    pub available: Option<bool>,
}

impl StatusUpdate {
    pub fn healthy(response_time: Duration) -> Self {
        Self {
            state: Some(HealthState::Healthy),
            response_time: Some(response_time),
            error: Some(None),
            available: Some(true),
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            state: Some(HealthState::Down),
            response_time: None,
            error: Some(Some(error.into())),
            available: Some(false),
        }
    }

    pub fn with_state(mut self, state: HealthState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_available(mut self, available: bool) -> Self {
        self.available = Some(available);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub provider: String,
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
    pub errors: u64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
    pub total: usize,
}

impl StatusCounts {
    pub(crate) fn add(&mut self, state: HealthState) {
        match state {
            HealthState::Healthy => self.healthy += 1,
            HealthState::Degraded => self.degraded += 1,
            HealthState::Down => self.down += 1,
            HealthState::Unknown => self.unknown += 1,
        }
        self.total += 1;
    }
}

/// Serializable view of the registry used for export and import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub providers: Vec<ProviderConfig>,
    pub current: Option<String>,
    #[serde(default)]
    pub fallback_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid provider configuration for '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },
    #[error("Unknown or disabled provider: {0}")]
    UnknownProvider(String),
}
