use crate::recovery::ErrorCategory;
use crate::registry::{HealthState, StatusCounts, StatusUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Pause between probe passes.
    pub interval_ms: u64,
    /// Budget for a single endpoint attempt.
    pub timeout_ms: u64,
    /// A 2xx answer slower than this marks the provider degraded.
    pub degraded_latency_ms: u64,
    /// Probe URLs per provider. Providers without an entry are probed at
    /// `<base_url>/models`.
    pub endpoints: HashMap<String, Vec<String>>,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    pub fn degraded_latency(&self) -> Duration {
        Duration::from_millis(self.degraded_latency_ms)
    }

    pub fn with_endpoints(mut self, provider: impl Into<String>, endpoints: Vec<String>) -> Self {
        self.endpoints.insert(provider.into(), endpoints);
        self
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 10_000,
            degraded_latency_ms: 5_000,
            endpoints: HashMap::new(),
        }
    }
}

/// What a single endpoint attempt observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered with an HTTP status.
    Response { status_code: u16, latency: Duration },
    /// No HTTP answer: timeout, DNS failure, refused connection, ...
    Failed { error: String, latency: Duration },
}

impl ProbeOutcome {
    pub fn latency(&self) -> Duration {
        match self {
            ProbeOutcome::Response { latency, .. } | ProbeOutcome::Failed { latency, .. } => {
                *latency
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthDetails {
    pub endpoint: Option<String>,
    pub status_code: Option<u16>,
    pub error_category: Option<ErrorCategory>,
}

/// Result of checking one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub provider: String,
    pub state: HealthState,
    pub response_time: Duration,
    pub error: Option<String>,
    pub available: bool,
    pub last_check: DateTime<Utc>,
    pub details: HealthDetails,
}

impl HealthCheckResult {
    pub(crate) fn down(provider: &str, error: impl Into<String>, details: HealthDetails) -> Self {
        Self {
            provider: provider.to_string(),
            state: HealthState::Down,
            response_time: Duration::ZERO,
            error: Some(error.into()),
            available: false,
            last_check: Utc::now(),
            details,
        }
    }

    pub(crate) fn to_status_update(&self) -> StatusUpdate {
        StatusUpdate {
            state: Some(self.state),
            response_time: Some(self.response_time),
            error: Some(self.error.clone()),
            available: Some(self.available),
        }
    }
}

/// Aggregate over the most recent result of every probed provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSummary {
    pub counts: StatusCounts,
    pub average_response_time: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
