use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub type ErrorId = Uuid;

/// Closed taxonomy of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Model,
    Network,
    Service,
    Unknown,
}

impl ErrorCategory {
    /// Order in which pattern groups are tested; first match wins.
    pub const PRIORITY: [ErrorCategory; 5] = [
        ErrorCategory::Auth,
        ErrorCategory::RateLimit,
        ErrorCategory::Model,
        ErrorCategory::Network,
        ErrorCategory::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Model => "model",
            ErrorCategory::Network => "network",
            ErrorCategory::Service => "service",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Only transient transport and server failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Service)
    }

    /// Category implied by a non-2xx HTTP status.
    pub fn from_status_code(status_code: u16) -> Self {
        match status_code {
            401 | 403 => ErrorCategory::Auth,
            429 => ErrorCategory::RateLimit,
            400 | 404 => ErrorCategory::Model,
            500.. => ErrorCategory::Service,
            _ => ErrorCategory::Network,
        }
    }

    pub fn user_friendly_message(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Your API key appears to be invalid. Please check your settings.",
            ErrorCategory::RateLimit => {
                "You've reached the rate limit for this provider. We'll switch to an alternative."
            }
            ErrorCategory::Model => {
                "The requested model is not available. We'll use an alternative provider."
            }
            ErrorCategory::Network => {
                "There was a network connection issue. We'll retry automatically."
            }
            ErrorCategory::Service => {
                "The service is temporarily unavailable. We'll switch to an alternative provider."
            }
            ErrorCategory::Unknown => "An unexpected error occurred. We'll try alternative methods.",
        }
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorCategory::Auth => &[
                "Check your API key in the settings",
                "Verify the API key is correct and active",
                "Ensure the API key has the necessary permissions",
            ],
            ErrorCategory::RateLimit => &[
                "Wait a few minutes before trying again",
                "Consider upgrading your API plan",
                "Check your usage limits in the provider dashboard",
            ],
            ErrorCategory::Model => &[
                "Try using a different model",
                "Check if the model is available in your region",
                "Verify the model name is correct",
            ],
            ErrorCategory::Network => &[
                "Check your internet connection",
                "Try again in a few moments",
                "Contact support if the issue persists",
            ],
            ErrorCategory::Service => &[
                "The service should be back online shortly",
                "Try again in a few minutes",
                "Check the provider's status page",
            ],
            ErrorCategory::Unknown => &[
                "Try again in a few moments",
                "Check your internet connection",
                "Contact support if the issue persists",
            ],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    SwitchProvider,
    Fallback,
    UserNotification,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub action: RecoveryAction,
    /// Retry base delay, or cool-down of the failing provider for switches.
    pub delay: Option<Duration>,
    pub max_retries: Option<u32>,
    pub message: String,
    pub suggestion: String,
}

impl RecoveryStrategy {
    pub fn new(action: RecoveryAction, message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            action,
            delay: None,
            max_retries: None,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Built-in strategy for each category.
    pub fn default_for(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Auth => RecoveryStrategy::new(
                RecoveryAction::UserNotification,
                "API key is invalid or expired",
                "Please check your API key configuration in the settings",
            ),
            ErrorCategory::RateLimit => RecoveryStrategy::new(
                RecoveryAction::SwitchProvider,
                "Rate limit exceeded",
                "Switching to alternative provider",
            )
            .with_delay(Duration::from_secs(60)),
            ErrorCategory::Model => RecoveryStrategy::new(
                RecoveryAction::SwitchProvider,
                "Model not available",
                "Switching to provider with available models",
            ),
            ErrorCategory::Network => RecoveryStrategy::new(
                RecoveryAction::Retry,
                "Network connection issue",
                "Retrying with exponential backoff",
            )
            .with_delay(Duration::from_secs(2))
            .with_max_retries(3),
            ErrorCategory::Service => RecoveryStrategy::new(
                RecoveryAction::SwitchProvider,
                "Service temporarily unavailable",
                "Switching to alternative provider",
            ),
            ErrorCategory::Unknown => RecoveryStrategy::new(
                RecoveryAction::Fallback,
                "Unexpected error occurred",
                "Using fallback generation method",
            ),
        }
    }
}

/// Backoff schedule handed to the caller; this layer never re-issues calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPlan {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPlan {
    const MAX_EXPONENT: u32 = 5;

    /// Delay before retry number `attempt` (1-based): exponential from the
    /// base delay with ±10% jitter. `None` once the attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let multiplier = 2u32.pow((attempt - 1).min(Self::MAX_EXPONENT));
        let delay = self.base_delay * multiplier;
        let jitter = (rand::random::<f64>() - 0.5) * 0.2;
        Some(delay.mul_f64(1.0 + jitter))
    }
}

/// What dispatching a strategy actually did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    RetryScheduled { plan: RetryPlan },
    Switched { from: String, to: String },
    NoProviderAvailable,
    FallbackRequested,
    UserNotified { message: String },
    NoAction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub request_id: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub session_id: Option<String>,
}

impl ErrorContext {
    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// One observed provider failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: ErrorId,
    /// Weak reference: the provider may since have been removed.
    pub provider: String,
    pub category: ErrorCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub context: Option<ErrorContext>,
    pub retryable: bool,
    pub strategy: RecoveryStrategy,
    pub outcome: RecoveryOutcome,
    pub resolved: bool,
    pub resolution_time: Option<DateTime<Utc>>,
    pub resolution_strategy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub by_category: HashMap<ErrorCategory, usize>,
    pub by_provider: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Records older than this are purged by `clear_old_logs`.
    pub retention_days: u32,
    /// Oldest records are evicted beyond this many.
    pub max_records: usize,
    /// Cool-down applied to a provider that hit its rate limit.
    pub rate_limit_cooldown_secs: u64,
}

impl RecoveryConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            max_records: 10_000,
            rate_limit_cooldown_secs: 60,
        }
    }
}
