use crate::recovery::classifier::ErrorClassifier;
use crate::recovery::types::*;
use crate::registry::ProviderRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Classifies provider failures, runs the matching recovery strategy against
/// the registry and keeps a log of what happened.
#[derive(Debug)]
pub struct RecoveryDispatcher {
    registry: Arc<ProviderRegistry>,
    classifier: RwLock<ErrorClassifier>,
    records: DashMap<ErrorId, ErrorRecord>,
    config: RecoveryConfig,
}

impl RecoveryDispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, config: RecoveryConfig) -> Self {
        let mut classifier = ErrorClassifier::new();
        let cooldown = Duration::from_secs(config.rate_limit_cooldown_secs);
        classifier.register_strategy(
            ErrorCategory::RateLimit,
            RecoveryStrategy::default_for(ErrorCategory::RateLimit).with_delay(cooldown),
        );

        Self {
            registry,
            classifier: RwLock::new(classifier),
            records: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn register_pattern(
        &self,
        category: ErrorCategory,
        pattern: &str,
    ) -> Result<(), regex::Error> {
        self.classifier.write().register_pattern(category, pattern)
    }

    pub fn register_strategy(&self, category: ErrorCategory, strategy: RecoveryStrategy) {
        self.classifier.write().register_strategy(category, strategy);
    }

    /// Category and strategy for a message, without recording or acting on it.
    pub fn classify(&self, message: &str) -> (ErrorCategory, RecoveryStrategy) {
        let classifier = self.classifier.read();
        let category = classifier.classify(message);
        (category, classifier.strategy(category))
    }

    /// Record a failure observed on `provider` and carry out its recovery
    /// strategy.
    ///
    /// Retries are only planned here; re-issuing the request is up to the
    /// caller, using the returned [`RetryPlan`].
    pub fn handle_error(
        &self,
        provider: &str,
        error: impl Display,
        context: Option<ErrorContext>,
    ) -> ErrorRecord {
        let message = error.to_string();
        let (category, strategy) = self.classify(&message);
        error!(
            "Provider {} failed ({}): {}",
            provider, category, message
        );

        let outcome = self.dispatch(provider, &strategy);
        let record = ErrorRecord {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            category,
            message,
            timestamp: Utc::now(),
            context,
            retryable: category.is_retryable(),
            strategy,
            outcome,
            resolved: false,
            resolution_time: None,
            resolution_strategy: None,
        };

        self.store(record.clone());
        record
    }

    fn dispatch(&self, provider: &str, strategy: &RecoveryStrategy) -> RecoveryOutcome {
        match strategy.action {
            RecoveryAction::Retry => {
                let plan = RetryPlan {
                    max_attempts: strategy.max_retries.unwrap_or(3),
                    base_delay: strategy.delay.unwrap_or(Duration::from_secs(1)),
                };
                info!(
                    "Retry planned for {}: up to {} attempts from {:?}",
                    provider, plan.max_attempts, plan.base_delay
                );
                RecoveryOutcome::RetryScheduled { plan }
            }
            RecoveryAction::SwitchProvider => {
                if let Some(delay) = strategy.delay
                    && !delay.is_zero()
                {
                    self.registry.start_cooldown(provider, delay);
                }
                match self.registry.fail_over(provider) {
                    Some(to) => RecoveryOutcome::Switched {
                        from: provider.to_string(),
                        to,
                    },
                    None => {
                        warn!("No healthy provider available to replace {}", provider);
                        RecoveryOutcome::NoProviderAvailable
                    }
                }
            }
            RecoveryAction::Fallback => {
                info!("Fallback requested after failure of {}", provider);
                RecoveryOutcome::FallbackRequested
            }
            RecoveryAction::UserNotification => {
                warn!("{}: {}", strategy.message, strategy.suggestion);
                RecoveryOutcome::UserNotified {
                    message: strategy.message.clone(),
                }
            }
            RecoveryAction::None => RecoveryOutcome::NoAction,
        }
    }

    fn store(&self, record: ErrorRecord) {
        self.records.insert(record.id, record);
        while self.records.len() > self.config.max_records {
            let oldest = self
                .records
                .iter()
                .min_by_key(|entry| entry.timestamp)
                .map(|entry| *entry.key());
            match oldest {
                Some(id) => {
                    self.records.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Mark a record resolved. Returns whether the id exists; resolving twice
    /// keeps the first resolution.
    pub fn resolve_error(&self, id: ErrorId, resolution: Option<String>) -> bool {
        let Some(mut record) = self.records.get_mut(&id) else {
            return false;
        };
        if !record.resolved {
            record.resolved = true;
            record.resolution_time = Some(Utc::now());
            record.resolution_strategy = resolution;
            debug!("Error {} resolved", id);
        }
        true
    }

    pub fn get_error(&self, id: ErrorId) -> Option<ErrorRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    pub fn error_stats(&self) -> ErrorStats {
        let mut stats = ErrorStats::default();
        for record in self.records.iter() {
            stats.total += 1;
            if record.resolved {
                stats.resolved += 1;
            }
            *stats.by_category.entry(record.category).or_default() += 1;
            *stats.by_provider.entry(record.provider.clone()).or_default() += 1;
        }
        stats.unresolved = stats.total - stats.resolved;
        stats
    }

    /// Most recent records first.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        let mut records = self.export_error_logs();
        records.reverse();
        records.truncate(limit);
        records
    }

    pub fn errors_by_provider(&self, provider: &str) -> Vec<ErrorRecord> {
        self.filtered(|r| r.provider == provider)
    }

    pub fn errors_by_category(&self, category: ErrorCategory) -> Vec<ErrorRecord> {
        self.filtered(|r| r.category == category)
    }

    fn filtered(&self, keep: impl Fn(&ErrorRecord) -> bool) -> Vec<ErrorRecord> {
        let mut records: Vec<ErrorRecord> = self
            .records
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }

    /// Drop records past the configured retention.
    pub fn clear_old_logs(&self) -> usize {
        let cutoff = Utc::now()
            .checked_sub_signed(self.config.retention())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.clear_logs_older_than(cutoff)
    }

    pub fn clear_logs_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.timestamp >= cutoff);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            info!("Cleared {} error records older than {}", removed, cutoff);
        }
        removed
    }

    /// Every record, oldest first.
    pub fn export_error_logs(&self) -> Vec<ErrorRecord> {
        self.filtered(|_| true)
    }

    /// Merge previously exported records; records with a known id are replaced.
    pub fn import_error_logs(&self, records: Vec<ErrorRecord>) -> usize {
        let count = records.len();
        for record in records {
            self.store(record);
        }
        count
    }

    pub fn user_friendly_message(&self, category: ErrorCategory) -> &'static str {
        category.user_friendly_message()
    }

    pub fn suggestions(&self, category: ErrorCategory) -> &'static [&'static str] {
        category.suggestions()
    }
}
