use crate::recovery::types::{ErrorCategory, RecoveryStrategy};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

const DEFAULT_PATTERNS: &[(ErrorCategory, &str)] = &[
    (
        ErrorCategory::Auth,
        r"invalid.*api.*key|unauthorized|forbidden|authentication.*failed|\b40[13]\b",
    ),
    (
        ErrorCategory::RateLimit,
        r"rate.*limit|too.*many.*requests|quota.*exceeded|\b429\b",
    ),
    (
        ErrorCategory::Model,
        r"model.*not.*exist|model.*not.*found|invalid.*model|\b400\b",
    ),
    (
        ErrorCategory::Network,
        r"network.*error|connection.*(failed|refused|reset)|timed?\s*out|dns.*(error|fail)",
    ),
    (
        ErrorCategory::Service,
        r"internal.*server.*error|service.*unavailable|bad.*gateway|\b50[0234]\b",
    ),
];

/// Maps free-form error text to an [`ErrorCategory`] and the strategy to run
/// for it.
///
/// Categories are tried in [`ErrorCategory::PRIORITY`] order and the first
/// category with a matching pattern wins, so a message mentioning both a
/// rate limit and a timeout is a rate-limit error.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: HashMap<ErrorCategory, Vec<Regex>>,
    strategies: HashMap<ErrorCategory, RecoveryStrategy>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Classifier with the built-in patterns and strategies.
    pub fn new() -> Self {
        let mut classifier = Self {
            patterns: HashMap::new(),
            strategies: HashMap::new(),
        };
        for (category, pattern) in DEFAULT_PATTERNS {
            // Built-in patterns are static and known to compile
            if let Err(e) = classifier.register_pattern(*category, pattern) {
                tracing::error!("Built-in pattern for {} failed to compile: {}", category, e);
            }
        }
        classifier
    }

    /// Add a case-insensitive pattern for `category`, tried after the
    /// existing ones.
    pub fn register_pattern(
        &mut self,
        category: ErrorCategory,
        pattern: &str,
    ) -> Result<(), regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.patterns.entry(category).or_default().push(regex);
        Ok(())
    }

    /// Override the strategy used for `category`.
    pub fn register_strategy(&mut self, category: ErrorCategory, strategy: RecoveryStrategy) {
        self.strategies.insert(category, strategy);
    }

    pub fn classify(&self, message: &str) -> ErrorCategory {
        ErrorCategory::PRIORITY
            .into_iter()
            .find(|category| {
                self.patterns
                    .get(category)
                    .is_some_and(|patterns| patterns.iter().any(|re| re.is_match(message)))
            })
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn strategy(&self, category: ErrorCategory) -> RecoveryStrategy {
        self.strategies
            .get(&category)
            .cloned()
            .unwrap_or_else(|| RecoveryStrategy::default_for(category))
    }
}
