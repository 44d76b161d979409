use super::*;
use crate::registry::{Credential, ProviderConfig, ProviderRegistry, StatusUpdate};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn registry_with(providers: &[(&str, u32)]) -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new());
    for (name, priority) in providers {
        registry
            .register(ProviderConfig::new(
                *name,
                Credential::inline("sk-test"),
                format!("https://{name}.example.com/v1"),
                vec!["chat".to_string()],
                *priority,
            ))
            .unwrap();
        registry.update_status(name, StatusUpdate::healthy(Duration::from_millis(100)));
    }
    registry
}

fn record_at(provider: &str, category: ErrorCategory, age: chrono::Duration) -> ErrorRecord {
    ErrorRecord {
        id: Uuid::new_v4(),
        provider: provider.to_string(),
        category,
        message: "imported".to_string(),
        timestamp: Utc::now() - age,
        context: None,
        retryable: category.is_retryable(),
        strategy: RecoveryStrategy::default_for(category),
        outcome: RecoveryOutcome::NoAction,
        resolved: false,
        resolution_time: None,
        resolution_strategy: None,
    }
}

#[test]
fn test_classification_follows_category_priority() {
    let classifier = ErrorClassifier::new();
    let cases = [
        ("Invalid API key provided", ErrorCategory::Auth),
        ("HTTP 401 Unauthorized", ErrorCategory::Auth),
        ("Rate limit exceeded, 429", ErrorCategory::RateLimit),
        ("Too Many Requests", ErrorCategory::RateLimit),
        ("monthly quota exceeded", ErrorCategory::RateLimit),
        ("The model `gpt-5` does not exist", ErrorCategory::Model),
        ("model not found", ErrorCategory::Model),
        ("connection timeout", ErrorCategory::Network),
        ("Network error: connection refused", ErrorCategory::Network),
        ("request timed out", ErrorCategory::Network),
        ("503 Service Unavailable", ErrorCategory::Service),
        ("Internal Server Error", ErrorCategory::Service),
        ("HTTP 502", ErrorCategory::Service),
        ("something odd happened", ErrorCategory::Unknown),
        // Rate limiting outranks the transport symptom
        ("rate limit hit, connection timeout", ErrorCategory::RateLimit),
    ];
    for (message, expected) in cases {
        assert_eq!(classifier.classify(message), expected, "{message}");
    }
}

#[test]
fn test_status_code_categories() {
    assert_eq!(ErrorCategory::from_status_code(401), ErrorCategory::Auth);
    assert_eq!(ErrorCategory::from_status_code(403), ErrorCategory::Auth);
    assert_eq!(ErrorCategory::from_status_code(429), ErrorCategory::RateLimit);
    assert_eq!(ErrorCategory::from_status_code(404), ErrorCategory::Model);
    assert_eq!(ErrorCategory::from_status_code(503), ErrorCategory::Service);
    assert_eq!(ErrorCategory::from_status_code(418), ErrorCategory::Network);
}

#[test]
fn test_only_network_and_service_are_retryable() {
    assert!(ErrorCategory::Network.is_retryable());
    assert!(ErrorCategory::Service.is_retryable());
    for category in [
        ErrorCategory::Auth,
        ErrorCategory::RateLimit,
        ErrorCategory::Model,
        ErrorCategory::Unknown,
    ] {
        assert!(!category.is_retryable(), "{category}");
    }
}

#[test]
fn test_service_error_switches_to_next_healthy_provider() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    registry.set_current("a").unwrap();
    let dispatcher = RecoveryDispatcher::new(registry.clone(), RecoveryConfig::default());

    let record = dispatcher.handle_error("a", "503 Service Unavailable", None);

    assert_eq!(record.category, ErrorCategory::Service);
    assert!(record.retryable);
    assert_eq!(record.strategy.action, RecoveryAction::SwitchProvider);
    assert_eq!(
        record.outcome,
        RecoveryOutcome::Switched {
            from: "a".to_string(),
            to: "b".to_string()
        }
    );
    assert_eq!(registry.current_provider().as_deref(), Some("b"));
    assert!(!record.resolved);
}

#[test]
fn test_rate_limit_cools_down_failing_provider() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    registry.set_current("a").unwrap();
    let dispatcher = RecoveryDispatcher::new(registry.clone(), RecoveryConfig::default());

    let record = dispatcher.handle_error("a", "Rate limit exceeded, 429", None);

    assert_eq!(record.category, ErrorCategory::RateLimit);
    assert!(!record.retryable);
    assert_eq!(record.strategy.delay, Some(Duration::from_secs(60)));
    assert!(registry.is_cooling_down("a"));
    assert_eq!(registry.current_provider().as_deref(), Some("b"));
    // Still healthy, but out of selection until the cool-down ends
    assert_eq!(registry.select_best().as_deref(), Some("b"));
}

#[test]
fn test_switch_without_alternatives_reports_no_provider() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    registry.update_status("b", StatusUpdate::down("HTTP 503"));
    registry.set_current("a").unwrap();
    let dispatcher = RecoveryDispatcher::new(registry.clone(), RecoveryConfig::default());

    let record = dispatcher.handle_error("a", "model not found", None);

    assert_eq!(record.category, ErrorCategory::Model);
    assert_eq!(record.outcome, RecoveryOutcome::NoProviderAvailable);
    assert_eq!(registry.current_provider().as_deref(), Some("a"));
}

#[test]
fn test_network_error_plans_backoff() {
    let registry = registry_with(&[("a", 1)]);
    let dispatcher = RecoveryDispatcher::new(registry, RecoveryConfig::default());

    let record = dispatcher.handle_error("a", "connection timeout", None);

    assert_eq!(record.category, ErrorCategory::Network);
    assert!(record.retryable);
    assert_eq!(record.strategy.max_retries, Some(3));
    let RecoveryOutcome::RetryScheduled { plan } = record.outcome else {
        panic!("expected a retry plan, got {:?}", record.outcome);
    };
    assert_eq!(plan.max_attempts, 3);
    assert_eq!(plan.base_delay, Duration::from_secs(2));

    let first = plan.delay_for(1).unwrap();
    assert!(first >= Duration::from_millis(1800) && first <= Duration::from_millis(2200));
    let third = plan.delay_for(3).unwrap();
    assert!(third >= Duration::from_millis(7200) && third <= Duration::from_millis(8800));
    assert_eq!(plan.delay_for(0), None);
    assert_eq!(plan.delay_for(4), None);
}

#[test]
fn test_auth_and_unknown_errors_leave_selection_alone() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    registry.set_current("a").unwrap();
    let dispatcher = RecoveryDispatcher::new(registry.clone(), RecoveryConfig::default());

    let auth = dispatcher.handle_error("a", "authentication failed", None);
    assert_eq!(
        auth.outcome,
        RecoveryOutcome::UserNotified {
            message: "API key is invalid or expired".to_string()
        }
    );

    let unknown = dispatcher.handle_error("a", "the llama escaped", None);
    assert_eq!(unknown.category, ErrorCategory::Unknown);
    assert_eq!(unknown.outcome, RecoveryOutcome::FallbackRequested);

    assert_eq!(registry.current_provider().as_deref(), Some("a"));
    assert!(!registry.is_cooling_down("a"));
}

#[test]
fn test_context_is_kept_on_record() {
    let dispatcher = RecoveryDispatcher::new(registry_with(&[("a", 1)]), RecoveryConfig::default());
    let context = ErrorContext::for_request("req-1")
        .with_model("chat")
        .with_endpoint("/chat/completions");

    let record = dispatcher.handle_error("a", "HTTP 502", Some(context.clone()));

    assert_eq!(record.context, Some(context));
    assert_eq!(dispatcher.get_error(record.id), Some(record));
}

#[test]
fn test_resolve_error_is_idempotent() {
    let dispatcher = RecoveryDispatcher::new(registry_with(&[("a", 1)]), RecoveryConfig::default());
    let record = dispatcher.handle_error("a", "connection failed", None);

    assert!(dispatcher.resolve_error(record.id, Some("retried".to_string())));
    let first = dispatcher.get_error(record.id).unwrap();
    assert!(first.resolved);
    assert_eq!(first.resolution_strategy.as_deref(), Some("retried"));

    assert!(dispatcher.resolve_error(record.id, Some("again".to_string())));
    let second = dispatcher.get_error(record.id).unwrap();
    assert_eq!(second.resolution_time, first.resolution_time);
    assert_eq!(second.resolution_strategy.as_deref(), Some("retried"));

    assert!(!dispatcher.resolve_error(Uuid::new_v4(), None));
}

#[test]
fn test_stats_and_filters() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    let dispatcher = RecoveryDispatcher::new(registry, RecoveryConfig::default());

    let first = dispatcher.handle_error("a", "connection failed", None);
    dispatcher.handle_error("a", "Internal Server Error", None);
    dispatcher.handle_error("b", "connection reset", None);
    dispatcher.resolve_error(first.id, None);

    let stats = dispatcher.error_stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.unresolved, 2);
    assert_eq!(stats.by_category.get(&ErrorCategory::Network), Some(&2));
    assert_eq!(stats.by_category.get(&ErrorCategory::Service), Some(&1));
    assert_eq!(stats.by_provider.get("a"), Some(&2));
    assert_eq!(stats.by_provider.get("b"), Some(&1));

    assert_eq!(dispatcher.errors_by_provider("a").len(), 2);
    assert_eq!(dispatcher.errors_by_category(ErrorCategory::Network).len(), 2);
    assert_eq!(dispatcher.recent_errors(2).len(), 2);
}

#[test]
fn test_old_records_are_cleared_and_recent_kept() {
    let dispatcher = RecoveryDispatcher::new(registry_with(&[("a", 1)]), RecoveryConfig::default());
    dispatcher.import_error_logs(vec![
        record_at("a", ErrorCategory::Network, chrono::Duration::days(40)),
        record_at("a", ErrorCategory::Service, chrono::Duration::days(29)),
    ]);
    dispatcher.handle_error("a", "HTTP 503", None);

    assert_eq!(dispatcher.clear_old_logs(), 1);
    let remaining = dispatcher.export_error_logs();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|r| r.category == ErrorCategory::Service));

    // Exported oldest first, recent_errors newest first
    assert_eq!(remaining[0].message, "imported");
    assert_eq!(dispatcher.recent_errors(1)[0].message, "HTTP 503");
}

#[test]
fn test_retention_past_calendar_range_keeps_everything() {
    let config = RecoveryConfig {
        retention_days: u32::MAX,
        ..Default::default()
    };
    let dispatcher = RecoveryDispatcher::new(registry_with(&[("a", 1)]), config);
    dispatcher.import_error_logs(vec![record_at(
        "a",
        ErrorCategory::Network,
        chrono::Duration::days(400),
    )]);

    assert_eq!(dispatcher.clear_old_logs(), 0);
    assert_eq!(dispatcher.export_error_logs().len(), 1);
}

#[test]
fn test_huge_rate_limit_cooldown_does_not_overflow() {
    let config = RecoveryConfig {
        rate_limit_cooldown_secs: u64::MAX,
        ..Default::default()
    };
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    let dispatcher = RecoveryDispatcher::new(registry.clone(), config);

    let record = dispatcher.handle_error("a", "429 Too Many Requests", None);

    assert_eq!(
        record.outcome,
        RecoveryOutcome::Switched {
            from: "a".to_string(),
            to: "b".to_string(),
        }
    );
    assert!(registry.is_cooling_down("a"));
}

#[test]
fn test_oldest_records_evicted_beyond_capacity() {
    let config = RecoveryConfig {
        max_records: 2,
        ..Default::default()
    };
    let dispatcher = RecoveryDispatcher::new(registry_with(&[("a", 1)]), config);
    let oldest = record_at("a", ErrorCategory::Network, chrono::Duration::hours(3));
    let middle = record_at("a", ErrorCategory::Model, chrono::Duration::hours(2));
    let newest = record_at("a", ErrorCategory::Auth, chrono::Duration::hours(1));

    dispatcher.import_error_logs(vec![oldest.clone(), middle.clone(), newest.clone()]);

    assert_eq!(dispatcher.export_error_logs(), vec![middle, newest]);
    assert!(dispatcher.get_error(oldest.id).is_none());
}

#[test]
fn test_custom_patterns_and_strategies() {
    let registry = registry_with(&[("a", 1), ("b", 2)]);
    registry.set_current("a").unwrap();
    let dispatcher = RecoveryDispatcher::new(registry.clone(), RecoveryConfig::default());

    assert_eq!(dispatcher.classify("engine overloaded").0, ErrorCategory::Unknown);
    dispatcher
        .register_pattern(ErrorCategory::Service, r"overloaded")
        .unwrap();
    assert_eq!(dispatcher.classify("Engine OVERLOADED").0, ErrorCategory::Service);
    assert!(dispatcher.register_pattern(ErrorCategory::Service, r"(unclosed").is_err());

    dispatcher.register_strategy(
        ErrorCategory::Service,
        RecoveryStrategy::new(RecoveryAction::None, "Ignored", "Nothing to do"),
    );
    let record = dispatcher.handle_error("a", "engine overloaded", None);
    assert_eq!(record.outcome, RecoveryOutcome::NoAction);
    assert_eq!(registry.current_provider().as_deref(), Some("a"));
}

#[test]
fn test_error_logs_survive_json_export() {
    let dispatcher = RecoveryDispatcher::new(registry_with(&[("a", 1)]), RecoveryConfig::default());
    dispatcher.handle_error("a", "connection timeout", Some(ErrorContext::for_request("r1")));
    dispatcher.handle_error("a", "invalid api key", None);

    let json = serde_json::to_string(&dispatcher.export_error_logs()).unwrap();
    let records: Vec<ErrorRecord> = serde_json::from_str(&json).unwrap();

    let restored = RecoveryDispatcher::new(registry_with(&[("a", 1)]), RecoveryConfig::default());
    assert_eq!(restored.import_error_logs(records), 2);
    assert_eq!(restored.export_error_logs(), dispatcher.export_error_logs());
}

#[test]
fn test_user_facing_text() {
    let dispatcher = RecoveryDispatcher::new(registry_with(&[]), RecoveryConfig::default());
    assert!(
        dispatcher
            .user_friendly_message(ErrorCategory::Auth)
            .contains("API key")
    );
    assert_eq!(dispatcher.suggestions(ErrorCategory::RateLimit).len(), 3);
    assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
}
