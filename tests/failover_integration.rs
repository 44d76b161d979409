use async_trait::async_trait;
use llm_switchboard::health::{HealthConfig, HealthProbe, ProbeOutcome};
use llm_switchboard::recovery::{ErrorCategory, RecoveryAction, RecoveryConfig, RecoveryOutcome};
use llm_switchboard::{Credential, HealthState, ProviderConfig, Switchboard, SwitchboardConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Answers every probe with the status code currently set for its host.
#[derive(Default)]
struct SwitchableProbe {
    status_by_host: Mutex<HashMap<String, u16>>,
}

impl SwitchableProbe {
    fn set(&self, provider: &str, status_code: u16) {
        self.status_by_host
            .lock()
            .insert(format!("{provider}.example.com"), status_code);
    }
}

#[async_trait]
impl HealthProbe for SwitchableProbe {
    async fn probe(&self, endpoint: &str, _credential: &str, _timeout: Duration) -> ProbeOutcome {
        let host = url::Url::parse(endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        match self.status_by_host.lock().get(&host) {
            Some(status_code) => ProbeOutcome::Response {
                status_code: *status_code,
                latency: Duration::from_millis(50),
            },
            None => ProbeOutcome::Failed {
                error: "Network error: connection failed".to_string(),
                latency: Duration::from_millis(1),
            },
        }
    }
}

fn provider(name: &str, priority: u32) -> ProviderConfig {
    ProviderConfig::new(
        name,
        Credential::inline("sk-test"),
        format!("https://{name}.example.com/v1"),
        vec!["chat".to_string()],
        priority,
    )
}

fn switchboard(providers: Vec<ProviderConfig>) -> (Switchboard, Arc<SwitchableProbe>) {
    let probe = Arc::new(SwitchableProbe::default());
    let config = SwitchboardConfig {
        providers,
        health: HealthConfig::default(),
        recovery: RecoveryConfig::default(),
    };
    let switchboard = Switchboard::with_probe(config, probe.clone());
    (switchboard, probe)
}

#[tokio::test]
async fn test_service_outage_moves_current_to_next_provider() {
    let (switchboard, probe) = switchboard(vec![provider("a", 1), provider("b", 2)]);
    probe.set("a", 200);
    probe.set("b", 200);
    switchboard.monitor().run_probe_pass().await;

    let best = switchboard.select_best().unwrap();
    assert_eq!(best, "a");
    switchboard.set_current(&best).unwrap();

    let record = switchboard.handle_error("a", "503 Service Unavailable", None);

    assert_eq!(record.category, ErrorCategory::Service);
    assert_eq!(record.strategy.action, RecoveryAction::SwitchProvider);
    assert_eq!(switchboard.current_provider().as_deref(), Some("b"));
    // Selection is stateless: a is still preferred until its status changes
    assert_eq!(switchboard.select_best().as_deref(), Some("a"));
    assert_eq!(switchboard.current_provider().as_deref(), Some("b"));

    let stats = switchboard.error_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.unresolved, 1);
}

#[tokio::test]
async fn test_all_providers_unhealthy() {
    let (switchboard, probe) = switchboard(vec![provider("a", 1), provider("b", 2)]);
    probe.set("a", 503);
    // b does not answer at all

    switchboard.monitor().run_probe_pass().await;

    assert_eq!(switchboard.select_best(), None);
    assert_eq!(switchboard.registry().rotate_to_next(), None);
    assert_eq!(switchboard.current_provider(), None);

    let record = switchboard.handle_error("a", "Internal Server Error", None);
    assert_eq!(record.outcome, RecoveryOutcome::NoProviderAvailable);

    let status = switchboard.status();
    assert_eq!(status.counts.down, 2);
    assert!(!status.is_healthy);
}

#[tokio::test]
async fn test_probe_results_drive_selection() {
    let (switchboard, probe) = switchboard(vec![provider("a", 1), provider("b", 2)]);
    probe.set("a", 200);
    probe.set("b", 200);
    switchboard.monitor().run_probe_pass().await;
    assert_eq!(switchboard.select_best().as_deref(), Some("a"));

    probe.set("a", 500);
    switchboard.monitor().run_probe_pass().await;
    assert_eq!(
        switchboard.provider_status("a").unwrap().state,
        HealthState::Down
    );
    assert_eq!(switchboard.select_best().as_deref(), Some("b"));

    probe.set("a", 200);
    switchboard.monitor().run_probe_pass().await;
    assert_eq!(switchboard.select_best().as_deref(), Some("a"));
}

#[tokio::test]
async fn test_rate_limited_provider_sits_out_cooldown() {
    let (switchboard, probe) = switchboard(vec![provider("a", 1), provider("b", 2)]);
    probe.set("a", 200);
    probe.set("b", 200);
    switchboard.monitor().run_probe_pass().await;
    switchboard.set_current("a").unwrap();

    let record = switchboard.handle_error("a", "429 Too Many Requests", None);

    assert_eq!(record.category, ErrorCategory::RateLimit);
    assert!(!record.retryable);
    assert_eq!(switchboard.current_provider().as_deref(), Some("b"));
    // Probes keep reporting a as healthy, but the cool-down keeps it out
    switchboard.monitor().run_probe_pass().await;
    assert_eq!(switchboard.select_best().as_deref(), Some("b"));
}

#[tokio::test]
async fn test_invalid_providers_are_skipped_at_startup() {
    let mut broken = provider("broken", 3);
    broken.models.clear();
    let (switchboard, _) = switchboard(vec![provider("a", 1), broken, provider("", 2)]);

    let names: Vec<String> = switchboard
        .registry()
        .providers()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["a".to_string()]);
}

#[tokio::test]
async fn test_background_monitor_updates_registry() {
    let probe = Arc::new(SwitchableProbe::default());
    probe.set("a", 200);
    let config = SwitchboardConfig {
        providers: vec![provider("a", 1)],
        health: HealthConfig {
            interval_ms: 20,
            ..Default::default()
        },
        recovery: RecoveryConfig::default(),
    };
    let switchboard = Switchboard::with_probe(config, probe.clone());
    let mut events = switchboard.registry().subscribe();

    switchboard.start();
    assert!(switchboard.status().monitoring);

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(llm_switchboard::RegistryEvent::StatusUpdated { status }) =
                events.recv().await
            {
                return status;
            }
        }
    })
    .await
    .expect("no status update within 2s");
    assert_eq!(event.name, "a");
    assert_eq!(event.state, HealthState::Healthy);

    switchboard.shutdown().await;
    assert!(!switchboard.status().monitoring);
}
