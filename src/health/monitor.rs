use crate::health::probe::{HealthProbe, HttpProbe};
use crate::health::types::*;
use crate::recovery::ErrorCategory;
use crate::registry::{HealthState, ProviderConfig, ProviderRegistry, StatusCounts};
use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically probes every enabled provider and feeds the results into the
/// registry.
///
/// Cloning is cheap; all clones share the same state and background task.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    registry: Arc<ProviderRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: RwLock<HealthConfig>,
    last_results: RwLock<HashMap<String, HealthCheckResult>>,
    task: Mutex<Option<MonitorTask>>,
}

struct MonitorTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &*self.inner.config.read())
            .field("running", &self.is_running())
            .finish()
    }
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: HealthConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                registry,
                probe,
                config: RwLock::new(config),
                last_results: RwLock::new(HashMap::new()),
                task: Mutex::new(None),
            }),
        }
    }

    /// Monitor that probes over HTTP with [`HttpProbe`].
    pub fn with_http(
        registry: Arc<ProviderRegistry>,
        config: HealthConfig,
    ) -> Result<Self, HealthError> {
        Ok(Self::new(registry, Arc::new(HttpProbe::new()?), config))
    }

    /// Start the background loop: one pass right away, then one per interval.
    ///
    /// Must be called from within a Tokio runtime. Starting a running monitor
    /// does nothing.
    pub fn start(&self) {
        let mut task = self.inner.task.lock();
        if task.is_some() {
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let interval = self.inner.config.read().interval();
        let monitor = self.clone();
        let handle = tokio::spawn(async move { monitor.run_loop(stop_rx, interval).await });
        *task = Some(MonitorTask { stop, handle });

        info!("Health monitoring started (interval {:?})", interval);
    }

    /// Prevent any further probe pass from starting. A pass already in flight
    /// runs to completion. Stopping an idle monitor does nothing.
    pub fn stop(&self) {
        if let Some(task) = self.inner.task.lock().take() {
            let _ = task.stop.send(true);
            info!("Health monitoring stopped");
        }
    }

    /// Like [`stop`](Self::stop), but also wait for the loop to exit.
    pub async fn shutdown(&self) {
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.stop.send(true);
            if let Err(e) = task.handle.await {
                warn!("Health monitor task ended abnormally: {}", e);
            }
            info!("Health monitoring stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.task.lock().is_some()
    }

    pub fn config(&self) -> HealthConfig {
        self.inner.config.read().clone()
    }

    /// Replace the configuration. Timeouts, thresholds and endpoints apply
    /// from the next pass; a new interval applies from the next `start`.
    pub fn update_config(&self, config: HealthConfig) {
        *self.inner.config.write() = config;
    }

    async fn run_loop(self, mut stop: watch::Receiver<bool>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    self.run_probe_pass().await;
                }
            }
        }
        debug!("Health monitor loop exited");
    }

    /// Probe every enabled provider concurrently and record the results.
    pub async fn run_probe_pass(&self) -> Vec<HealthCheckResult> {
        let providers = self.inner.registry.enabled_providers();
        debug!("Running health check pass over {} providers", providers.len());
        self.inner
            .last_results
            .write()
            .retain(|name, _| providers.iter().any(|p| &p.name == name));

        let checks = providers.iter().map(|provider| self.check_and_record(provider));
        join_all(checks).await
    }

    /// Check one provider right away, whether or not the loop is running.
    pub async fn force_check(&self, name: &str) -> Result<HealthCheckResult, HealthError> {
        let provider = self
            .inner
            .registry
            .get_provider(name)
            .ok_or_else(|| HealthError::UnknownProvider(name.to_string()))?;
        Ok(self.check_and_record(&provider).await)
    }

    async fn check_and_record(&self, provider: &ProviderConfig) -> HealthCheckResult {
        let result = self.check_provider(provider).await;

        match result.state {
            HealthState::Healthy => debug!(
                "Health check for {}: {} ({:?})",
                provider.name, result.state, result.response_time
            ),
            _ => warn!(
                "Health check for {}: {} ({})",
                provider.name,
                result.state,
                result.error.as_deref().unwrap_or("no error")
            ),
        }

        // A provider removed while its check was in flight is not recorded.
        if self
            .inner
            .registry
            .update_status(&provider.name, result.to_status_update())
            .is_some()
        {
            self.inner
                .last_results
                .write()
                .insert(provider.name.clone(), result.clone());
        }
        result
    }

    async fn check_provider(&self, provider: &ProviderConfig) -> HealthCheckResult {
        let config = self.config();
        let endpoints = probe_endpoints(&config, provider);

        let Some(credential) = provider.credential.resolve() else {
            return HealthCheckResult::down(
                &provider.name,
                format!("Missing credential for provider {}", provider.name),
                HealthDetails {
                    error_category: Some(ErrorCategory::Auth),
                    ..Default::default()
                },
            );
        };

        let timeout = config.timeout();
        let attempts = endpoints.iter().map(|endpoint| {
            let credential = credential.as_str();
            async move {
                let outcome = tokio::time::timeout(
                    timeout,
                    self.inner.probe.probe(endpoint, credential, timeout),
                )
                .await
                .unwrap_or(ProbeOutcome::Failed {
                    error: "Request timeout".to_string(),
                    latency: timeout,
                });
                (endpoint.as_str(), outcome)
            }
        });
        let outcomes = join_all(attempts).await;

        evaluate(&provider.name, outcomes, config.degraded_latency())
    }

    pub fn provider_health(&self, name: &str) -> Option<HealthCheckResult> {
        if !self.inner.registry.contains(name) {
            return None;
        }
        self.inner.last_results.read().get(name).cloned()
    }

    /// Latest result of every enabled provider, by name.
    pub fn last_results(&self) -> Vec<HealthCheckResult> {
        let enabled: HashSet<String> = self
            .inner
            .registry
            .enabled_providers()
            .into_iter()
            .map(|p| p.name)
            .collect();
        let mut results: Vec<HealthCheckResult> = self
            .inner
            .last_results
            .read()
            .values()
            .filter(|r| enabled.contains(&r.provider))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.provider.cmp(&b.provider));
        results
    }

    /// Counts by state and mean latency over the latest result per provider.
    pub fn system_health(&self) -> HealthSummary {
        let results = self.last_results();
        let mut counts = StatusCounts::default();
        for result in &results {
            counts.add(result.state);
        }
        let average_response_time = if results.is_empty() {
            Duration::ZERO
        } else {
            results.iter().map(|r| r.response_time).sum::<Duration>() / results.len() as u32
        };
        HealthSummary {
            counts,
            average_response_time,
        }
    }

    /// At least one healthy provider and none down.
    pub fn is_system_healthy(&self) -> bool {
        let summary = self.system_health();
        summary.counts.healthy > 0 && summary.counts.down == 0
    }

    pub fn providers_needing_attention(&self) -> Vec<HealthCheckResult> {
        self.last_results()
            .into_iter()
            .filter(|r| r.state.needs_attention())
            .collect()
    }
}

fn probe_endpoints(config: &HealthConfig, provider: &ProviderConfig) -> Vec<String> {
    match config.endpoints.get(&provider.name) {
        Some(endpoints) if !endpoints.is_empty() => endpoints.clone(),
        _ => vec![format!("{}/models", provider.base_url.trim_end_matches('/'))],
    }
}

/// Fold the endpoint outcomes of one provider into a single result: the
/// fastest endpoint that answered at all decides the state.
fn evaluate(
    provider: &str,
    outcomes: Vec<(&str, ProbeOutcome)>,
    degraded_latency: Duration,
) -> HealthCheckResult {
    let fastest = outcomes
        .iter()
        .filter_map(|(endpoint, outcome)| match outcome {
            ProbeOutcome::Response {
                status_code,
                latency,
            } => Some((*endpoint, *status_code, *latency)),
            ProbeOutcome::Failed { .. } => None,
        })
        .min_by_key(|(_, _, latency)| *latency);

    let Some((endpoint, status_code, latency)) = fastest else {
        let (endpoint, error) = outcomes
            .iter()
            .rev()
            .find_map(|(endpoint, outcome)| match outcome {
                ProbeOutcome::Failed { error, .. } => Some((Some(endpoint.to_string()), error.clone())),
                ProbeOutcome::Response { .. } => None,
            })
            .unwrap_or((None, "No health check endpoints configured".to_string()));
        return HealthCheckResult::down(
            provider,
            error,
            HealthDetails {
                endpoint,
                status_code: None,
                error_category: Some(ErrorCategory::Network),
            },
        );
    };

    let (state, available, error) = match status_code {
        200..=299 if latency > degraded_latency => (
            HealthState::Degraded,
            true,
            Some(format!("Slow response: {} ms", latency.as_millis())),
        ),
        200..=299 => (HealthState::Healthy, true, None),
        400..=499 => (
            HealthState::Degraded,
            false,
            Some(format!("HTTP {}", status_code)),
        ),
        _ => (
            HealthState::Down,
            false,
            Some(format!("HTTP {}", status_code)),
        ),
    };
    let error_category = (!(200..=299).contains(&status_code))
        .then(|| ErrorCategory::from_status_code(status_code));

    HealthCheckResult {
        provider: provider.to_string(),
        state,
        response_time: latency,
        error,
        available,
        last_check: Utc::now(),
        details: HealthDetails {
            endpoint: Some(endpoint.to_string()),
            status_code: Some(status_code),
            error_category,
        },
    }
}
