use crate::registry::events::{EventBus, RegistryEvent};
use crate::registry::rate_limiter::{SlidingWindowLimiter, WindowUsage};
use crate::registry::types::*;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Owns every configured provider together with its live status and usage.
///
/// All mutations go through the methods below, each of which holds the single
/// state lock for its whole duration. Readers therefore always observe a
/// provider's config, status and usage as one consistent record. Selection
/// methods take only the read lock and never perform I/O.
#[derive(Debug)]
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    events: EventBus,
}

#[derive(Debug, Default)]
struct RegistryState {
    providers: HashMap<String, ProviderConfig>,
    statuses: HashMap<String, ProviderStatus>,
    usage: HashMap<String, ProviderUsage>,
    limiters: HashMap<String, SlidingWindowLimiter>,
    cooldowns: HashMap<String, DateTime<Utc>>,
    current: Option<String>,
    fallback_order: Vec<String>,
}

impl RegistryState {
    /// Enabled providers sorted by priority, then name.
    fn priority_order(&self) -> Vec<&ProviderConfig> {
        let mut enabled: Vec<&ProviderConfig> =
            self.providers.values().filter(|p| p.enabled).collect();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        enabled
    }

    fn recompute_fallback_order(&mut self) {
        let order: Vec<String> = self
            .priority_order()
            .into_iter()
            .filter(|p| Some(&p.name) != self.current.as_ref())
            .map(|p| p.name.clone())
            .collect();
        self.fallback_order = order;
    }

    fn is_cooling_down(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.cooldowns.get(name).is_some_and(|until| *until > now)
    }

    fn is_rate_limited(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.limiters
            .get(name)
            .is_some_and(|limiter| limiter.is_limited(now))
    }

    /// Enabled, healthy, available, not cooling down and within its rate limits.
    fn is_eligible(&self, name: &str, now: DateTime<Utc>) -> bool {
        let enabled = self.providers.get(name).is_some_and(|p| p.enabled);
        let selectable = self
            .statuses
            .get(name)
            .is_some_and(|s| s.is_selectable());
        enabled && selectable && !self.is_cooling_down(name, now) && !self.is_rate_limited(name, now)
    }

    fn set_current(&mut self, name: &str) -> bool {
        match self.providers.get(name) {
            Some(provider) if provider.enabled => {
                self.current = Some(name.to_string());
                self.recompute_fallback_order();
                true
            }
            _ => false,
        }
    }
}

fn compare_by_preference(a: &ProviderConfig, b: &ProviderConfig) -> Ordering {
    let a_rate = a.stats.success_rate.unwrap_or(0.0);
    let b_rate = b.stats.success_rate.unwrap_or(0.0);
    a.priority
        .cmp(&b.priority)
        .then_with(|| b_rate.partial_cmp(&a_rate).unwrap_or(Ordering::Equal))
        .then_with(|| a.name.cmp(&b.name))
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            events: EventBus::new(),
        }
    }

    /// Receive a copy of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Validate and insert (or overwrite) a provider.
    ///
    /// The provider starts with an `unknown`, unavailable status and zeroed
    /// usage. An invalid config leaves the registry untouched.
    pub fn register(&self, config: ProviderConfig) -> Result<(), RegistryError> {
        config
            .validate()
            .map_err(|reason| RegistryError::InvalidConfig {
                name: config.name.clone(),
                reason,
            })?;

        let name = config.name.clone();
        {
            let mut state = self.state.write();
            state.statuses.insert(name.clone(), ProviderStatus::unknown(&name));
            state.usage.insert(
                name.clone(),
                ProviderUsage {
                    provider: name.clone(),
                    ..Default::default()
                },
            );
            state
                .limiters
                .insert(name.clone(), SlidingWindowLimiter::new(config.rate_limits));
            state.cooldowns.remove(&name);
            state.providers.insert(name.clone(), config);
            state.recompute_fallback_order();
        }

        info!("Registered provider {}", name);
        self.events.publish(RegistryEvent::Registered { name });
        Ok(())
    }

    /// Remove a provider and everything tracked for it.
    pub fn remove(&self, name: &str) -> bool {
        {
            let mut state = self.state.write();
            if state.providers.remove(name).is_none() {
                return false;
            }
            state.statuses.remove(name);
            state.usage.remove(name);
            state.limiters.remove(name);
            state.cooldowns.remove(name);
            if state.current.as_deref() == Some(name) {
                state.current = None;
            }
            state.recompute_fallback_order();
        }

        info!("Removed provider {}", name);
        self.events.publish(RegistryEvent::Removed {
            name: name.to_string(),
        });
        true
    }

    /// Apply `edit` to a copy of the provider's config and store it if it
    /// still validates. Status and usage are kept.
    pub fn update_config<F>(&self, name: &str, edit: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut ProviderConfig),
    {
        {
            let mut state = self.state.write();
            let mut updated = state
                .providers
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))?;
            edit(&mut updated);
            // Renaming would break the name-keyed relationships.
            updated.name = name.to_string();
            updated
                .validate()
                .map_err(|reason| RegistryError::InvalidConfig {
                    name: name.to_string(),
                    reason,
                })?;

            if let Some(limiter) = state.limiters.get_mut(name) {
                limiter.set_policy(updated.rate_limits);
            }
            state.providers.insert(name.to_string(), updated);
            state.recompute_fallback_order();
        }

        debug!("Updated configuration of provider {}", name);
        self.events.publish(RegistryEvent::Updated {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Toggle a provider's eligibility. Unknown names are ignored.
    ///
    /// Disabling the current provider clears the current selection.
    pub fn set_enabled(&self, name: &str, enabled: bool) {
        {
            let mut state = self.state.write();
            match state.providers.get_mut(name) {
                Some(provider) => provider.enabled = enabled,
                None => return,
            }
            if !enabled && state.current.as_deref() == Some(name) {
                state.current = None;
            }
            state.recompute_fallback_order();
        }

        info!(
            "Provider {} {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        self.events.publish(RegistryEvent::Toggled {
            name: name.to_string(),
            enabled,
        });
    }

    pub fn get_provider(&self, name: &str) -> Option<ProviderConfig> {
        self.state.read().providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().providers.contains_key(name)
    }

    /// All providers, ordered by priority then name.
    pub fn providers(&self) -> Vec<ProviderConfig> {
        let state = self.state.read();
        let mut providers: Vec<ProviderConfig> = state.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        providers
    }

    pub fn enabled_providers(&self) -> Vec<ProviderConfig> {
        let state = self.state.read();
        state.priority_order().into_iter().cloned().collect()
    }

    pub fn provider_status(&self, name: &str) -> Option<ProviderStatus> {
        self.state.read().statuses.get(name).cloned()
    }

    pub fn all_statuses(&self) -> Vec<ProviderStatus> {
        let state = self.state.read();
        let mut statuses: Vec<ProviderStatus> = state.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Merge `update` into the provider's status and stamp the check time.
    ///
    /// A provider that is `down` or `unknown` is never left available,
    /// whatever the update says. Returns the merged status, or `None` for an
    /// unknown provider.
    pub fn update_status(&self, name: &str, update: StatusUpdate) -> Option<ProviderStatus> {
        let (previous, merged) = {
            let mut state = self.state.write();
            let status = state.statuses.get_mut(name)?;
            let previous = status.state;

            if let Some(new_state) = update.state {
                status.state = new_state;
            }
            if let Some(response_time) = update.response_time {
                status.response_time = response_time;
            }
            if let Some(error) = update.error {
                status.error = error;
            }
            if let Some(available) = update.available {
                status.available = available;
            }
            if matches!(status.state, HealthState::Down | HealthState::Unknown) {
                status.available = false;
            }
            status.last_check = Utc::now();
            (previous, status.clone())
        };

        if previous != merged.state {
            info!(
                "Provider {} status changed: {} -> {}",
                name, previous, merged.state
            );
        } else {
            debug!("Provider {} status refreshed: {}", name, merged.state);
        }
        self.events.publish(RegistryEvent::StatusUpdated {
            status: merged.clone(),
        });
        Some(merged)
    }

    /// Count one completed call against the provider.
    pub fn record_usage(&self, name: &str, tokens: u64, cost: f64, success: bool) {
        let usage = {
            let mut state = self.state.write();
            let now = Utc::now();

            let Some(provider) = state.providers.get_mut(name) else {
                warn!("Ignoring usage for unknown provider {}", name);
                return;
            };
            let stats = &mut provider.stats;
            stats.total_requests += 1;
            if !success {
                stats.failed_requests += 1;
            }
            stats.success_rate = Some(
                (stats.total_requests - stats.failed_requests) as f64
                    / stats.total_requests as f64
                    * 100.0,
            );
            stats.last_used = Some(now);

            if let Some(limiter) = state.limiters.get_mut(name) {
                limiter.record(now);
            }

            let usage = state.usage.entry(name.to_string()).or_insert_with(|| ProviderUsage {
                provider: name.to_string(),
                ..Default::default()
            });
            usage.requests += 1;
            usage.tokens += tokens;
            usage.cost += cost;
            if !success {
                usage.errors += 1;
            }
            usage.last_used = Some(now);
            usage.clone()
        };

        self.events.publish(RegistryEvent::UsageUpdated { usage });
    }

    /// Fold one observed call latency into the provider's rolling average.
    pub fn record_response_time(&self, name: &str, latency: Duration) {
        let mut state = self.state.write();
        if let Some(provider) = state.providers.get_mut(name) {
            let stats = &mut provider.stats;
            let sample = latency.as_secs_f64() * 1000.0;
            let previous = stats.average_response_time_ms.unwrap_or(0.0);
            stats.response_samples += 1;
            stats.average_response_time_ms =
                Some(previous + (sample - previous) / stats.response_samples as f64);
        }
    }

    pub fn usage(&self, name: &str) -> Option<ProviderUsage> {
        self.state.read().usage.get(name).cloned()
    }

    pub fn usage_stats(&self) -> Vec<ProviderUsage> {
        let state = self.state.read();
        let mut usage: Vec<ProviderUsage> = state.usage.values().cloned().collect();
        usage.sort_by(|a, b| a.provider.cmp(&b.provider));
        usage
    }

    pub fn window_usage(&self, name: &str) -> Option<WindowUsage> {
        let state = self.state.read();
        state.limiters.get(name).map(|l| l.usage(Utc::now()))
    }

    /// Whether another request to `name` would exceed one of its rate windows.
    pub fn is_rate_limited(&self, name: &str) -> bool {
        self.state.read().is_rate_limited(name, Utc::now())
    }

    pub fn rate_limit_reset(&self, name: &str) -> Option<DateTime<Utc>> {
        let state = self.state.read();
        state.limiters.get(name)?.reset_time(Utc::now())
    }

    /// Keep `name` out of selection for `duration`.
    pub fn start_cooldown(&self, name: &str, duration: Duration) {
        let mut state = self.state.write();
        if !state.providers.contains_key(name) {
            return;
        }
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        state.cooldowns.insert(name.to_string(), until);
        info!("Provider {} cooling down until {}", name, until);
    }

    pub fn is_cooling_down(&self, name: &str) -> bool {
        self.state.read().is_cooling_down(name, Utc::now())
    }

    /// The preferred provider among those eligible right now.
    ///
    /// Ordered by priority, then success rate (higher first), then name, so
    /// the answer is deterministic for a given state.
    pub fn select_best(&self) -> Option<String> {
        let state = self.state.read();
        let now = Utc::now();
        state
            .providers
            .values()
            .filter(|p| state.is_eligible(&p.name, now))
            .min_by(|a, b| compare_by_preference(a, b))
            .map(|p| p.name.clone())
    }

    /// The preferred enabled provider that is degraded but still available.
    pub fn select_last_resort(&self) -> Option<String> {
        let state = self.state.read();
        state
            .providers
            .values()
            .filter(|p| p.enabled)
            .filter(|p| {
                state
                    .statuses
                    .get(&p.name)
                    .is_some_and(|s| s.available && s.state == HealthState::Degraded)
            })
            .min_by(|a, b| compare_by_preference(a, b))
            .map(|p| p.name.clone())
    }

    pub fn current_provider(&self) -> Option<String> {
        self.state.read().current.clone()
    }

    /// Make `name` the active provider. Fails for unknown or disabled providers.
    pub fn set_current(&self, name: &str) -> Result<(), RegistryError> {
        if !self.state.write().set_current(name) {
            return Err(RegistryError::UnknownProvider(name.to_string()));
        }
        info!("Current provider set to {}", name);
        self.events.publish(RegistryEvent::CurrentChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Enabled providers other than the current one, by priority.
    pub fn fallback_order(&self) -> Vec<String> {
        self.state.read().fallback_order.clone()
    }

    /// Advance the current provider to the next eligible one in priority
    /// order, wrapping around. The current provider is left unchanged when
    /// nothing else qualifies.
    pub fn rotate_to_next(&self) -> Option<String> {
        let next = {
            let mut state = self.state.write();
            let now = Utc::now();
            let order: Vec<String> = state
                .priority_order()
                .into_iter()
                .map(|p| p.name.clone())
                .collect();
            if order.is_empty() {
                return None;
            }

            let current = state.current.clone();
            let start = current
                .as_ref()
                .and_then(|c| order.iter().position(|name| name == c))
                .map(|idx| idx + 1)
                .unwrap_or(0);

            let next = (0..order.len())
                .map(|i| &order[(start + i) % order.len()])
                .filter(|name| Some(*name) != current.as_ref())
                .find(|name| state.is_eligible(name, now))
                .cloned()?;
            state.set_current(&next);
            next
        };

        info!("Rotated current provider to {}", next);
        self.events.publish(RegistryEvent::CurrentChanged { name: next.clone() });
        Some(next)
    }

    /// Move the current provider off `failed` to the first eligible entry of
    /// the fallback order. Returns the new current provider, if any.
    pub fn fail_over(&self, failed: &str) -> Option<String> {
        let next = {
            let mut state = self.state.write();
            let now = Utc::now();
            let next = state
                .fallback_order
                .iter()
                .filter(|name| name.as_str() != failed)
                .find(|name| state.is_eligible(name, now))
                .cloned()?;
            state.set_current(&next);
            next
        };

        info!("Switched from {} to {}", failed, next);
        self.events.publish(RegistryEvent::CurrentChanged { name: next.clone() });
        Some(next)
    }

    /// Provider counts by health state.
    pub fn system_health(&self) -> StatusCounts {
        let state = self.state.read();
        let mut counts = StatusCounts::default();
        for status in state.statuses.values() {
            counts.add(status.state);
        }
        counts
    }

    pub fn export_snapshot(&self) -> RegistrySnapshot {
        let providers = self.providers();
        let state = self.state.read();
        RegistrySnapshot {
            providers,
            current: state.current.clone(),
            fallback_order: state.fallback_order.clone(),
        }
    }

    /// Replace the whole registry with the snapshot's providers.
    ///
    /// Every provider is validated first; if any is invalid nothing changes.
    /// Statuses restart at `unknown`.
    pub fn import_snapshot(&self, snapshot: RegistrySnapshot) -> Result<usize, RegistryError> {
        for provider in &snapshot.providers {
            provider
                .validate()
                .map_err(|reason| RegistryError::InvalidConfig {
                    name: provider.name.clone(),
                    reason,
                })?;
        }

        let names: Vec<String> = {
            let mut state = self.state.write();
            *state = RegistryState::default();
            for provider in snapshot.providers {
                let name = provider.name.clone();
                state.statuses.insert(name.clone(), ProviderStatus::unknown(&name));
                state.usage.insert(
                    name.clone(),
                    ProviderUsage {
                        provider: name.clone(),
                        ..Default::default()
                    },
                );
                state
                    .limiters
                    .insert(name.clone(), SlidingWindowLimiter::new(provider.rate_limits));
                state.providers.insert(name, provider);
            }
            if let Some(current) = snapshot.current.as_deref() {
                state.set_current(current);
            }
            state.recompute_fallback_order();
            let mut names: Vec<String> = state.providers.keys().cloned().collect();
            names.sort();
            names
        };

        info!("Imported {} providers", names.len());
        for name in &names {
            self.events.publish(RegistryEvent::Registered { name: name.clone() });
        }
        Ok(names.len())
    }
}
