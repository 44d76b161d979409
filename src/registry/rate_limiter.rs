use crate::registry::types::RateLimitPolicy;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Sliding-window request limiter for a single provider.
///
/// Keeps the timestamps of requests from the last 24 hours and counts them
/// against the minute, hour and day windows of the policy. Entries older than
/// a day are dropped whenever a new request is recorded.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    policy: RateLimitPolicy,
    requests: VecDeque<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub last_minute: u32,
    pub last_hour: u32,
    pub last_day: u32,
}

impl SlidingWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            requests: VecDeque::new(),
        }
    }

    pub fn set_policy(&mut self, policy: RateLimitPolicy) {
        self.policy = policy;
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.prune(at);
        self.requests.push_back(at);
    }

    pub fn usage(&self, now: DateTime<Utc>) -> WindowUsage {
        let minute_ago = now - Duration::minutes(1);
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::days(1);

        let mut usage = WindowUsage {
            last_minute: 0,
            last_hour: 0,
            last_day: 0,
        };
        for at in self.requests.iter().rev() {
            if *at <= day_ago {
                break;
            }
            usage.last_day += 1;
            if *at > hour_ago {
                usage.last_hour += 1;
                if *at > minute_ago {
                    usage.last_minute += 1;
                }
            }
        }
        usage
    }

    /// Whether another request right now would exceed any window.
    pub fn is_limited(&self, now: DateTime<Utc>) -> bool {
        let usage = self.usage(now);
        usage.last_minute >= self.policy.requests_per_minute
            || usage.last_hour >= self.policy.requests_per_hour
            || usage.last_day >= self.policy.requests_per_day
    }

    /// Earliest instant at which the limiter stops reporting `is_limited`.
    pub fn reset_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_limited(now) {
            return None;
        }
        let usage = self.usage(now);
        let mut reset = now;
        let windows = [
            (usage.last_minute, self.policy.requests_per_minute, Duration::minutes(1)),
            (usage.last_hour, self.policy.requests_per_hour, Duration::hours(1)),
            (usage.last_day, self.policy.requests_per_day, Duration::days(1)),
        ];
        for (count, limit, window) in windows {
            if count >= limit {
                // The window frees up once enough of its oldest entries age out.
                let excess = (count - limit) as usize;
                let idx = self.requests.len() - count as usize + excess;
                if let Some(at) = self.requests.get(idx) {
                    reset = reset.max(*at + window);
                }
            }
        }
        Some(reset)
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let day_ago = now - Duration::days(1);
        while let Some(front) = self.requests.front() {
            if *front <= day_ago {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}
