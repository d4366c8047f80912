//! Route‑scoped sliding window rate limiting.
//!
//! Each route owns one [`SlidingWindowLimiter`] keyed by client identity.
//! A client's entry is the ordered list of admission instants that still fall
//! inside the trailing window. Client entries live in an `scc::HashMap`, so
//! checks for different clients only contend when they hash to the same
//! bucket, while checks for one client are serialised by that bucket's lock.
use std::{
    collections::VecDeque,
    num::NonZeroU32,
    time::{Duration, Instant},
};

use scc::HashMap;

use crate::config::RouteConfig;

/// Quota for one route: `requests_per_window` admissions per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitQuota {
    pub requests_per_window: NonZeroU32,
    pub window: Duration,
}

impl RateLimitQuota {
    /// Build a quota, rejecting a zero request count or an empty window.
    pub fn new(requests_per_window: u32, window: Duration) -> Result<Self, String> {
        let requests_per_window = NonZeroU32::new(requests_per_window)
            .ok_or_else(|| "Rate limit 'requests' must be greater than 0".to_string())?;
        if window.is_zero() {
            return Err("Rate limit window must be greater than 0".to_string());
        }
        Ok(Self {
            requests_per_window,
            window,
        })
    }

    pub fn for_route(route: &RouteConfig) -> Result<Self, String> {
        Self::new(route.rate_limit_requests, route.rate_limit_window())
    }
}

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    quota: RateLimitQuota,
    clients: HashMap<String, VecDeque<Instant>>,
}

fn prune(window: Duration, timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

impl SlidingWindowLimiter {
    pub fn new(quota: RateLimitQuota) -> Self {
        tracing::debug!(
            requests = quota.requests_per_window.get(),
            window = ?quota.window,
            "Creating sliding window rate limiter"
        );
        Self {
            quota,
            clients: HashMap::new(),
        }
    }

    pub fn quota(&self) -> RateLimitQuota {
        self.quota
    }

    /// Admit or deny one request from `client_id`.
    pub fn is_allowed(&self, client_id: &str) -> bool {
        self.is_allowed_at(client_id, Instant::now())
    }

    /// Same as [`SlidingWindowLimiter::is_allowed`] with an explicit clock reading.
    ///
    /// Stale instants are pruned first; a denied request is not recorded.
    pub fn is_allowed_at(&self, client_id: &str, now: Instant) -> bool {
        let limit = self.quota.requests_per_window.get() as usize;
        let mut entry = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(VecDeque::new);
        let timestamps = entry.get_mut();
        prune(self.quota.window, timestamps, now);
        if timestamps.len() < limit {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Requests still counted against `client_id` at `now`.
    pub fn current_usage_at(&self, client_id: &str, now: Instant) -> usize {
        let window = self.quota.window;
        self.clients
            .read(client_id, |_, timestamps| {
                timestamps
                    .iter()
                    .filter(|ts| now.saturating_duration_since(**ts) < window)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Drop every client whose window is empty. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.quota.window;
        let before = self.clients.len();
        self.clients.retain(|_, timestamps| {
            prune(window, timestamps, now);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.clients.len())
    }
}
