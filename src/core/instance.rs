use std::{
    fmt,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{HealthStatus, InstanceConfig};

/// Address of a backend instance within a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceAddr {
    pub host: String,
    pub port: u16,
}

impl InstanceAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for InstanceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One concrete backend endpoint and its runtime health bookkeeping.
///
/// Static attributes come from [`InstanceConfig`]; the health flag, the
/// consecutive failure counter and the in‑flight counter are atomics so the
/// hot path can read and update them without a lock.
#[derive(Debug)]
pub struct ServiceInstance {
    addr: InstanceAddr,
    weight: u32,
    max_connections: u32,
    health_check_interval_seconds: u64,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    active_connections: AtomicU64,
    last_health_check: Mutex<Option<DateTime<Utc>>>,
}

impl ServiceInstance {
    /// Creates a new instance, initially healthy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(&InstanceConfig::new(host, port))
    }

    pub fn from_config(config: &InstanceConfig) -> Self {
        Self {
            addr: InstanceAddr::new(config.host.clone(), config.port),
            weight: config.weight,
            max_connections: config.max_connections,
            health_check_interval_seconds: config.health_check_interval_seconds,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            active_connections: AtomicU64::new(0),
            last_health_check: Mutex::new(None),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn addr(&self) -> &InstanceAddr {
        &self.addr
    }

    pub fn host(&self) -> &str {
        &self.addr.host
    }

    pub fn port(&self) -> u16 {
        self.addr.port
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn health_check_interval_seconds(&self) -> u64 {
        self.health_check_interval_seconds
    }

    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.addr.host == host && self.addr.port == port
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn status(&self) -> HealthStatus {
        if self.is_healthy() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Set the health flag directly, as a health probe would.
    ///
    /// Marking healthy also clears the consecutive failure counter. Stamps the
    /// last health check time.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
        if healthy {
            self.consecutive_failures.store(0, Ordering::Release);
        }
        *self
            .last_health_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    /// Record a failed call. Returns true when this failure flipped the
    /// instance from healthy to unhealthy.
    pub fn record_failure(&self, unhealthy_threshold: u32) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= unhealthy_threshold {
            return self.healthy.swap(false, Ordering::AcqRel);
        }
        false
    }

    /// Record a successful call. Returns true when the instance was unhealthy
    /// and has been restored.
    pub fn record_success(&self) -> bool {
        self.consecutive_failures.store(0, Ordering::Release);
        !self.healthy.swap(true, Ordering::AcqRel)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Number of calls currently routed to this instance and not yet reported.
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub(crate) fn acquire_connection(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_connection(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self
            .last_health_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.addr, f)
    }
}
