//! Configuration data structures for Tollgate.
//!
//! These types map directly to JSON (also YAML / TOML) configuration files. They are
//! serde‑friendly and carry defaults so that minimal configs remain concise. The same
//! shapes are what the registry consumes at startup and on reconfiguration.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_count() -> u32 {
    3
}

fn default_circuit_breaker_threshold() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_requests() -> u32 {
    1000
}

fn default_rate_limit_window_seconds() -> u64 {
    60
}

fn default_weight() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    1000
}

fn default_health_check_interval_seconds() -> u64 {
    30
}

/// A `(method, path)` endpoint definition routed to a backend service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteConfig {
    pub path: String,
    pub method: String,
    pub backend_service: String,
    pub backend_port: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Failure ratio above which the backend's breaker opens.
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: f64,
    #[serde(default = "default_true")]
    pub authentication_required: bool,
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl RouteConfig {
    /// Create a route with default policy values.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        backend_service: impl Into<String>,
        backend_port: u16,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            backend_service: backend_service.into(),
            backend_port,
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            authentication_required: true,
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_seconds(),
            enabled: true,
            tags: HashMap::new(),
        }
    }

    /// Unique key of the route, `"{METHOD}:{path}"`.
    pub fn route_key(&self) -> String {
        route_key(&self.method, &self.path)
    }

    /// Sliding window length for the route's limiter.
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    pub fn with_rate_limit(mut self, requests: u32, window_seconds: u64) -> Self {
        self.rate_limit_requests = requests;
        self.rate_limit_window_seconds = window_seconds;
        self
    }

    pub fn with_circuit_breaker_threshold(mut self, threshold: f64) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    pub fn with_authentication(mut self, required: bool) -> Self {
        self.authentication_required = required;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Build the lookup key used for a method and path pair.
pub fn route_key(method: &str, path: &str) -> String {
    format!("{}:{}", method.to_ascii_uppercase(), path)
}

/// Instance selection strategy for a service.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[default]
    RoundRobin,
    LeastConnections,
    Weighted,
}

impl std::fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadBalanceStrategy::RoundRobin => write!(f, "round_robin"),
            LoadBalanceStrategy::LeastConnections => write!(f, "least_connections"),
            LoadBalanceStrategy::Weighted => write!(f, "weighted"),
        }
    }
}

/// One backend endpoint as described in configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,
}

impl InstanceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            weight: default_weight(),
            max_connections: default_max_connections(),
            health_check_interval_seconds: default_health_check_interval_seconds(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// A named backend and its instances.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub strategy: LoadBalanceStrategy,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// Gateway‑wide circuit breaker parameters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Cool‑down before an open breaker lets a probe through, parsed by humantime.
    pub timeout: String,
    /// Threshold used until a route targeting the service supplies its own.
    pub default_threshold: f64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            timeout: "60s".to_string(),
            default_threshold: default_circuit_breaker_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HealthSettings {
    /// Consecutive failed outcomes that flip an instance to unhealthy.
    pub unhealthy_threshold: u32,
    /// How often the health monitor probes every instance, parsed by humantime.
    pub probe_interval: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 3,
            probe_interval: "30s".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitSettings {
    pub cleanup_interval_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 300,
        }
    }
}

impl RateLimitSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

/// Root configuration document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl Default for GatewayConfig {
    /// A single unauthenticated health‑check route and no services.
    fn default() -> Self {
        Self {
            routes: vec![
                RouteConfig::new("GET", "/api/v1/health", "health-check", 8080)
                    .with_authentication(false),
            ],
            services: Vec::new(),
            circuit_breaker: CircuitBreakerSettings::default(),
            health: HealthSettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}
