//! Gateway composition root.
//!
//! The `GatewayRegistry` owns every route, service, breaker, limiter and
//! balancer and answers the per‑request question: may this request proceed,
//! and to which instance? It provides:
//! * Route registration keyed by `METHOD:path` (idempotent)
//! * Service instance registration, deregistration and health updates
//! * The `admit_and_route` pipeline: route → rate limit → breaker → balancer
//! * Outcome reporting feeding breakers, instance health and metrics
//! * Derived gateway status and an info snapshot
//!
//! This layer performs no I/O. Each component keeps its own lock and the
//! pipeline takes them one after another, never two at once.
use std::{
    collections::HashSet,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use scc::HashMap;
use serde::Serialize;

use crate::{
    config::{
        GatewayConfig, GatewayConfigValidator, InstanceConfig, LoadBalanceStrategy, RouteConfig,
        ValidationError, ValidationResult,
    },
    core::{
        circuit_breaker::{CircuitBreaker, CircuitState},
        error::{AdmissionError, AdmissionResult},
        instance::ServiceInstance,
        load_balancer::LoadBalancer,
        rate_limiter::{RateLimitQuota, SlidingWindowLimiter},
    },
    metrics::{GatewayMetrics, MetricsSnapshot},
};

/// Runtime parameters shared by every service entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    pub breaker_timeout: Duration,
    pub default_breaker_threshold: f64,
    pub unhealthy_threshold: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            breaker_timeout: Duration::from_secs(60),
            default_breaker_threshold: 0.5,
            unhealthy_threshold: 3,
        }
    }
}

impl RegistrySettings {
    pub fn from_config(config: &GatewayConfig) -> ValidationResult<Self> {
        let breaker_timeout =
            humantime::parse_duration(&config.circuit_breaker.timeout).map_err(|e| {
                ValidationError::InvalidField {
                    field: "circuit_breaker.timeout".to_string(),
                    message: format!("Invalid duration '{}': {e}", config.circuit_breaker.timeout),
                }
            })?;
        Ok(Self {
            breaker_timeout,
            default_breaker_threshold: config.circuit_breaker.default_threshold,
            unhealthy_threshold: config.health.unhealthy_threshold.max(1),
        })
    }
}

/// Overall health derived from the share of healthy instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl GatewayStatus {
    /// Above 75% healthy is healthy, above 50% degraded, anything else unhealthy.
    /// No instances at all counts as healthy.
    pub fn from_counts(healthy: usize, total: usize) -> Self {
        if total == 0 {
            return GatewayStatus::Healthy;
        }
        let ratio = healthy as f64 / total as f64;
        if ratio > 0.75 {
            GatewayStatus::Healthy
        } else if ratio > 0.5 {
            GatewayStatus::Degraded
        } else {
            GatewayStatus::Unhealthy
        }
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Healthy => write!(f, "healthy"),
            GatewayStatus::Degraded => write!(f, "degraded"),
            GatewayStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Serializable gateway overview.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayInfo {
    pub status: GatewayStatus,
    pub routes: usize,
    pub services: usize,
    pub metrics: MetricsSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// The instance chosen for an admitted request.
#[derive(Debug, Clone)]
pub struct SelectedInstance {
    pub route_key: String,
    pub service: String,
    pub instance: Arc<ServiceInstance>,
}

/// What the proxy observed for one completed call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub latency_ms: f64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl Outcome {
    pub fn success(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    pub fn failure(latency_ms: f64) -> Self {
        Self {
            success: false,
            ..Self::success(latency_ms)
        }
    }

    pub fn with_bytes(mut self, bytes_in: u64, bytes_out: u64) -> Self {
        self.bytes_in = bytes_in;
        self.bytes_out = bytes_out;
        self
    }
}

/// Everything the registry keeps for one backend service.
struct ServiceEntry {
    instances: RwLock<Vec<Arc<ServiceInstance>>>,
    breaker: CircuitBreaker,
    balancer: ArcSwap<LoadBalancer>,
}

impl ServiceEntry {
    fn new(name: &str, settings: &RegistrySettings) -> Self {
        Self {
            instances: RwLock::new(Vec::new()),
            breaker: CircuitBreaker::new(
                name,
                settings.default_breaker_threshold,
                settings.breaker_timeout,
            ),
            balancer: ArcSwap::from_pointee(LoadBalancer::new(LoadBalanceStrategy::default())),
        }
    }

    fn instances(&self) -> Vec<Arc<ServiceInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, host: &str, port: u16) -> Option<Arc<ServiceInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|instance| instance.matches(host, port))
            .cloned()
    }

    /// Append an instance unless one with the same address exists. The check
    /// and the insert happen under one write lock.
    fn insert_if_absent(&self, config: &InstanceConfig) -> Option<Arc<ServiceInstance>> {
        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if instances
            .iter()
            .any(|instance| instance.matches(&config.host, config.port))
        {
            return None;
        }
        let instance = Arc::new(ServiceInstance::from_config(config));
        instances.push(Arc::clone(&instance));
        Some(instance)
    }

    /// Keep the instances matching `keep` and return the ones dropped.
    fn retain_instances(
        &self,
        keep: impl Fn(&ServiceInstance) -> bool,
    ) -> Vec<Arc<ServiceInstance>> {
        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut *instances)
            .into_iter()
            .partition(|instance| keep(instance));
        *instances = kept;
        removed
    }

    fn instance_count(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Central decision point for admission, routing and outcome feedback.
///
/// Construct one explicitly per gateway with [`GatewayRegistry::new`] or
/// [`GatewayRegistry::from_config`] and share it behind an `Arc`.
pub struct GatewayRegistry {
    settings: RegistrySettings,
    routes: HashMap<String, Arc<RouteConfig>>,
    rate_limiters: HashMap<String, Arc<SlidingWindowLimiter>>,
    services: HashMap<String, Arc<ServiceEntry>>,
    metrics: GatewayMetrics,
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

impl GatewayRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            routes: HashMap::new(),
            rate_limiters: HashMap::new(),
            services: HashMap::new(),
            metrics: GatewayMetrics::new(),
        }
    }

    /// Build a registry and apply every route and service of `config`.
    pub fn from_config(config: &GatewayConfig) -> ValidationResult<Self> {
        let registry = Self::new(RegistrySettings::from_config(config)?);
        registry.apply_config(config)?;
        Ok(registry)
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Apply a configuration document. Safe to call repeatedly: routes are
    /// upserted and instances already registered at the same address are
    /// left untouched. Routes and instances the document no longer lists are
    /// removed, and a removed route's limiter goes with it. Nothing is applied
    /// if the document is invalid.
    pub fn apply_config(&self, config: &GatewayConfig) -> ValidationResult<()> {
        GatewayConfigValidator::validate(config)?;

        for service in &config.services {
            self.set_service_strategy(&service.name, service.strategy);
            let entry = self.service_entry(&service.name);
            for instance in &service.instances {
                if let Some(added) = entry.insert_if_absent(instance) {
                    tracing::info!("Registered {} instance: {}", service.name, added);
                }
            }
        }
        for route in &config.routes {
            self.add_route(route.clone())?;
        }
        self.remove_unlisted(config);
        Ok(())
    }

    fn remove_unlisted(&self, config: &GatewayConfig) {
        let route_keys: HashSet<String> =
            config.routes.iter().map(RouteConfig::route_key).collect();
        self.routes.retain(|key, _| {
            let listed = route_keys.contains(key);
            if !listed {
                tracing::info!("Removed route: {}", key);
            }
            listed
        });
        self.rate_limiters.retain(|key, _| route_keys.contains(key));

        let mut entries = Vec::new();
        self.services.scan(|name, entry| {
            entries.push((name.clone(), Arc::clone(entry)));
        });
        for (name, entry) in entries {
            let listed: HashSet<(&str, u16)> = config
                .services
                .iter()
                .filter(|service| service.name == name)
                .flat_map(|service| service.instances.iter())
                .map(|instance| (instance.host.as_str(), instance.port))
                .collect();
            for removed in entry.retain_instances(|i| listed.contains(&(i.host(), i.port()))) {
                tracing::info!("Deregistered {} instance: {}", name, removed);
            }
        }
    }

    fn service_entry(&self, name: &str) -> Arc<ServiceEntry> {
        Arc::clone(
            self.services
                .entry(name.to_string())
                .or_insert_with(|| {
                    tracing::debug!(service = name, "Creating service entry");
                    Arc::new(ServiceEntry::new(name, &self.settings))
                })
                .get(),
        )
    }

    fn existing_service(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services.read(name, |_, entry| Arc::clone(entry))
    }

    /// Register or replace a route. The route's limiter and its service's
    /// balancer are created on first sight and never recreated.
    pub fn add_route(&self, route: RouteConfig) -> ValidationResult<()> {
        GatewayConfigValidator::validate_route(&route)?;
        let route_key = route.route_key();
        let quota =
            RateLimitQuota::for_route(&route).map_err(|message| ValidationError::InvalidField {
                field: format!("route {route_key} rate limit"),
                message,
            })?;

        let service = self.service_entry(&route.backend_service);
        service.breaker.set_threshold(route.circuit_breaker_threshold);

        let limiter = Arc::clone(
            self.rate_limiters
                .entry(route_key.clone())
                .or_insert_with(|| Arc::new(SlidingWindowLimiter::new(quota)))
                .get(),
        );
        let enforced = limiter.quota();
        if enforced != quota {
            tracing::warn!(
                "Rate limit change for {} not applied: limiter keeps {} requests per {}",
                route_key,
                enforced.requests_per_window,
                humantime::format_duration(enforced.window)
            );
        }

        tracing::info!(
            "Added route: {} -> {}:{}",
            route_key,
            route.backend_service,
            route.backend_port
        );
        let route = Arc::new(route);
        self.routes
            .entry(route_key)
            .and_modify(|existing| *existing = Arc::clone(&route))
            .or_insert(route);
        Ok(())
    }

    pub fn route(&self, route_key: &str) -> Option<Arc<RouteConfig>> {
        self.routes.read(route_key, |_, route| Arc::clone(route))
    }

    /// Switch a route on or off. Returns false for an unknown route.
    pub fn set_route_enabled(&self, route_key: &str, enabled: bool) -> bool {
        let updated = self
            .routes
            .update(route_key, |_, route| {
                let mut changed = RouteConfig::clone(route);
                changed.enabled = enabled;
                *route = Arc::new(changed);
            })
            .is_some();
        if updated {
            tracing::info!(route = route_key, enabled, "Route toggled");
        }
        updated
    }

    /// Fetch the limiter serving a route, if the route was ever added.
    pub fn rate_limiter(&self, route_key: &str) -> Option<Arc<SlidingWindowLimiter>> {
        self.rate_limiters
            .read(route_key, |_, limiter| Arc::clone(limiter))
    }

    /// Change how a service picks instances. In‑flight counters live on the
    /// instances, so nothing is lost by swapping the strategy.
    pub fn set_service_strategy(&self, service_name: &str, strategy: LoadBalanceStrategy) {
        let entry = self.service_entry(service_name);
        if entry.balancer.load().strategy() != strategy {
            tracing::info!(service = service_name, %strategy, "Load balancing strategy set");
            entry.balancer.store(Arc::new(LoadBalancer::new(strategy)));
        }
    }

    pub fn service_strategy(&self, service_name: &str) -> Option<LoadBalanceStrategy> {
        self.existing_service(service_name)
            .map(|entry| entry.balancer.load().strategy())
    }

    /// Append an instance to a service, creating the service on first use.
    pub fn register_service_instance(
        &self,
        service_name: &str,
        instance: InstanceConfig,
    ) -> ValidationResult<Arc<ServiceInstance>> {
        if service_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "service name".to_string(),
            });
        }
        GatewayConfigValidator::validate_instance(service_name, &instance)?;

        let instance = Arc::new(ServiceInstance::from_config(&instance));
        let entry = self.service_entry(service_name);
        entry
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&instance));
        tracing::info!("Registered {} instance: {}", service_name, instance);
        Ok(instance)
    }

    /// Remove the instance at `host:port`. Returns whether one was removed.
    pub fn deregister_service_instance(&self, service_name: &str, host: &str, port: u16) -> bool {
        let Some(entry) = self.existing_service(service_name) else {
            return false;
        };
        let mut instances = entry
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = instances.len();
        instances.retain(|instance| !instance.matches(host, port));
        let removed = instances.len() < before;
        if removed {
            tracing::info!("Deregistered {} instance: {}:{}", service_name, host, port);
        }
        removed
    }

    /// Health probe feedback for one instance. Returns false if unknown.
    pub fn set_instance_health(
        &self,
        service_name: &str,
        host: &str,
        port: u16,
        healthy: bool,
    ) -> bool {
        let Some(instance) = self
            .existing_service(service_name)
            .and_then(|entry| entry.find(host, port))
        else {
            return false;
        };
        if instance.is_healthy() != healthy {
            tracing::info!(
                "Instance {} of {} is now {}",
                instance,
                service_name,
                if healthy { "HEALTHY" } else { "UNHEALTHY" }
            );
        }
        instance.set_healthy(healthy);
        true
    }

    /// Snapshot of a service's instances in registration order.
    pub fn instances(&self, service_name: &str) -> Vec<Arc<ServiceInstance>> {
        self.existing_service(service_name)
            .map(|entry| entry.instances())
            .unwrap_or_default()
    }

    /// Every registered instance with its service name.
    pub fn all_instances(&self) -> Vec<(String, Arc<ServiceInstance>)> {
        let mut entries = Vec::new();
        self.services.scan(|name, entry| {
            entries.push((name.clone(), Arc::clone(entry)));
        });
        entries
            .into_iter()
            .flat_map(|(name, entry)| {
                entry
                    .instances()
                    .into_iter()
                    .map(move |instance| (name.clone(), instance))
            })
            .collect()
    }

    pub fn circuit_state(&self, service_name: &str) -> Option<CircuitState> {
        self.existing_service(service_name)
            .map(|entry| entry.breaker.state())
    }

    /// Decide whether a request may proceed and pick the instance to serve it.
    pub fn admit_and_route(
        &self,
        route_key: &str,
        client_id: &str,
    ) -> AdmissionResult<SelectedInstance> {
        let result = self.admit(route_key, client_id);
        match &result {
            Ok(selected) => tracing::debug!(
                route = route_key,
                client = client_id,
                instance = %selected.instance,
                "Request admitted"
            ),
            Err(e) => tracing::debug!(
                route = route_key,
                client = client_id,
                reason = e.kind(),
                "Request rejected: {e}"
            ),
        }
        result
    }

    fn admit(&self, route_key: &str, client_id: &str) -> AdmissionResult<SelectedInstance> {
        let route = self
            .route(route_key)
            .ok_or_else(|| AdmissionError::RouteNotFound {
                route_key: route_key.to_string(),
            })?;
        if !route.enabled {
            return Err(AdmissionError::RouteDisabled {
                route_key: route_key.to_string(),
            });
        }

        if let Some(limiter) = self.rate_limiter(route_key) {
            if !limiter.is_allowed(client_id) {
                return Err(AdmissionError::RateLimited {
                    route_key: route_key.to_string(),
                    client_id: client_id.to_string(),
                });
            }
        }

        let no_instance = || AdmissionError::NoHealthyInstance {
            service: route.backend_service.clone(),
        };
        let service = self
            .existing_service(&route.backend_service)
            .ok_or_else(no_instance)?;

        if !service.breaker.can_execute() {
            return Err(AdmissionError::CircuitOpen {
                service: route.backend_service.clone(),
            });
        }

        let instances = service.instances();
        let instance = service
            .balancer
            .load()
            .select(&instances)
            .ok_or_else(no_instance)?;

        Ok(SelectedInstance {
            route_key: route_key.to_string(),
            service: route.backend_service.clone(),
            instance,
        })
    }

    /// Feed back the result of a call made to an admitted instance. Call
    /// exactly once per successful `admit_and_route`.
    pub fn report_outcome(&self, service_name: &str, instance: &ServiceInstance, outcome: Outcome) {
        instance.release_connection();

        match self.existing_service(service_name) {
            Some(entry) => {
                if outcome.success {
                    entry.breaker.record_success();
                    if instance.record_success() {
                        tracing::info!("Instance {} of {} restored to HEALTHY", instance, service_name);
                    }
                } else {
                    entry.breaker.record_failure();
                    if instance.record_failure(self.settings.unhealthy_threshold) {
                        tracing::warn!(
                            "Instance {} of {} is now UNHEALTHY (after {} consecutive failures)",
                            instance,
                            service_name,
                            instance.consecutive_failures()
                        );
                    }
                }
            }
            None => tracing::warn!(service = service_name, "Outcome reported for unknown service"),
        }

        self.metrics.record_request(
            outcome.success,
            outcome.latency_ms,
            outcome.bytes_in,
            outcome.bytes_out,
        );
    }

    /// Evict idle clients from every route limiter. Returns the number evicted.
    pub fn sweep_rate_limiters(&self) -> usize {
        let mut limiters = Vec::new();
        self.rate_limiters.scan(|_, limiter| {
            limiters.push(Arc::clone(limiter));
        });
        limiters.iter().map(|limiter| limiter.sweep()).sum()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Services that currently own at least one instance.
    pub fn service_count(&self) -> usize {
        let mut entries = Vec::new();
        self.services.scan(|_, entry| entries.push(Arc::clone(entry)));
        entries
            .iter()
            .filter(|entry| entry.instance_count() > 0)
            .count()
    }

    /// Derive the gateway status from the healthy share of all instances.
    pub fn health_check(&self) -> GatewayStatus {
        let instances = self.all_instances();
        let total = instances.len();
        let healthy = instances
            .iter()
            .filter(|(_, instance)| instance.is_healthy())
            .count();
        let status = GatewayStatus::from_counts(healthy, total);
        let percent = if total == 0 {
            100.0
        } else {
            healthy as f64 * 100.0 / total as f64
        };
        tracing::info!("Health check: {} ({:.1}% healthy)", status, percent);
        status
    }

    pub fn get_gateway_info(&self) -> GatewayInfo {
        GatewayInfo {
            status: self.health_check(),
            routes: self.route_count(),
            services: self.service_count(),
            metrics: self.metrics.get_stats(),
            timestamp: Utc::now(),
        }
    }
}
