//! Tollgate - the decision core of an API gateway.
//!
//! For every inbound request a proxy asks Tollgate three questions: may this
//! client call this route right now, is the backend service currently
//! considered reachable, and which instance should serve the call. After the
//! proxy has made the call it reports the outcome back, which feeds circuit
//! breakers, instance health and metrics.
//!
//! # Features
//! - Per‑route sliding window rate limiting keyed by client identity
//! - Per‑service circuit breaking on failure ratio (closed / open / half‑open)
//! - Round‑robin, least‑connections and weighted instance selection
//! - Bounded‑memory latency and outcome aggregation with percentiles
//! - JSON / YAML / TOML configuration with validation and hot reload
//!
//! # Quick Example
//! ```no_run
//! use tollgate::{
//!     GatewayRegistry, Outcome,
//!     config::{InstanceConfig, RouteConfig},
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let registry = GatewayRegistry::default();
//! registry.register_service_instance("user-service", InstanceConfig::new("10.0.0.1", 8001))?;
//! registry.add_route(RouteConfig::new("GET", "/api/v1/users", "user-service", 8001))?;
//!
//! let selected = registry.admit_and_route("GET:/api/v1/users", "api-key-1")?;
//! // ... forward the request to selected.instance ...
//! registry.report_outcome(&selected.service, &selected.instance, Outcome::success(12.5));
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Business logic lives in `core` and never performs I/O. Collaborators
//! (configuration sources, health probes) are described by traits in `ports`
//! with implementations in `adapters`.
//!
//! # Error Handling
//! Per‑request rejections are [`AdmissionError`] values. Configuration and
//! registration problems surface as [`config::ValidationError`]; the binary and
//! async adapters use `eyre::Result`.
//!
//! # Concurrency & Data Structures
//! Shared maps use `scc::HashMap`. Each breaker, limiter shard, balancer and
//! the metrics aggregator owns its own lock, so unrelated routes and services
//! never contend.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{FileConfigProvider, HealthMonitor},
    core::{
        AdmissionError, GatewayInfo, GatewayRegistry, GatewayStatus, Outcome, RegistrySettings,
        SelectedInstance,
    },
    metrics::{GatewayMetrics, MetricsSnapshot},
    utils::{GracefulShutdown, RateLimitSweeper},
};
