pub mod circuit_breaker;
pub mod error;
pub mod instance;
pub mod load_balancer;
pub mod rate_limiter;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use error::{AdmissionError, AdmissionResult};
pub use instance::{InstanceAddr, ServiceInstance};
pub use load_balancer::{LoadBalancer, LoadBalancerFactory};
pub use rate_limiter::{RateLimitQuota, SlidingWindowLimiter};
pub use registry::{
    GatewayInfo, GatewayRegistry, GatewayStatus, Outcome, RegistrySettings, SelectedInstance,
};
