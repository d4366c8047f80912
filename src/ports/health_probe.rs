use async_trait::async_trait;
use eyre::Result;

use crate::core::instance::InstanceAddr;

/// Checks whether one backend instance is reachable.
///
/// Implementations own the transport (HTTP, TCP, ...). An `Err` is treated
/// the same as an unhealthy answer.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, service: &str, instance: &InstanceAddr) -> Result<bool>;
}
