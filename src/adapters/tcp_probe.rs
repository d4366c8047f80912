use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use tokio::{net::TcpStream, time::timeout};

use crate::{core::instance::InstanceAddr, ports::health_probe::HealthProbe};

/// Treats an instance as healthy when a TCP connection to it can be opened
/// within the timeout.
pub struct TcpHealthProbe {
    connect_timeout: Duration,
}

impl TcpHealthProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpHealthProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl HealthProbe for TcpHealthProbe {
    async fn probe(&self, service: &str, instance: &InstanceAddr) -> Result<bool> {
        let target = (instance.host.as_str(), instance.port);
        match timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => {
                tracing::debug!("TCP probe to {} ({}) failed: {}", instance, service, e);
                Ok(false)
            }
            Err(_) => {
                tracing::debug!(
                    "TCP probe to {} ({}) timed out after {:?}",
                    instance,
                    service,
                    self.connect_timeout
                );
                Ok(false)
            }
        }
    }
}
