use std::{sync::Arc, time::Duration};

use eyre::Result;
use tokio::{sync::broadcast, time::interval};

use crate::{
    core::{GatewayRegistry, ServiceInstance},
    ports::health_probe::HealthProbe,
    utils::graceful_shutdown::ShutdownReason,
};

/// Periodically probes every registered instance and records the answer in
/// the registry. Traffic outcomes keep adjusting health between rounds.
pub struct HealthMonitor {
    registry: Arc<GatewayRegistry>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
}

/// Result of one probing round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSummary {
    pub healthy: usize,
    pub unhealthy: usize,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<GatewayRegistry>,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            interval,
        }
    }

    /// Run probing rounds until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<ShutdownReason>) -> Result<()> {
        tracing::info!(
            "Starting health monitor with interval: {}",
            humantime::format_duration(self.interval)
        );
        let mut ticker = interval(self.interval);
        // The first tick completes immediately; let the gateway settle first
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.probe_all().await;
                    tracing::debug!(
                        healthy = summary.healthy,
                        unhealthy = summary.unhealthy,
                        "Health probe round completed"
                    );
                }
                reason = shutdown.recv() => {
                    tracing::info!("Health monitor stopping: {:?}", reason);
                    return Ok(());
                }
            }
        }
    }

    /// Probe every instance once.
    pub async fn probe_all(&self) -> ProbeSummary {
        let mut summary = ProbeSummary::default();
        for (service, instance) in self.registry.all_instances() {
            if self.probe_instance(&service, &instance).await {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }
        }
        summary
    }

    async fn probe_instance(&self, service: &str, instance: &ServiceInstance) -> bool {
        let healthy = match self.probe.probe(service, instance.addr()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                tracing::warn!("Health probe failed for {} of {}: {}", instance, service, e);
                false
            }
        };
        self.registry
            .set_instance_health(service, instance.host(), instance.port(), healthy);
        healthy
    }
}
