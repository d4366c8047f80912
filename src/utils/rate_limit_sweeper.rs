//! Periodic eviction of idle rate limiter clients.
//!
//! Limiters prune a client's window lazily on each check, but a client that
//! never comes back would keep its (empty) entry forever. The sweeper walks
//! every route limiter on a fixed interval and drops those entries, which
//! keeps limiter memory proportional to recently active clients.
use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, task::JoinHandle, time::interval};

use crate::{core::GatewayRegistry, utils::graceful_shutdown::ShutdownReason};

pub struct RateLimitSweeper {
    registry: Arc<GatewayRegistry>,
    interval: Duration,
}

impl RateLimitSweeper {
    pub fn new(registry: Arc<GatewayRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run one sweep immediately. Returns the number of clients evicted.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.registry.sweep_rate_limiters();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle rate limit clients");
        }
        evicted
    }

    /// Sweep on every interval tick until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<ShutdownReason>) {
        tracing::info!(
            "Rate limit sweeper started, interval: {}",
            humantime::format_duration(self.interval)
        );
        let mut ticker = interval(self.interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper stopped");
                    return;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<ShutdownReason>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
