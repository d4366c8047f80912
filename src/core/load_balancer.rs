use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use rand::Rng;

use crate::{config::LoadBalanceStrategy, core::instance::ServiceInstance};

/// Trait defining the interface for load balancing strategies
pub trait LoadBalancingStrategy: Send + Sync + 'static {
    /// Select an instance from a non-empty list of healthy instances
    fn select_instance(&self, healthy: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>>;
    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn LoadBalancingStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin load balancing strategy
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn select_instance(&self, healthy: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if healthy.is_empty() {
            return None;
        }
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        Some(Arc::clone(&healthy[count % healthy.len()]))
    }
}

/// Picks the instance with the fewest in-flight calls; ties go to the earliest registered.
pub struct LeastConnectionsStrategy;

impl LoadBalancingStrategy for LeastConnectionsStrategy {
    fn select_instance(&self, healthy: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        healthy
            .iter()
            .min_by_key(|instance| instance.active_connections())
            .cloned()
    }
}

/// Weighted random selection over cumulative weights in registration order
pub struct WeightedStrategy;

impl WeightedStrategy {
    /// Walk cumulative weights and return the first instance whose running
    /// total exceeds `draw`. Zero-weight instances are never picked.
    fn pick(healthy: &[Arc<ServiceInstance>], draw: u64) -> Option<&Arc<ServiceInstance>> {
        let mut cumulative = 0u64;
        healthy.iter().find(|instance| {
            cumulative += u64::from(instance.weight());
            cumulative > draw
        })
    }
}

impl LoadBalancingStrategy for WeightedStrategy {
    fn select_instance(&self, healthy: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        let total_weight: u64 = healthy.iter().map(|i| u64::from(i.weight())).sum();
        if total_weight == 0 {
            return healthy.first().cloned();
        }
        let draw = rand::rng().random_range(0..total_weight);
        Self::pick(healthy, draw).cloned()
    }
}

/// Factory for creating load balancing strategies from configuration
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    /// Create a new load balancing strategy based on configuration
    pub fn create_strategy(strategy: &LoadBalanceStrategy) -> Box<dyn LoadBalancingStrategy> {
        match strategy {
            LoadBalanceStrategy::RoundRobin => RoundRobinStrategy::new().boxed(),
            LoadBalanceStrategy::LeastConnections => LeastConnectionsStrategy.boxed(),
            LoadBalanceStrategy::Weighted => WeightedStrategy.boxed(),
        }
    }
}

/// Per-service selector: filters the healthy set, delegates to the strategy
/// and charges the chosen instance with one in-flight call.
pub struct LoadBalancer {
    kind: LoadBalanceStrategy,
    strategy: Box<dyn LoadBalancingStrategy>,
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("strategy", &self.kind)
            .finish()
    }
}

impl LoadBalancer {
    pub fn new(kind: LoadBalanceStrategy) -> Self {
        Self {
            kind,
            strategy: LoadBalancerFactory::create_strategy(&kind),
        }
    }

    pub fn strategy(&self) -> LoadBalanceStrategy {
        self.kind
    }

    /// Select one healthy instance, or `None` when none is healthy.
    pub fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        let healthy: Vec<Arc<ServiceInstance>> = instances
            .iter()
            .filter(|instance| instance.is_healthy())
            .cloned()
            .collect();
        let selected = self.strategy.select_instance(&healthy)?;
        selected.acquire_connection();
        Some(selected)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, thread};

    use super::*;

    fn instances(ports: &[u16]) -> Vec<Arc<ServiceInstance>> {
        ports
            .iter()
            .map(|port| Arc::new(ServiceInstance::new("localhost", *port)))
            .collect()
    }

    #[test]
    fn test_round_robin_strategy() {
        let strategy = RoundRobinStrategy::new();
        let targets = instances(&[8001, 8002, 8003]);

        let picks: Vec<u16> = (0..4)
            .map(|_| strategy.select_instance(&targets).unwrap().port())
            .collect();
        // Wraps around
        assert_eq!(picks, vec![8001, 8002, 8003, 8001]);
    }

    #[test]
    fn test_round_robin_empty_targets() {
        let strategy = RoundRobinStrategy::new();
        assert!(strategy.select_instance(&[]).is_none());
    }

    #[test]
    fn test_round_robin_concurrent_fairness() {
        let balancer = Arc::new(LoadBalancer::new(LoadBalanceStrategy::RoundRobin));
        let targets = Arc::new(instances(&[8001, 8002, 8003, 8004]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let balancer = Arc::clone(&balancer);
                let targets = Arc::clone(&targets);
                thread::spawn(move || {
                    (0..25)
                        .map(|_| balancer.select(&targets).unwrap().port())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<u16, usize> = HashMap::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                *counts.entry(port).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|count| *count == 25));
    }

    #[test]
    fn test_least_connections_prefers_idle_instance() {
        let balancer = LoadBalancer::new(LoadBalanceStrategy::LeastConnections);
        let targets = instances(&[8001, 8002]);

        let first = balancer.select(&targets).unwrap();
        assert_eq!(first.port(), 8001);
        let second = balancer.select(&targets).unwrap();
        assert_eq!(second.port(), 8002);

        first.release_connection();
        assert_eq!(balancer.select(&targets).unwrap().port(), 8001);
        assert_eq!(targets[0].active_connections(), 1);
        assert_eq!(targets[1].active_connections(), 1);
    }

    #[test]
    fn test_weighted_pick_walks_cumulative_weights() {
        let targets = vec![
            Arc::new(ServiceInstance::new("a", 1).with_weight(1)),
            Arc::new(ServiceInstance::new("b", 2).with_weight(0)),
            Arc::new(ServiceInstance::new("c", 3).with_weight(3)),
        ];
        assert_eq!(WeightedStrategy::pick(&targets, 0).unwrap().host(), "a");
        assert_eq!(WeightedStrategy::pick(&targets, 1).unwrap().host(), "c");
        assert_eq!(WeightedStrategy::pick(&targets, 3).unwrap().host(), "c");
    }

    #[test]
    fn test_weighted_distribution_follows_weights() {
        let strategy = WeightedStrategy;
        let targets = vec![
            Arc::new(ServiceInstance::new("light", 1).with_weight(1)),
            Arc::new(ServiceInstance::new("heavy", 2).with_weight(3)),
        ];

        let trials = 10_000;
        let heavy = (0..trials)
            .filter(|_| strategy.select_instance(&targets).unwrap().host() == "heavy")
            .count();
        let share = heavy as f64 / trials as f64;
        assert!((share - 0.75).abs() < 0.03, "heavy share was {share}");
    }

    #[test]
    fn test_weighted_zero_total_falls_back_to_first() {
        let strategy = WeightedStrategy;
        let targets = vec![
            Arc::new(ServiceInstance::new("a", 1).with_weight(0)),
            Arc::new(ServiceInstance::new("b", 2).with_weight(0)),
        ];
        assert_eq!(strategy.select_instance(&targets).unwrap().host(), "a");
    }

    #[test]
    fn test_balancer_skips_unhealthy_instances() {
        let balancer = LoadBalancer::new(LoadBalanceStrategy::RoundRobin);
        let targets = instances(&[8001, 8002]);
        targets[0].set_healthy(false);

        for _ in 0..3 {
            assert_eq!(balancer.select(&targets).unwrap().port(), 8002);
        }
        targets[1].set_healthy(false);
        assert!(balancer.select(&targets).is_none());
    }

    #[test]
    fn test_load_balancer_factory() {
        let targets = instances(&[8001, 8002]);
        for kind in [
            LoadBalanceStrategy::RoundRobin,
            LoadBalanceStrategy::LeastConnections,
            LoadBalanceStrategy::Weighted,
        ] {
            let strategy = LoadBalancerFactory::create_strategy(&kind);
            assert!(strategy.select_instance(&targets).is_some());
        }
    }
}
