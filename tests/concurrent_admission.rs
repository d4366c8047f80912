// Integration tests for the registry under concurrent callers
#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc, thread};

    use tollgate::{
        AdmissionError, GatewayRegistry, Outcome,
        config::{InstanceConfig, RouteConfig},
    };

    #[test]
    fn test_round_robin_is_fair_across_threads() {
        let registry = Arc::new(GatewayRegistry::default());
        for port in [8001, 8002, 8003] {
            registry
                .register_service_instance("catalog", InstanceConfig::new("localhost", port))
                .unwrap();
        }
        registry
            .add_route(RouteConfig::new("GET", "/catalog", "catalog", 8001))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let client = format!("worker-{worker}");
                    let mut picks = HashMap::new();
                    for _ in 0..300 {
                        let selected = registry.admit_and_route("GET:/catalog", &client).unwrap();
                        *picks.entry(selected.instance.port()).or_insert(0usize) += 1;
                        registry.report_outcome(
                            &selected.service,
                            &selected.instance,
                            Outcome::success(1.0),
                        );
                    }
                    picks
                })
            })
            .collect();

        let mut totals: HashMap<u16, usize> = HashMap::new();
        for handle in handles {
            for (port, count) in handle.join().unwrap() {
                *totals.entry(port).or_default() += count;
            }
        }

        assert_eq!(totals.len(), 3);
        for port in [8001, 8002, 8003] {
            assert_eq!(totals[&port], 800);
        }
        assert_eq!(registry.metrics().get_stats().requests_total, 2400);
        assert!(
            registry
                .instances("catalog")
                .iter()
                .all(|i| i.active_connections() == 0)
        );
    }

    #[test]
    fn test_shared_client_never_exceeds_quota() {
        let registry = Arc::new(GatewayRegistry::default());
        registry
            .register_service_instance("search", InstanceConfig::new("localhost", 7700))
            .unwrap();
        registry
            .add_route(RouteConfig::new("GET", "/search", "search", 7700).with_rate_limit(100, 60))
            .unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut admitted = 0;
                    let mut limited = 0;
                    for _ in 0..25 {
                        match registry.admit_and_route("GET:/search", "shared-key") {
                            Ok(_) => admitted += 1,
                            Err(AdmissionError::RateLimited { .. }) => limited += 1,
                            Err(e) => panic!("unexpected rejection: {e}"),
                        }
                    }
                    (admitted, limited)
                })
            })
            .collect();

        let (admitted, limited) = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .fold((0, 0), |acc, (a, l)| (acc.0 + a, acc.1 + l));

        assert_eq!(admitted, 100);
        assert_eq!(limited, 150);
    }

    #[test]
    fn test_reconfiguration_during_traffic() {
        let registry = Arc::new(GatewayRegistry::default());
        registry
            .register_service_instance("inventory", InstanceConfig::new("localhost", 6001))
            .unwrap();
        registry
            .add_route(RouteConfig::new("GET", "/stock", "inventory", 6001))
            .unwrap();

        let traffic = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..500 {
                    let client = format!("c{}", i % 7);
                    let selected = registry.admit_and_route("GET:/stock", &client).unwrap();
                    registry.report_outcome(
                        &selected.service,
                        &selected.instance,
                        Outcome::success(2.0),
                    );
                }
            })
        };

        for port in 6002..6010 {
            registry
                .register_service_instance("inventory", InstanceConfig::new("localhost", port))
                .unwrap();
            registry
                .add_route(RouteConfig::new("GET", "/stock", "inventory", 6001))
                .unwrap();
        }
        traffic.join().unwrap();

        assert_eq!(registry.instances("inventory").len(), 9);
        assert_eq!(registry.route_count(), 1);
        assert_eq!(registry.metrics().get_stats().requests_success, 500);
    }
}
