use std::collections::HashSet;

use crate::config::models::{GatewayConfig, InstanceConfig, RouteConfig, ServiceConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Duplicate entry detected: {message}")]
    Duplicate { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every problem
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for route in &config.routes {
            errors.extend(Self::route_errors(route));
        }

        let mut seen_routes = HashSet::new();
        for route in &config.routes {
            if !seen_routes.insert(route.route_key()) {
                errors.push(ValidationError::Duplicate {
                    message: format!("route {} is defined more than once", route.route_key()),
                });
            }
        }

        let mut seen_services = HashSet::new();
        for service in &config.services {
            if !seen_services.insert(service.name.as_str()) {
                errors.push(ValidationError::Duplicate {
                    message: format!("service '{}' is defined more than once", service.name),
                });
            }
            errors.extend(Self::service_errors(service));
        }

        if let Err(e) = Self::validate_duration(
            "circuit_breaker.timeout",
            &config.circuit_breaker.timeout,
        ) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_threshold(
            "circuit_breaker.default_threshold",
            config.circuit_breaker.default_threshold,
        ) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_duration("health.probe_interval", &config.health.probe_interval)
        {
            errors.push(e);
        }
        if config.health.unhealthy_threshold == 0 {
            errors.push(ValidationError::InvalidField {
                field: "health.unhealthy_threshold".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if config.rate_limit.cleanup_interval_seconds == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.cleanup_interval_seconds".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate a single route; the first problem found is returned
    pub fn validate_route(route: &RouteConfig) -> ValidationResult<()> {
        match Self::route_errors(route).into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Validate a single instance definition
    pub fn validate_instance(service: &str, instance: &InstanceConfig) -> ValidationResult<()> {
        match Self::instance_errors(service, instance).into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn route_errors(route: &RouteConfig) -> Vec<ValidationError> {
        let key = route.route_key();
        let mut errors = Vec::new();

        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("route {key} path"),
                message: "Route paths must start with '/'".to_string(),
            });
        }
        if route.method.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("route {key} method"),
            });
        }
        if route.backend_service.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("route {key} backend_service"),
            });
        }
        if route.timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("route {key} timeout_ms"),
                message: "Must be greater than 0".to_string(),
            });
        }
        if let Err(e) = Self::validate_threshold(
            &format!("route {key} circuit_breaker_threshold"),
            route.circuit_breaker_threshold,
        ) {
            errors.push(e);
        }
        if route.rate_limit_requests == 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("route {key} rate_limit_requests"),
                message: "Must be greater than 0".to_string(),
            });
        }
        if route.rate_limit_window_seconds == 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("route {key} rate_limit_window_seconds"),
                message: "Must be greater than 0".to_string(),
            });
        }
        errors
    }

    fn service_errors(service: &ServiceConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if service.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "service name".to_string(),
            });
        }

        let mut addresses = HashSet::new();
        for instance in &service.instances {
            errors.extend(Self::instance_errors(&service.name, instance));
            if !addresses.insert((instance.host.as_str(), instance.port)) {
                errors.push(ValidationError::Duplicate {
                    message: format!(
                        "service '{}' lists {}:{} more than once",
                        service.name, instance.host, instance.port
                    ),
                });
            }
        }
        errors
    }

    fn instance_errors(service: &str, instance: &InstanceConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let field = |name: &str| {
            format!(
                "service '{service}' instance {}:{} {name}",
                instance.host, instance.port
            )
        };

        if instance.host.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: field("host"),
            });
        }
        if instance.port == 0 {
            errors.push(ValidationError::InvalidField {
                field: field("port"),
                message: "Must be between 1 and 65535".to_string(),
            });
        }
        if instance.weight == 0 {
            errors.push(ValidationError::InvalidField {
                field: field("weight"),
                message: "Must be at least 1".to_string(),
            });
        }
        if instance.max_connections == 0 {
            errors.push(ValidationError::InvalidField {
                field: field("max_connections"),
                message: "Must be greater than 0".to_string(),
            });
        }
        errors
    }

    fn validate_threshold(field: &str, threshold: f64) -> ValidationResult<()> {
        if threshold > 0.0 && threshold <= 1.0 {
            Ok(())
        } else {
            Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Failure ratio threshold must be in (0, 1], got {threshold}"),
            })
        }
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(duration) if !duration.is_zero() => Ok(()),
            Ok(_) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than 0".to_string(),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{value}': {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            errors[0].to_string()
        } else {
            let messages: Vec<String> = errors
                .iter()
                .enumerate()
                .map(|(i, e)| format!("  {}. {}", i + 1, e))
                .collect();
            format!("Multiple validation errors:\n{}", messages.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::LoadBalanceStrategy;

    fn service(name: &str, instances: Vec<InstanceConfig>) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            strategy: LoadBalanceStrategy::RoundRobin,
            instances,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(GatewayConfigValidator::validate(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_route_threshold_bounds() {
        let route = RouteConfig::new("GET", "/a", "svc", 80).with_circuit_breaker_threshold(0.0);
        assert!(GatewayConfigValidator::validate_route(&route).is_err());

        let route = route.with_circuit_breaker_threshold(1.0);
        assert!(GatewayConfigValidator::validate_route(&route).is_ok());

        let route = route.with_circuit_breaker_threshold(1.5);
        assert!(GatewayConfigValidator::validate_route(&route).is_err());
    }

    #[test]
    fn test_route_invariants() {
        let mut route = RouteConfig::new("GET", "no-slash", "svc", 80);
        assert!(matches!(
            GatewayConfigValidator::validate_route(&route),
            Err(ValidationError::InvalidField { .. })
        ));

        route.path = "/ok".to_string();
        route.timeout_ms = 0;
        assert!(GatewayConfigValidator::validate_route(&route).is_err());

        route.timeout_ms = 100;
        route.rate_limit_requests = 0;
        assert!(GatewayConfigValidator::validate_route(&route).is_err());

        route.rate_limit_requests = 1;
        route.rate_limit_window_seconds = 0;
        assert!(GatewayConfigValidator::validate_route(&route).is_err());

        route.rate_limit_window_seconds = 1;
        route.backend_service = " ".to_string();
        assert!(matches!(
            GatewayConfigValidator::validate_route(&route),
            Err(ValidationError::MissingField { .. })
        ));
    }

    #[test]
    fn test_instance_weight_must_be_positive() {
        let instance = InstanceConfig::new("10.0.0.1", 8080).with_weight(0);
        assert!(GatewayConfigValidator::validate_instance("svc", &instance).is_err());
        let instance = instance.with_weight(2);
        assert!(GatewayConfigValidator::validate_instance("svc", &instance).is_ok());
    }

    #[test]
    fn test_duplicates_are_reported() {
        let mut config = GatewayConfig::default();
        config.routes.push(config.routes[0].clone());
        config.services.push(service(
            "users",
            vec![
                InstanceConfig::new("10.0.0.1", 8001),
                InstanceConfig::new("10.0.0.1", 8001),
            ],
        ));
        config.services.push(service("users", vec![]));

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        let ValidationError::ValidationFailed { message } = err else {
            panic!("expected aggregated failure");
        };
        assert!(message.contains("GET:/api/v1/health is defined more than once"));
        assert!(message.contains("10.0.0.1:8001 more than once"));
        assert!(message.contains("service 'users' is defined more than once"));
    }

    #[test]
    fn test_invalid_durations() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.timeout = "soon".to_string();
        config.health.probe_interval = "0s".to_string();
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Multiple validation errors"));
    }
}
