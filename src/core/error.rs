use thiserror::Error;

/// Reasons a request is turned away before any backend call is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AdmissionError {
    /// No route is registered under the key
    #[error("No route registered for {route_key}")]
    RouteNotFound { route_key: String },

    /// The route exists but is switched off
    #[error("Route {route_key} is disabled")]
    RouteDisabled { route_key: String },

    /// The client used up its sliding window quota on this route
    #[error("Rate limit exceeded for client '{client_id}' on {route_key}")]
    RateLimited { route_key: String, client_id: String },

    /// The backend service's breaker is open
    #[error("Circuit open for service {service}")]
    CircuitOpen { service: String },

    /// The backend service has no healthy instance to serve the call
    #[error("No healthy instance available for service {service}")]
    NoHealthyInstance { service: String },
}

impl AdmissionError {
    /// Whether the caller may retry the same request later and expect a
    /// different answer without any configuration change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdmissionError::RateLimited { .. } | AdmissionError::CircuitOpen { .. }
        )
    }

    /// Short machine readable label, used for logging fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::RouteNotFound { .. } => "route_not_found",
            AdmissionError::RouteDisabled { .. } => "route_disabled",
            AdmissionError::RateLimited { .. } => "rate_limited",
            AdmissionError::CircuitOpen { .. } => "circuit_open",
            AdmissionError::NoHealthyInstance { .. } => "no_healthy_instance",
        }
    }
}

/// Result type for admission decisions
pub type AdmissionResult<T> = Result<T, AdmissionError>;
