pub mod config_providers;
pub mod health_monitor;
pub mod tcp_probe;

/// Re-export commonly used types from adapters
pub use config_providers::FileConfigProvider;
pub use health_monitor::{HealthMonitor, ProbeSummary};
pub use tcp_probe::TcpHealthProbe;
