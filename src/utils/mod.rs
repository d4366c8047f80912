pub mod graceful_shutdown;
pub mod rate_limit_sweeper;

pub use graceful_shutdown::{GracefulShutdown, ShutdownReason};
pub use rate_limit_sweeper::RateLimitSweeper;
