//! Pool statistics

pub mod metrics;

pub use metrics::PoolStats;
pub(crate) use metrics::PoolMetrics;
