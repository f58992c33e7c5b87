//! Error types
//!
//! Contention and eviction are never errors: register and find always
//! succeed. What remains are configuration problems, which are logged and
//! replaced by defaults, and starting the pool without a runtime.

use thiserror::Error;

/// Result alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Error type for pool lifecycle operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// Background tasks need a Tokio runtime
    #[error("endpoint pool must be started from within a Tokio runtime")]
    NoRuntime,

    /// Invalid configuration value
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Error type for configuration parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A millisecond setting was negative or not a number
    #[error("invalid {name}: {value:?} (expected a non-negative integer)")]
    InvalidMillis {
        /// Setting name
        name: &'static str,
        /// Raw value as supplied
        value: String,
    },
}
