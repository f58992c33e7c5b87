//! # endpoint-pool
//!
//! A deduplicating pool of long-lived, expensive-to-create endpoints
//! (connections, channels) shared by independent callers.
//!
//! Callers build a candidate endpoint and [`register`](EndpointPool::register)
//! it. If an endpoint with the same [`Fingerprint`] is already pooled, the
//! caller gets that one and the candidate is dropped. A background
//! [`Sweeper`] periodically removes endpoints nobody outside the pool holds.
//!
//! The registry is a copy-on-write [`AvlMap`]: readers search a snapshot with
//! no lock held, writers publish a new version only if nobody else published
//! in the meantime and retry otherwise.
//!
//! ## Modules
//!
//! - [`map`]: persistent, structurally shared AVL map
//! - [`pool`]: registry, sweeper, poll set and pool lifecycle
//! - [`stats`]: pool counters
//! - [`error`]: error types

pub mod error;
pub mod map;
pub mod pool;
pub mod stats;

pub use error::{ConfigError, PoolError, Result};
pub use map::AvlMap;
pub use pool::{
    ArgValue, Endpoint, EndpointHandle, EndpointPool, EndpointRegistry, Fingerprint, PollSet,
    PoolConfig, Sweeper, SweeperState,
};
pub use stats::PoolStats;
