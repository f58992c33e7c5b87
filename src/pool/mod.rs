//! Endpoint pool
//!
//! The pool dedups long-lived endpoints by [`Fingerprint`]: every caller
//! asking for the same fingerprint shares one reference-counted endpoint.
//!
//! # Architecture
//!
//! ```text
//!                         EndpointPool
//!              ┌──────────────────────────────────┐
//!              │ EndpointRegistry                 │
//!              │   current: Mutex<AvlMap<         │
//!              │     Fingerprint,                 │
//!              │     EndpointHandle,              │
//!              │   >>                             │
//!              │ PollSet (weak members)           │
//!              └──────┬───────────────┬───────────┘
//!                     │               │
//!          register / find        snapshot + unregister_batch
//!                     │               │
//!                 [callers]       [Sweeper task] ── every sweep_interval
//!                                 [BackupPoller] ── polls PollSet members
//! ```
//!
//! # Reference counting
//!
//! The published map holds exactly one handle per endpoint. An endpoint whose
//! handle count has fallen back to one is unused, and the sweeper removes it
//! on its next run. Dropping the map's handle releases the endpoint.

pub mod config;
pub mod endpoint;
pub mod key;
pub mod lifecycle;
pub mod poll_set;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::PoolConfig;
pub use endpoint::{Endpoint, EndpointHandle};
pub use key::{ArgValue, Fingerprint};
pub use lifecycle::EndpointPool;
pub use poll_set::{BackupPoller, PollSet};
pub use store::{EndpointRegistry, Snapshot};
pub use sweeper::{Sweeper, SweeperState};
