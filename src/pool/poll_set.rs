//! Shared poll set and backup poller
//!
//! Registered endpoints join a pool-wide poll set so their I/O keeps making
//! progress even when no caller is actively driving them. Membership is
//! changed only under the registry lock, so it always mirrors the published
//! map.
//!
//! The set stores weak references: membership never keeps an endpoint alive
//! and never counts as an external user.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::endpoint::{Endpoint, EndpointHandle};
use super::key::Fingerprint;

/// Shortest interval the backup poller will wait between polls
pub const MIN_BACKUP_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Set of endpoints driven together
#[derive(Default)]
pub struct PollSet {
    members: Mutex<HashMap<Fingerprint, Weak<dyn Endpoint>>>,
}

impl PollSet {
    /// Create an empty poll set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint, replacing any previous member with the same key
    pub fn attach<E: Endpoint>(&self, key: &Fingerprint, endpoint: &EndpointHandle<E>) {
        self.members.lock().insert(key.clone(), endpoint.downgrade());
        tracing::trace!(fingerprint = %key, "Endpoint attached to poll set");
    }

    /// Remove an endpoint; returns false if it was not a member
    pub fn detach(&self, key: &Fingerprint) -> bool {
        let removed = self.members.lock().remove(key).is_some();
        if removed {
            tracing::trace!(fingerprint = %key, "Endpoint detached from poll set");
        }
        removed
    }

    /// Whether `key` is a member
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.members.lock().contains_key(key)
    }

    /// Number of members, including ones whose endpoint is already gone
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether the set has no members
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Remove every member, returning how many there were
    pub fn clear(&self) -> usize {
        let mut members = self.members.lock();
        let count = members.len();
        members.clear();
        count
    }

    /// Poll every live member once, pruning dead ones.
    ///
    /// Endpoints are polled outside the set's lock. Returns the number of
    /// endpoints polled.
    pub fn poll_once(&self) -> usize {
        let live: Vec<Arc<dyn Endpoint>> = {
            let mut members = self.members.lock();
            members.retain(|_, weak| weak.strong_count() > 0);
            members.values().filter_map(Weak::upgrade).collect()
        };

        for endpoint in &live {
            endpoint.poll();
        }
        live.len()
    }
}

impl std::fmt::Debug for PollSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSet").field("members", &self.len()).finish()
    }
}

/// Background task that periodically polls a [`PollSet`]
#[derive(Debug)]
pub struct BackupPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackupPoller {
    /// Spawn the poller on the current runtime.
    ///
    /// `interval` is clamped to [`MIN_BACKUP_POLL_INTERVAL`].
    pub fn spawn(poll_set: Arc<PollSet>, interval: Duration) -> Self {
        let interval = interval.max(MIN_BACKUP_POLL_INTERVAL);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let polled = poll_set.poll_once();
                        tracing::trace!(polled, "Backup poll");
                    }
                }
            }
            tracing::debug!("Backup poller stopped");
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Backup poller started");
        Self { cancel, handle }
    }

    /// Ask the task to exit without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Backup poller task failed");
        }
    }
}
