//! Endpoint registry implementation
//!
//! The registry owns the current [`AvlMap`] snapshot behind a mutex. The
//! lock only guards the root: readers clone the snapshot and search it
//! without the lock, writers build a new map outside the lock and publish it
//! only if nobody else published first.
//!
//! ```text
//!   ┌── lock ──┐                        ┌────────── lock ──────────┐
//!   │ snapshot │ ─► get / add / remove ─► │ root unchanged? swap     │
//!   └──────────┘     (no lock held)      │ otherwise drop and retry │
//!                                        └──────────────────────────┘
//! ```

use std::borrow::Borrow;
use std::sync::Arc;

use parking_lot::Mutex;

use super::endpoint::{Endpoint, EndpointHandle};
use super::key::Fingerprint;
use super::poll_set::PollSet;
use crate::map::AvlMap;
use crate::stats::{PoolMetrics, PoolStats};

/// An immutable view of the registry at one point in time
pub type Snapshot<E> = AvlMap<Fingerprint, EndpointHandle<E>>;

#[cfg(test)]
type PublishHook<E> = Box<dyn FnOnce(&EndpointRegistry<E>) + Send>;

/// Central registry of pooled endpoints
///
/// All operations are synchronous and may be called from any thread.
pub struct EndpointRegistry<E: Endpoint> {
    /// Current published snapshot
    current: Mutex<Snapshot<E>>,

    /// Shared poll set mirroring the published entries
    poll_set: Option<Arc<PollSet>>,

    /// Counters
    metrics: PoolMetrics,

    /// Runs once before the next publish, to stage a competing writer
    #[cfg(test)]
    publish_hook: Mutex<Option<PublishHook<E>>>,
}

impl<E: Endpoint> EndpointRegistry<E> {
    /// Create an empty registry without a poll set
    pub fn new() -> Self {
        Self::with_poll_set(None)
    }

    /// Create an empty registry whose entries join `poll_set`
    pub fn with_poll_set(poll_set: Option<Arc<PollSet>>) -> Self {
        Self {
            current: Mutex::new(AvlMap::new()),
            poll_set,
            metrics: PoolMetrics::new(),
            #[cfg(test)]
            publish_hook: Mutex::new(None),
        }
    }

    /// The poll set registered endpoints are attached to, if any
    pub fn poll_set(&self) -> Option<&Arc<PollSet>> {
        self.poll_set.as_ref()
    }

    /// Take a snapshot of the current map.
    ///
    /// The lock is held only long enough to clone the root.
    pub fn snapshot(&self) -> Snapshot<E> {
        self.current.lock().clone()
    }

    /// Register an endpoint, or return the equivalent one already pooled.
    ///
    /// `candidate` is built by the caller before calling so that construction
    /// never happens under the registry lock. If an endpoint with the same
    /// fingerprint is already registered, the candidate is dropped and the
    /// existing endpoint is returned.
    pub fn register(&self, candidate: E) -> EndpointHandle<E> {
        let key = candidate.fingerprint().clone();
        let candidate = EndpointHandle::new(candidate);

        loop {
            let snapshot = self.snapshot();

            if let Some(existing) = snapshot.get(&key) {
                let existing = existing.clone();
                self.metrics.record_reused();
                tracing::debug!(
                    fingerprint = %key,
                    refs = existing.ref_count(),
                    "Reusing pooled endpoint"
                );
                return existing;
            }

            let next = snapshot.add(key.clone(), candidate.clone());
            if self.publish(&snapshot, next, |poll_set| poll_set.attach(&key, &candidate)) {
                self.metrics.record_registered();
                tracing::info!(fingerprint = %key, "Endpoint registered");
                return candidate;
            }

            self.metrics.record_retry();
            tracing::trace!(fingerprint = %key, "Registry changed during register, retrying");
        }
    }

    /// Look up a registered endpoint
    pub fn find(&self, key: &Fingerprint) -> Option<EndpointHandle<E>> {
        let snapshot = self.snapshot();
        let found = snapshot.get(key).cloned();
        self.metrics.record_lookup(found.is_some());
        found
    }

    /// Whether an endpoint is registered for `key`
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.snapshot().contains_key(key)
    }

    /// Remove a single endpoint.
    ///
    /// Returns false if nothing was registered for `key`.
    pub fn unregister(&self, key: &Fingerprint) -> bool {
        self.unregister_batch(std::iter::once(key)) == 1
    }

    /// Remove a batch of endpoints, returning how many were actually removed.
    ///
    /// Keys that are no longer registered are skipped. Removal does not
    /// re-check whether an endpoint is in use; callers still holding a
    /// handle keep it alive, and the next `register` creates a fresh entry.
    pub fn unregister_batch<I>(&self, keys: I) -> usize
    where
        I: IntoIterator,
        I::Item: Borrow<Fingerprint>,
    {
        let mut removed = 0;
        for key in keys {
            if self.remove_one(key.borrow()) {
                removed += 1;
            }
        }

        if removed > 0 {
            self.metrics.record_evicted(removed);
        }
        removed
    }

    fn remove_one(&self, key: &Fingerprint) -> bool {
        loop {
            let snapshot = self.snapshot();

            let Some((next, removed)) = snapshot.remove(key) else {
                tracing::trace!(fingerprint = %key, "Endpoint already unregistered");
                return false;
            };

            if self.publish(&snapshot, next, |poll_set| {
                poll_set.detach(key);
            }) {
                tracing::info!(
                    fingerprint = %key,
                    external_refs = removed.ref_count().saturating_sub(2),
                    "Endpoint unregistered"
                );
                return true;
            }

            self.metrics.record_retry();
            tracing::trace!(fingerprint = %key, "Registry changed during unregister, retrying");
        }
    }

    /// Swap in `next` if the current map is still `base`.
    ///
    /// `on_publish` runs under the lock so poll set membership always
    /// matches the published map. The replaced map is released after the
    /// lock is dropped.
    fn publish<F>(&self, base: &Snapshot<E>, next: Snapshot<E>, on_publish: F) -> bool
    where
        F: FnOnce(&PollSet),
    {
        #[cfg(test)]
        {
            let hook = self.publish_hook.lock().take();
            if let Some(hook) = hook {
                hook(self);
            }
        }

        let mut current = self.current.lock();
        // `base` is still alive, so its root cannot have been freed and
        // reused by a newer map
        if !AvlMap::ptr_eq(&*current, base) {
            return false;
        }

        let previous = std::mem::replace(&mut *current, next);
        if let Some(poll_set) = &self.poll_set {
            on_publish(poll_set);
        }
        drop(current);
        drop(previous);
        true
    }

    /// Remove every entry and detach it from the poll set.
    ///
    /// Used at shutdown. Endpoints nobody else holds are released once the
    /// final snapshot is dropped, outside the lock. Returns the number of
    /// entries released.
    pub fn drain(&self) -> usize {
        let drained = {
            let mut current = self.current.lock();
            let drained = std::mem::take(&mut *current);
            if let Some(poll_set) = &self.poll_set {
                for key in drained.keys() {
                    poll_set.detach(key);
                }
            }
            drained
        };

        let count = drained.len();
        tracing::info!(entries = count, "Registry drained");
        count
    }

    /// Number of registered endpoints
    pub fn len(&self) -> usize {
        self.current.lock().len()
    }

    /// Whether no endpoints are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics
    pub fn stats(&self) -> PoolStats {
        self.metrics.snapshot(self.len())
    }

    pub(crate) fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    #[cfg(test)]
    fn set_publish_hook<F>(&self, hook: F)
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        *self.publish_hook.lock() = Some(Box::new(hook));
    }
}

impl<E: Endpoint> Default for EndpointRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Endpoint> std::fmt::Debug for EndpointRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("entries", &self.len())
            .field("poll_set", &self.poll_set)
            .finish()
    }
}
