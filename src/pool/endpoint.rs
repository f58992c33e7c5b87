//! Pooled endpoint handles
//!
//! The pool never constructs endpoints. Callers build a candidate, hand it to
//! [`EndpointRegistry::register`](super::EndpointRegistry::register) and get
//! back an [`EndpointHandle`] that may point at an older, equivalent endpoint.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use super::key::Fingerprint;

/// A long-lived, expensive-to-create resource managed by the pool
///
/// Teardown happens in the implementor's `Drop`, once the last handle is
/// released.
pub trait Endpoint: Send + Sync + 'static {
    /// Identity used to dedup this endpoint
    fn fingerprint(&self) -> &Fingerprint;

    /// Drive pending I/O when no other poller is active.
    ///
    /// Called periodically by the backup poller while the endpoint is
    /// attached to the pool's poll set.
    fn poll(&self) {}
}

/// Reference-counted handle to a pooled endpoint
///
/// The pool's map holds one handle per registered endpoint. Every other
/// handle is an external reference.
pub struct EndpointHandle<E> {
    inner: Arc<E>,
}

impl<E: Endpoint> EndpointHandle<E> {
    pub(crate) fn new(endpoint: E) -> Self {
        Self {
            inner: Arc::new(endpoint),
        }
    }

    /// Fingerprint of the underlying endpoint
    pub fn fingerprint(&self) -> &Fingerprint {
        self.inner.fingerprint()
    }

    /// Current number of handles, including the one held by the pool
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether nobody outside the pool holds this endpoint
    ///
    /// Only meaningful when called on the pool's own handle; a transient
    /// snapshot being rebuilt concurrently can briefly raise the count,
    /// which makes the endpoint look used until the next check.
    pub fn is_unused(&self) -> bool {
        self.ref_count() <= 1
    }

    /// Whether two handles refer to the same endpoint
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Weak reference used by the poll set, which must not keep the
    /// endpoint alive or count as a user
    pub(crate) fn downgrade(&self) -> Weak<dyn Endpoint> {
        let weak: Weak<E> = Arc::downgrade(&self.inner);
        weak
    }
}

impl<E> Clone for EndpointHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Deref for EndpointHandle<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.inner
    }
}

impl<E: Endpoint> fmt::Debug for EndpointHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointHandle")
            .field("fingerprint", &format_args!("{}", self.fingerprint()))
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::test_util::TestEndpoint;

    #[test]
    fn test_ref_count_follows_clones() {
        let (endpoint, _probe) = TestEndpoint::new("10.0.0.1:80");
        let handle = EndpointHandle::new(endpoint);
        assert_eq!(handle.ref_count(), 1);
        assert!(handle.is_unused());

        let external = handle.clone();
        assert_eq!(handle.ref_count(), 2);
        assert!(!handle.is_unused());
        assert!(EndpointHandle::ptr_eq(&handle, &external));

        drop(external);
        assert!(handle.is_unused());
    }

    #[test]
    fn test_weak_reference_does_not_count() {
        let (endpoint, probe) = TestEndpoint::new("10.0.0.1:80");
        let handle = EndpointHandle::new(endpoint);
        let weak = handle.downgrade();

        assert_eq!(handle.ref_count(), 1);
        assert!(weak.upgrade().is_some());

        drop(handle);
        assert!(weak.upgrade().is_none());
        assert!(probe.is_dropped());
    }

    #[test]
    fn test_deref_and_fingerprint() {
        let (endpoint, _probe) = TestEndpoint::new("db:5432");
        let handle = EndpointHandle::new(endpoint);

        assert_eq!(handle.fingerprint().address(), "db:5432");
        assert_eq!(handle.key.address(), "db:5432");
    }
}
