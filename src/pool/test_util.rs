//! Shared helpers for pool tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::key::Fingerprint;

/// Observes an endpoint's lifecycle after it has been moved into the pool
#[derive(Debug, Default)]
pub(crate) struct Probe {
    dropped: AtomicBool,
    polls: AtomicUsize,
}

impl Probe {
    pub(crate) fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct TestEndpoint {
    pub(crate) key: Fingerprint,
    pub(crate) id: usize,
    probe: Arc<Probe>,
}

impl TestEndpoint {
    pub(crate) fn new(address: &str) -> (Self, Arc<Probe>) {
        Self::with_key(Fingerprint::new(address), 0)
    }

    pub(crate) fn with_key(key: Fingerprint, id: usize) -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let endpoint = Self {
            key,
            id,
            probe: Arc::clone(&probe),
        };
        (endpoint, probe)
    }
}

impl Endpoint for TestEndpoint {
    fn fingerprint(&self) -> &Fingerprint {
        &self.key
    }

    fn poll(&self) {
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for TestEndpoint {
    fn drop(&mut self) {
        self.probe.dropped.store(true, Ordering::SeqCst);
    }
}

/// Install a tracing subscriber once per test binary; honours `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
