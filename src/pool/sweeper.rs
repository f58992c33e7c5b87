//! Sweeper for unused endpoints
//!
//! Instead of unregistering an endpoint the moment its last external user
//! lets go, the pool sweeps periodically. An endpoint that is dropped and
//! requested again shortly after stays registered, which avoids churn.
//!
//! Each sweep is two-phase: the candidates are collected from an immutable
//! snapshot with no lock held, then removed through the registry's normal
//! publish loop. An endpoint picked up again between the two phases may
//! still be removed; its users keep their handle and the next `register`
//! pools a fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::endpoint::Endpoint;
use super::key::Fingerprint;
use super::store::{EndpointRegistry, Snapshot};

/// Shortest interval the sweeper will wait between runs
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Sweeper lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    /// Spawned, not yet waiting on its first interval
    Idle,
    /// Waiting for the next run
    Scheduled,
    /// Collecting and removing unused endpoints
    Running,
    /// Terminated; never runs again
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SweeperState>,
    stop_requested: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, state: SweeperState) {
        *self.state.lock() = state;
    }
}

/// Background task that periodically unregisters unused endpoints
#[derive(Debug)]
pub struct Sweeper {
    shared: Arc<Shared>,
    interval: Duration,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a sweeper for `registry` on the current runtime
    pub fn spawn<E: Endpoint>(registry: Arc<EndpointRegistry<E>>, interval: Duration) -> Self {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let shared = Arc::new(Shared {
            state: Mutex::new(SweeperState::Idle),
            stop_requested: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        let task_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            run(registry, interval, &task_shared).await;
            task_shared.set_state(SweeperState::Stopped);
            tracing::debug!("Sweeper stopped");
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Sweeper started");
        Self {
            shared,
            interval,
            handle,
        }
    }

    /// Current state
    pub fn state(&self) -> SweeperState {
        *self.shared.state.lock()
    }

    /// Interval between runs
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request the sweeper to stop.
    ///
    /// A pending run is cancelled. A run already in progress finishes but
    /// does not reschedule.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.cancel.cancel();
    }

    /// Wait for the sweeper task to exit; call [`stop`](Self::stop) first
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Sweeper task failed");
        }
    }
}

async fn run<E: Endpoint>(registry: Arc<EndpointRegistry<E>>, interval: Duration, shared: &Shared) {
    loop {
        shared.set_state(SweeperState::Scheduled);
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        if shared.stop_requested.load(Ordering::Acquire) {
            return;
        }

        shared.set_state(SweeperState::Running);
        sweep_once(&registry);
    }
}

/// Collect the fingerprints of every endpoint in `snapshot` that nobody
/// outside the pool is holding
pub fn find_unused<E: Endpoint>(snapshot: &Snapshot<E>) -> Vec<Fingerprint> {
    snapshot
        .iter()
        .filter(|(_, endpoint)| endpoint.is_unused())
        .map(|(key, _)| key.clone())
        .collect()
}

/// Run a single sweep, returning the number of endpoints removed
pub fn sweep_once<E: Endpoint>(registry: &EndpointRegistry<E>) -> usize {
    let unused = {
        let snapshot = registry.snapshot();
        find_unused(&snapshot)
    };

    let removed = if unused.is_empty() {
        0
    } else {
        registry.unregister_batch(&unused)
    };
    registry.metrics().record_sweep();

    tracing::debug!(
        candidates = unused.len(),
        removed,
        remaining = registry.len(),
        "Sweep completed"
    );
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::endpoint::EndpointHandle;
    use crate::pool::test_util::{init_tracing, TestEndpoint};

    fn registry() -> Arc<EndpointRegistry<TestEndpoint>> {
        Arc::new(EndpointRegistry::new())
    }

    #[test]
    fn test_find_unused() {
        let registry = registry();
        let (a, _) = TestEndpoint::new("a:1");
        let (b, _) = TestEndpoint::new("b:1");
        let (c, _) = TestEndpoint::new("c:1");
        drop(registry.register(a));
        let _b = registry.register(b);
        drop(registry.register(c));

        let unused = find_unused(&registry.snapshot());
        let addresses: Vec<&str> = unused.iter().map(|k| k.address()).collect();
        assert_eq!(addresses, vec!["a:1", "c:1"]);
    }

    #[test]
    fn test_sweep_once_removes_only_unused() {
        let registry = registry();
        let (idle, idle_probe) = TestEndpoint::new("idle:1");
        let (busy, busy_probe) = TestEndpoint::new("busy:1");
        drop(registry.register(idle));
        let busy = registry.register(busy);

        assert_eq!(sweep_once(&registry), 1);

        assert!(idle_probe.is_dropped());
        assert!(!busy_probe.is_dropped());
        assert!(registry.contains(busy.fingerprint()));
        assert_eq!(registry.stats().sweeps, 1);
    }

    #[test]
    fn test_reacquired_between_scan_and_removal() {
        let registry = registry();
        let (endpoint, probe) = TestEndpoint::new("a:1");
        let key = registry.register(endpoint).fingerprint().clone();

        let unused = find_unused(&registry.snapshot());
        assert_eq!(unused.len(), 1);

        // A caller grabs the endpoint before the removal commits
        let held = registry.find(&key).unwrap();
        assert_eq!(registry.unregister_batch(&unused), 1);

        // Still usable by its holder, and re-registration pools a new one
        assert!(!probe.is_dropped());
        assert_eq!(held.fingerprint(), &key);
        let (replacement, _) = TestEndpoint::with_key(key.clone(), 7);
        let fresh = registry.register(replacement);
        assert!(!EndpointHandle::ptr_eq(&fresh, &held));
        assert_eq!(fresh.id, 7);

        drop(held);
        assert!(probe.is_dropped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_shared_then_swept() {
        init_tracing();
        let registry = registry();
        let key = Fingerprint::new("10.1.2.3:443");
        let (first, first_probe) = TestEndpoint::with_key(key.clone(), 1);
        let (second, second_probe) = TestEndpoint::with_key(key.clone(), 2);

        let e1 = registry.register(first);
        assert_eq!(e1.ref_count(), 2);
        let e1_again = registry.register(second);
        assert!(EndpointHandle::ptr_eq(&e1, &e1_again));
        assert_eq!(e1.ref_count(), 3);
        assert!(second_probe.is_dropped());

        drop(e1);
        drop(e1_again);
        assert!(registry.find(&key).is_some_and(|e| e.ref_count() == 2));

        let sweeper = Sweeper::spawn(Arc::clone(&registry), Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(registry.contains(&key));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!registry.contains(&key));
        assert!(first_probe.is_dropped());

        sweeper.stop();
        sweeper.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedules_after_each_run() {
        let registry = registry();
        let sweeper = Sweeper::spawn(Arc::clone(&registry), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(registry.stats().sweeps, 3);
        assert_eq!(sweeper.state(), SweeperState::Scheduled);

        sweeper.stop();
        sweeper.join().await;
        assert_eq!(registry.stats().sweeps, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_run() {
        let registry = registry();
        let (endpoint, probe) = TestEndpoint::new("a:1");
        drop(registry.register(endpoint));

        let sweeper = Sweeper::spawn(Arc::clone(&registry), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.stop();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sweeper.state(), SweeperState::Stopped);
        assert_eq!(registry.stats().sweeps, 0);
        assert_eq!(registry.len(), 1);
        assert!(!probe.is_dropped());
        sweeper.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let registry = registry();
        let sweeper = Sweeper::spawn(Arc::clone(&registry), Duration::ZERO);

        assert_eq!(sweeper.interval(), MIN_SWEEP_INTERVAL);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(registry.stats().sweeps >= 3);

        sweeper.stop();
        sweeper.join().await;
    }
}
