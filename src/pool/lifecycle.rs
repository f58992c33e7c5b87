//! Pool lifecycle
//!
//! [`EndpointPool`] ties the registry to its background tasks. It is an
//! ordinary value: create one per process (or per test) and pass it to
//! whatever needs pooling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::config::PoolConfig;
use super::endpoint::{Endpoint, EndpointHandle};
use super::key::Fingerprint;
use super::poll_set::{BackupPoller, PollSet};
use super::store::EndpointRegistry;
use super::sweeper::Sweeper;
use crate::error::{PoolError, Result};
use crate::stats::PoolStats;

/// A running endpoint pool
///
/// Must be started inside a Tokio runtime and shut down with
/// [`shutdown`](Self::shutdown) before the runtime goes away.
///
/// # Example
/// ```
/// use endpoint_pool::{Endpoint, EndpointHandle, EndpointPool, Fingerprint, PoolConfig};
///
/// struct Channel {
///     key: Fingerprint,
/// }
///
/// impl Endpoint for Channel {
///     fn fingerprint(&self) -> &Fingerprint {
///         &self.key
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> endpoint_pool::Result<()> {
/// let pool = EndpointPool::start(PoolConfig::default())?;
/// let key = Fingerprint::new("10.0.0.7:443").with_arg("authority", "api.internal");
///
/// let a = pool.register(Channel { key: key.clone() });
/// let b = pool.register(Channel { key });
/// assert!(EndpointHandle::ptr_eq(&a, &b));
///
/// pool.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct EndpointPool<E: Endpoint> {
    config: PoolConfig,
    registry: Arc<EndpointRegistry<E>>,
    sweeper: Mutex<Option<Sweeper>>,
    backup_poller: Mutex<Option<BackupPoller>>,
    shut_down: AtomicBool,
}

impl<E: Endpoint> EndpointPool<E> {
    /// Start a pool: empty registry, optional poll set and backup poller,
    /// and the sweeper
    pub fn start(config: PoolConfig) -> Result<Self> {
        tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let poll_set = config.poll_set_enabled.then(|| Arc::new(PollSet::new()));
        let backup_poller = match &poll_set {
            Some(poll_set) if !config.backup_poll_interval.is_zero() => {
                Some(BackupPoller::spawn(Arc::clone(poll_set), config.backup_poll_interval))
            }
            _ => None,
        };

        let registry = Arc::new(EndpointRegistry::with_poll_set(poll_set));
        let sweeper = Sweeper::spawn(Arc::clone(&registry), config.sweep_interval);

        tracing::info!(
            sweep_interval_ms = config.sweep_interval.as_millis() as u64,
            poll_set = config.poll_set_enabled,
            backup_polling = backup_poller.is_some(),
            "Endpoint pool started"
        );

        Ok(Self {
            config,
            registry,
            sweeper: Mutex::new(Some(sweeper)),
            backup_poller: Mutex::new(backup_poller),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Start a pool configured from the environment
    pub fn from_env() -> Result<Self> {
        Self::start(PoolConfig::from_env())
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the underlying registry
    pub fn registry(&self) -> &Arc<EndpointRegistry<E>> {
        &self.registry
    }

    /// Register an endpoint, or return the equivalent one already pooled.
    ///
    /// # Panics
    /// If the pool has been shut down.
    pub fn register(&self, candidate: E) -> EndpointHandle<E> {
        self.assert_running();
        self.registry.register(candidate)
    }

    /// Look up a pooled endpoint.
    ///
    /// # Panics
    /// If the pool has been shut down.
    pub fn find(&self, key: &Fingerprint) -> Option<EndpointHandle<E>> {
        self.assert_running();
        self.registry.find(key)
    }

    /// Remove an endpoint from the pool immediately, without waiting for a
    /// sweep
    pub fn unregister(&self, key: &Fingerprint) -> bool {
        self.assert_running();
        self.registry.unregister(key)
    }

    /// Current statistics
    pub fn stats(&self) -> PoolStats {
        self.registry.stats()
    }

    /// Whether the sweeper is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stop the sweeper and wait for it to exit.
    ///
    /// Meant for tests that need entries to survive without a sweep racing
    /// them.
    pub async fn stop_sweeper(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop();
            sweeper.join().await;
        }
    }

    /// Restart the sweeper after [`stop_sweeper`](Self::stop_sweeper).
    ///
    /// Does nothing if it is already running.
    ///
    /// # Panics
    /// If the pool has been shut down, or when called outside a Tokio runtime.
    pub fn start_sweeper(&self) {
        self.assert_running();
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(Sweeper::spawn(Arc::clone(&self.registry), self.config.sweep_interval));
        }
    }

    /// Shut the pool down.
    ///
    /// Order matters: the sweeper is stopped first so no sweep can run
    /// against a torn-down poll set, then the registry is drained, then
    /// backup polling and the poll set go away. Deferred work released by
    /// the drain gets a chance to run before this returns.
    ///
    /// # Panics
    /// If called twice.
    pub async fn shutdown(&self) {
        assert!(
            !self.shut_down.swap(true, Ordering::AcqRel),
            "endpoint pool shut down twice"
        );
        tracing::info!("Endpoint pool shutting down");

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop();
            sweeper.join().await;
        }

        let released = self.registry.drain();

        let backup_poller = self.backup_poller.lock().take();
        if let Some(poller) = backup_poller {
            poller.stop().await;
        }
        if let Some(poll_set) = self.registry.poll_set() {
            let stale = poll_set.clear();
            if stale > 0 {
                tracing::warn!(stale, "Poll set still had members at shutdown");
            }
        }

        tokio::task::yield_now().await;
        tracing::info!(released, "Endpoint pool shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn assert_running(&self) {
        assert!(!self.is_shut_down(), "endpoint pool used after shutdown");
    }
}

impl<E: Endpoint> Drop for EndpointPool<E> {
    fn drop(&mut self) {
        // Background tasks must not outlive the pool if shutdown was skipped
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.stop();
        }
        if let Some(poller) = self.backup_poller.get_mut().take() {
            poller.cancel();
        }
    }
}

impl<E: Endpoint> std::fmt::Debug for EndpointPool<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointPool")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serial_test::serial;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::pool::config::POLL_STRATEGY_ENV;
    use crate::pool::test_util::{init_tracing, TestEndpoint};

    fn config() -> PoolConfig {
        PoolConfig::default()
            .sweep_interval(Duration::from_millis(100))
            .backup_poll_interval(Duration::from_millis(50))
    }

    #[test]
    fn test_start_outside_runtime() {
        let result = EndpointPool::<TestEndpoint>::start(PoolConfig::default());
        let err = assert_err!(result);
        assert!(matches!(err, PoolError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_find_and_sweep() {
        init_tracing();
        let pool = assert_ok!(EndpointPool::start(config()));
        let (endpoint, probe) = TestEndpoint::new("10.0.0.1:443");

        let handle = pool.register(endpoint);
        let key = handle.fingerprint().clone();
        assert!(pool.find(&key).is_some());
        assert!(pool.registry().poll_set().unwrap().contains(&key));

        drop(handle);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(pool.find(&key).is_none());
        assert!(probe.is_dropped());
        assert!(!pool.registry().poll_set().unwrap().contains(&key));
        assert_eq!(pool.stats().evicted, 1);

        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_restart_sweeper() {
        let pool = assert_ok!(EndpointPool::start(config()));
        pool.stop_sweeper().await;
        assert!(!pool.is_sweeping());

        let (endpoint, probe) = TestEndpoint::new("10.0.0.1:443");
        drop(pool.register(endpoint));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(pool.registry().len(), 1);
        assert!(!probe.is_dropped());

        pool.start_sweeper();
        assert!(pool.is_sweeping());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(pool.registry().is_empty());
        assert!(probe.is_dropped());

        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_poller_drives_registered_endpoints() {
        let pool = assert_ok!(EndpointPool::start(config()));
        pool.stop_sweeper().await;

        let (endpoint, probe) = TestEndpoint::new("10.0.0.1:443");
        let _handle = pool.register(endpoint);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(probe.polls(), 2);

        pool.shutdown().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(probe.polls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_poll_set() {
        let pool = assert_ok!(EndpointPool::<TestEndpoint>::start(config().disable_poll_set()));

        assert!(pool.registry().poll_set().is_none());
        let (endpoint, _) = TestEndpoint::new("10.0.0.1:443");
        let handle = pool.register(endpoint);
        assert_eq!(handle.ref_count(), 2);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_pool_references() {
        let pool = assert_ok!(EndpointPool::start(config()));
        let (idle, idle_probe) = TestEndpoint::new("idle:1");
        let (held, held_probe) = TestEndpoint::new("held:1");
        drop(pool.register(idle));
        let held = pool.register(held);

        pool.shutdown().await;

        assert!(pool.is_shut_down());
        assert!(pool.registry().is_empty());
        assert!(pool.registry().poll_set().unwrap().is_empty());
        assert!(idle_probe.is_dropped());
        assert!(!held_probe.is_dropped());
        assert!(held.is_unused());
    }

    #[tokio::test]
    #[should_panic(expected = "shut down twice")]
    async fn test_double_shutdown_panics() {
        let pool = EndpointPool::<TestEndpoint>::start(config()).unwrap();
        pool.shutdown().await;
        pool.shutdown().await;
    }

    #[tokio::test]
    #[should_panic(expected = "used after shutdown")]
    async fn test_register_after_shutdown_panics() {
        let pool = EndpointPool::start(config()).unwrap();
        pool.shutdown().await;

        let (endpoint, _) = TestEndpoint::new("10.0.0.1:443");
        pool.register(endpoint);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_endpoints() {
        let pool = Arc::new(EndpointPool::start(config()).unwrap());
        pool.stop_sweeper().await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let pool = Arc::clone(&pool);
                tokio::task::spawn_blocking(move || {
                    let key = Fingerprint::new(format!("backend-{}:443", i % 4));
                    let (endpoint, _) = TestEndpoint::with_key(key, i);
                    pool.register(endpoint)
                })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(pool.registry().len(), 4);
        for handle in &handles {
            let pooled = pool.find(handle.fingerprint()).unwrap();
            assert!(EndpointHandle::ptr_eq(&pooled, handle));
        }

        pool.shutdown().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_from_env_without_poll_strategy() {
        let result = temp_env::with_var(POLL_STRATEGY_ENV, Some("none"), || {
            EndpointPool::<TestEndpoint>::from_env()
        });
        let pool = assert_ok!(result);

        assert!(!pool.config().poll_set_enabled);
        assert!(pool.registry().poll_set().is_none());

        let (endpoint, _) = TestEndpoint::new("10.0.0.1:443");
        let handle = pool.register(endpoint);
        assert_eq!(handle.ref_count(), 2);

        pool.shutdown().await;
    }
}
