//! Periodic pool snapshot refresh

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::quote::{PoolSnapshot, RoutingOracle};
use crate::shared::errors::OracleError;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Keeps the latest pool snapshot of the routing oracle. A failed refresh
/// keeps the previous snapshot.
pub struct PoolDataRefresher {
    oracle: Arc<dyn RoutingOracle>,
    snapshot: RwLock<Option<Arc<PoolSnapshot>>>,
    initialized: AtomicBool,
    pools_loading: AtomicBool,
    interval: Duration,
    fetch_timeout: Duration,
}

impl PoolDataRefresher {
    pub fn new(oracle: Arc<dyn RoutingOracle>, interval: Duration, fetch_timeout: Duration) -> Self {
        Self {
            oracle,
            snapshot: RwLock::new(None),
            initialized: AtomicBool::new(false),
            pools_loading: AtomicBool::new(true),
            interval,
            fetch_timeout,
        }
    }

    /// Mark the engine initialized and load the first snapshot
    pub async fn init(&self) -> Result<(), OracleError> {
        self.initialized.store(true, Ordering::SeqCst);
        self.refresh().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// True until the first snapshot has been fetched
    pub fn pools_loading(&self) -> bool {
        self.pools_loading.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Option<Arc<PoolSnapshot>> {
        self.snapshot.read().await.clone()
    }

    /// Fetch a new snapshot. Returns `Ok(false)` when skipped because the
    /// engine is not initialized yet.
    pub async fn refresh(&self) -> Result<bool, OracleError> {
        if !self.is_initialized() {
            debug!("Pool refresh skipped, quote engine not initialized");
            return Ok(false);
        }

        let fetched = timeout(self.fetch_timeout, self.oracle.refresh_pools())
            .await
            .map_err(|_| {
                OracleError::PoolFetch(format!("timed out after {:?}", self.fetch_timeout))
            })??;

        debug!("Pool snapshot refreshed at {}", fetched.fetched_at);
        *self.snapshot.write().await = Some(Arc::new(fetched));
        self.pools_loading.store(false, Ordering::SeqCst);
        Ok(true)
    }

    /// Refresh on a fixed interval until the returned task is stopped.
    /// `on_refresh` runs after every successful refresh.
    pub fn spawn<F, Fut>(self: &Arc<Self>, on_refresh: F) -> RefreshTask
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let refresher = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(refresher.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            info!("🔄 Pool refresh every {:?}", refresher.interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        match refresher.refresh().await {
                            Ok(true) => on_refresh().await,
                            Ok(false) => {}
                            Err(e) => warn!("Pool refresh failed, keeping previous snapshot: {}", e),
                        }
                    }
                }
            }
            debug!("Pool refresh stopped");
        });

        RefreshTask {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }
}

/// Handle to a running refresh loop
pub struct RefreshTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!("Pool refresh task ended abnormally: {}", e);
        }
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::test_support::MockOracle;
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicUsize;

    fn refresher(oracle: Arc<MockOracle>, every: Duration) -> Arc<PoolDataRefresher> {
        Arc::new(PoolDataRefresher::new(oracle, every, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_refresh_skipped_before_init() {
        let oracle = Arc::new(MockOracle::returning(1, Decimal::ONE));
        let refresher = refresher(oracle.clone(), DEFAULT_REFRESH_INTERVAL);

        assert!(!refresher.refresh().await.unwrap());
        assert_eq!(oracle.refresh_calls.load(Ordering::SeqCst), 0);
        assert!(refresher.pools_loading());
        assert!(refresher.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_init_loads_snapshot() {
        let oracle = Arc::new(MockOracle::returning(1, Decimal::ONE));
        let refresher = refresher(oracle.clone(), DEFAULT_REFRESH_INTERVAL);

        refresher.init().await.unwrap();
        assert!(refresher.is_initialized());
        assert!(!refresher.pools_loading());
        assert!(refresher.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_spawned_loop_refreshes_until_stopped() {
        let oracle = Arc::new(MockOracle::returning(1, Decimal::ONE));
        let refresher = refresher(oracle.clone(), Duration::from_millis(10));
        refresher.init().await.unwrap();

        let requotes = Arc::new(AtomicUsize::new(0));
        let counter = requotes.clone();
        let task = refresher.spawn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(task.is_running());
        task.stop().await;

        let after_stop = oracle.refresh_calls.load(Ordering::SeqCst);
        assert!(after_stop >= 3);
        assert!(requotes.load(Ordering::SeqCst) >= 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(oracle.refresh_calls.load(Ordering::SeqCst), after_stop);
    }
}
