//! Long-running tracker service

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::transactions::{
    BlockchainProvider, SweepReport, TransactionRegistry, TransactionTracker,
};
use crate::infrastructure::{JsonFileStore, JsonRpcProvider, OrderBookClient, TracingNotifier};
use crate::shared::errors::AppError;

/// Owns the tracker and the provider it polls with
pub struct TrackerService {
    tracker: Arc<TransactionTracker>,
    provider: Arc<dyn BlockchainProvider>,
}

impl TrackerService {
    pub fn new(tracker: Arc<TransactionTracker>, provider: Arc<dyn BlockchainProvider>) -> Self {
        Self { tracker, provider }
    }

    /// Wire the tracker to the file store, JSON-RPC node and order book named
    /// in the config
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let store = Arc::new(JsonFileStore::new(Path::new(&config.tracker.data_dir)));
        let registry = TransactionRegistry::load(store, config.network.chain_id);
        let provider: Arc<dyn BlockchainProvider> = Arc::new(JsonRpcProvider::new(
            config.network.rpc_url.clone(),
            config.request_timeout(),
        )?);
        let order_book = Arc::new(OrderBookClient::new(
            config.network.order_book_url.clone(),
            config.request_timeout(),
        )?);

        let tracker = Arc::new(TransactionTracker::new(
            registry,
            provider.clone(),
            order_book,
            Arc::new(TracingNotifier),
            config.tracker_config(),
        ));

        Ok(Self::new(tracker, provider))
    }

    pub fn tracker(&self) -> &Arc<TransactionTracker> {
        &self.tracker
    }

    /// Fetch the latest block and run one sweep over pending records
    pub async fn sweep_once(&self) -> Result<SweepReport, AppError> {
        let block = self.provider.block_number().await?;
        let report = self.tracker.handle_pending_transactions(block).await;
        debug!(
            "Block {}: checked {}, confirmed {}, failed {}, skipped {}",
            block, report.checked, report.confirmed, report.failed, report.skipped
        );
        Ok(report)
    }

    /// Sweep on every tick until `shutdown` resolves. Provider errors are
    /// logged and the loop keeps going.
    pub async fn watch<F>(&self, interval: Duration, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("👀 Watching pending transactions every {:?}", interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Stopping transaction watcher");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.confirmed + report.failed > 0 => {
                            info!(
                                "✅ Sweep finished: {} confirmed, {} failed",
                                report.confirmed, report.failed
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!("⚠️ Sweep failed: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transactions::tracker_support::{harness, Harness};
    use crate::domain::transactions::{NewTransaction, TransactionAction, TransactionStatus, TransactionType};

    fn service() -> (TrackerService, Harness) {
        let h = harness();
        let service = TrackerService::new(h.tracker.clone(), h.provider.clone());
        (service, h)
    }

    async fn add_tx(service: &TrackerService, id: &str) {
        service
            .tracker()
            .add_transaction(NewTransaction {
                id: id.to_string(),
                kind: TransactionType::Tx,
                action: TransactionAction::Wrap,
                summary: "Wrap 1 ETH to WETH".to_string(),
                details: None,
                receipt: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_once_confirms_mined_tx() {
        let (service, h) = service();
        add_tx(&service, "0xaa").await;
        h.provider.confirm("0xaa");

        let report = service.sweep_once().await.unwrap();

        assert_eq!(report.confirmed, 1);
        let record = service
            .tracker()
            .get_transaction("0xaa", TransactionType::Tx)
            .await
            .unwrap();
        assert_eq!(record.status, TransactionStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let (service, h) = service();
        add_tx(&service, "0xbb").await;
        h.provider.confirm("0xbb");

        service
            .watch(
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap();

        assert!(service.tracker().pending_transactions().await.is_empty());
    }
}
