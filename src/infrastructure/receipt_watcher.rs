//! Confirmation listener that polls the provider for a receipt

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::trade::{ConfirmationListener, SubmittedTx};
use crate::domain::transactions::{BlockchainProvider, TxReceipt};
use crate::shared::errors::ListenerError;

pub struct ReceiptWatcher {
    provider: Arc<dyn BlockchainProvider>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReceiptWatcher {
    pub fn new(provider: Arc<dyn BlockchainProvider>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            provider,
            poll_interval,
            max_wait,
        }
    }
}

#[async_trait]
impl ConfirmationListener for ReceiptWatcher {
    async fn wait(&self, tx: &SubmittedTx) -> Result<TxReceipt, ListenerError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            match self.provider.get_transaction_receipt(&tx.hash).await {
                Ok(Some(receipt)) if receipt.status == Some(0) => {
                    return Err(ListenerError::Reverted(tx.hash.clone()));
                }
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => debug!("Receipt poll for {} failed: {}", tx.hash, e),
            }

            if Instant::now() >= deadline {
                return Err(ListenerError::Dropped(tx.hash.clone()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
