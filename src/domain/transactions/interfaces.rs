//! Collaborators the tracker talks to

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{OrderReceipt, TransactionStatus, TxReceipt};
use crate::shared::errors::ProviderError;

/// Chain access needed to follow submitted transactions
#[async_trait]
pub trait BlockchainProvider: Send + Sync {
    /// `None` while the transaction is still unmined
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, ProviderError>;

    async fn block_number(&self) -> Result<u64, ProviderError>;
}

/// Off-chain order book lookups
#[async_trait]
pub trait OrderBookService: Send + Sync {
    async fn get_order(&self, uid: &str) -> Result<Option<OrderReceipt>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: super::TransactionType,
    pub status: TransactionStatus,
    pub is_success: bool,
    pub explorer_link: String,
}

/// User-facing event emitted on add and on confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub metadata: TransactionMetadata,
}

/// Fire-and-forget notification delivery
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}
