//! Transactions domain - persisted registry of submitted transactions and
//! orders, their status state machine and the polling tracker

mod interfaces;
mod polling;
mod registry;
mod tracker;

pub use interfaces::{
    BlockchainProvider, Notification, NotificationSink, OrderBookService, TransactionMetadata,
};
pub use polling::should_check_tx;
pub use registry::{
    TransactionRegistry, TransactionState, TransactionsMap, TRANSACTIONS_KEY,
    TRANSACTIONS_SCHEMA_VERSION,
};
pub use tracker::{ExplorerLinks, SweepReport, TrackerConfig, TransactionTracker};

#[cfg(test)]
pub(crate) use tracker::tests as tracker_support;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared::errors::RegistryError;
use crate::shared::utils::u128_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Tx,
    Order,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Tx => "tx",
            TransactionType::Order => "order",
        }
    }
}

impl FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tx" => Ok(TransactionType::Tx),
            "order" => Ok(TransactionType::Order),
            _ => Err(anyhow::anyhow!("Unknown transaction type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionAction {
    Trade,
    Wrap,
    Unwrap,
    Approve,
    Claim,
    Invest,
    Withdraw,
}

impl TransactionAction {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionAction::Trade => "Trade",
            TransactionAction::Wrap => "Wrap",
            TransactionAction::Unwrap => "Unwrap",
            TransactionAction::Approve => "Approve",
            TransactionAction::Claim => "Claim",
            TransactionAction::Invest => "Invest",
            TransactionAction::Withdraw => "Withdraw",
        }
    }
}

impl FromStr for TransactionAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trade" | "swap" => Ok(TransactionAction::Trade),
            "wrap" => Ok(TransactionAction::Wrap),
            "unwrap" => Ok(TransactionAction::Unwrap),
            "approve" => Ok(TransactionAction::Approve),
            "claim" => Ok(TransactionAction::Claim),
            "invest" => Ok(TransactionAction::Invest),
            "withdraw" => Ok(TransactionAction::Withdraw),
            _ => Err(anyhow::anyhow!("Unknown transaction action: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelling,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Cancelling => "cancelling",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed | TransactionStatus::Expired | TransactionStatus::Cancelled
        )
    }

    /// Statuses only move forward; a terminal record never returns to pending.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            TransactionStatus::Pending => true,
            TransactionStatus::Cancelling => matches!(
                next,
                TransactionStatus::Cancelled | TransactionStatus::Confirmed | TransactionStatus::Expired
            ),
            TransactionStatus::Confirmed | TransactionStatus::Expired | TransactionStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplacementReason {
    #[serde(rename = "txSpeedUp")]
    SpeedUp,
    #[serde(rename = "txCancel")]
    Cancel,
}

impl FromStr for ReplacementReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speed-up" | "speedup" | "txspeedup" => Ok(ReplacementReason::SpeedUp),
            "cancel" | "txcancel" => Ok(ReplacementReason::Cancel),
            _ => Err(anyhow::anyhow!("Unknown replacement reason: {}", s)),
        }
    }
}

/// Normalized subset of an on-chain transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub block_hash: String,
    pub block_number: u64,
    pub contract_address: Option<String>,
    pub from: String,
    /// 1 on success, 0 on revert
    pub status: Option<u64>,
    pub to: Option<String>,
    pub transaction_hash: String,
    pub transaction_index: u64,
}

/// Off-chain order as reported by the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub uid: String,
    pub status: String,
    #[serde(with = "u128_string")]
    pub executed_buy_amount: u128,
    #[serde(with = "u128_string")]
    pub executed_sell_amount: u128,
}

impl OrderReceipt {
    /// Both legs have executed
    pub fn is_settled(&self) -> bool {
        self.executed_buy_amount > 0 && self.executed_sell_amount > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    Tx(TxReceipt),
    Order(OrderReceipt),
}

/// Type-specific part of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordPayload {
    Tx {
        #[serde(default)]
        receipt: Option<TxReceipt>,
    },
    Order {
        #[serde(default)]
        receipt: Option<OrderReceipt>,
    },
}

impl RecordPayload {
    pub fn empty(kind: TransactionType) -> Self {
        match kind {
            TransactionType::Tx => RecordPayload::Tx { receipt: None },
            TransactionType::Order => RecordPayload::Order { receipt: None },
        }
    }

    pub fn kind(&self) -> TransactionType {
        match self {
            RecordPayload::Tx { .. } => TransactionType::Tx,
            RecordPayload::Order { .. } => TransactionType::Order,
        }
    }
}

/// Composite registry key; unique per network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub kind: TransactionType,
    pub id: String,
}

impl RecordKey {
    pub fn new(id: impl Into<String>, kind: TransactionType) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    #[serde(flatten)]
    pub payload: RecordPayload,
    pub action: TransactionAction,
    pub status: TransactionStatus,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    pub summary: String,
    pub added_time: DateTime<Utc>,
    #[serde(default)]
    pub confirmed_time: Option<DateTime<Utc>>,
    pub from: String,
    #[serde(default)]
    pub last_checked_block_number: Option<u64>,
    #[serde(default)]
    pub original_id: Option<String>,
    #[serde(default)]
    pub replacement_reason: Option<ReplacementReason>,
}

impl TransactionRecord {
    pub fn kind(&self) -> TransactionType {
        self.payload.kind()
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.id.clone(), self.kind())
    }

    /// Status shown to the user; self-cancelled trades read as cancelled
    pub fn display_status(&self) -> TransactionStatus {
        if self.replacement_reason == Some(ReplacementReason::Cancel) {
            TransactionStatus::Cancelled
        } else {
            self.status
        }
    }

    /// Shallow per-field merge of `update`; the id is handled by the registry.
    pub fn apply(&mut self, update: TransactionUpdate) -> Result<(), RegistryError> {
        if let Some(status) = update.status {
            if !self.status.can_transition_to(status) {
                return Err(RegistryError::StatusRegression {
                    id: self.id.clone(),
                    from: self.status.to_string(),
                    to: status.to_string(),
                });
            }
        }
        if let Some(receipt) = update.receipt {
            match (&mut self.payload, receipt) {
                (RecordPayload::Tx { receipt }, Receipt::Tx(new)) => *receipt = Some(new),
                (RecordPayload::Order { receipt }, Receipt::Order(new)) => *receipt = Some(new),
                _ => return Err(RegistryError::ReceiptMismatch(self.id.clone())),
            }
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(summary) = update.summary {
            self.summary = summary;
        }
        if let Some(details) = update.details {
            self.details = Some(details);
        }
        if let Some(confirmed_time) = update.confirmed_time {
            self.confirmed_time = Some(confirmed_time);
        }
        if let Some(block) = update.last_checked_block_number {
            self.last_checked_block_number = Some(block);
        }
        if let Some(reason) = update.replacement_reason {
            self.replacement_reason = Some(reason);
        }
        Ok(())
    }
}

/// A submission about to be registered
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub id: String,
    pub kind: TransactionType,
    pub action: TransactionAction,
    pub summary: String,
    pub details: Option<serde_json::Value>,
    pub receipt: Option<Receipt>,
}

/// Partial update of a record. `None` fields are left untouched; a new `id`
/// turns the update into a replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    pub id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub receipt: Option<Receipt>,
    pub summary: Option<String>,
    pub details: Option<serde_json::Value>,
    pub confirmed_time: Option<DateTime<Utc>>,
    pub last_checked_block_number: Option<u64>,
    pub replacement_reason: Option<ReplacementReason>,
}

/// Confirmed, not a self-cancel, and the receipt reports success
pub fn is_successful_transaction(record: &TransactionRecord) -> bool {
    if record.status != TransactionStatus::Confirmed
        || record.replacement_reason == Some(ReplacementReason::Cancel)
    {
        return false;
    }
    match &record.payload {
        RecordPayload::Tx { receipt } => receipt.as_ref().and_then(|r| r.status) == Some(1),
        RecordPayload::Order { receipt } => receipt.as_ref().map(|r| r.status == "fulfilled").unwrap_or(false),
    }
}
