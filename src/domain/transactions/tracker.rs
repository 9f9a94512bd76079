//! Transaction/order lifecycle tracker
//!
//! Owns the registry, polls pending records on every new block and emits a
//! notification when a record is added and when it confirms.

use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{
    is_successful_transaction, should_check_tx, BlockchainProvider, NewTransaction, Notification,
    NotificationSink, OrderBookService, Receipt, RecordKey, RecordPayload, ReplacementReason,
    TransactionMetadata, TransactionRecord, TransactionRegistry, TransactionStatus, TransactionType,
    TransactionUpdate, TransactionsMap,
};
use crate::domain::transactions::OrderReceipt;
use crate::math::to_decimal;
use crate::shared::errors::RegistryError;
use crate::shared::types::TokenInfo;
use crate::shared::utils::{format_amount, generate_id};

/// Block explorer roots for links in notifications
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerLinks {
    pub tx_url: String,
    pub order_url: String,
}

impl Default for ExplorerLinks {
    fn default() -> Self {
        Self {
            tx_url: "https://etherscan.io".to_string(),
            order_url: "https://explorer.cow.fi".to_string(),
        }
    }
}

impl ExplorerLinks {
    pub fn link(&self, id: &str, kind: TransactionType) -> String {
        match kind {
            TransactionType::Tx => format!("{}/tx/{}", self.tx_url.trim_end_matches('/'), id),
            TransactionType::Order => format!("{}/orders/{}", self.order_url.trim_end_matches('/'), id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Account recorded as `from` on new records
    pub account: String,
    /// Records older than this are hidden from `transactions()`
    pub retention: chrono::Duration,
    pub poll_timeout: Duration,
    pub explorer: ExplorerLinks,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            retention: chrono::Duration::days(7),
            poll_timeout: Duration::from_secs(10),
            explorer: ExplorerLinks::default(),
        }
    }
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Confirmed,
    Pending,
    Failed,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryTokens {
    token_in: TokenInfo,
    token_out: TokenInfo,
}

/// Removes its key from the in-flight set when dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

pub struct TransactionTracker {
    registry: RwLock<TransactionRegistry>,
    provider: Arc<dyn BlockchainProvider>,
    order_book: Arc<dyn OrderBookService>,
    notifier: Arc<dyn NotificationSink>,
    config: TrackerConfig,
    processed: RwLock<HashSet<String>>,
    in_flight: Mutex<HashSet<String>>,
}

impl TransactionTracker {
    pub fn new(
        registry: TransactionRegistry,
        provider: Arc<dyn BlockchainProvider>,
        order_book: Arc<dyn OrderBookService>,
        notifier: Arc<dyn NotificationSink>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            provider,
            order_book,
            notifier,
            config,
            processed: RwLock::new(HashSet::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn BlockchainProvider> {
        &self.provider
    }

    /// Register a freshly submitted transaction or order as pending.
    pub async fn add_transaction(&self, new: NewTransaction) -> Result<TransactionRecord, RegistryError> {
        let mut payload = RecordPayload::empty(new.kind);
        match (&mut payload, new.receipt) {
            (RecordPayload::Tx { receipt }, Some(Receipt::Tx(r))) => *receipt = Some(r),
            (RecordPayload::Order { receipt }, Some(Receipt::Order(r))) => *receipt = Some(r),
            (_, None) => {}
            _ => return Err(RegistryError::ReceiptMismatch(new.id)),
        }

        let record = TransactionRecord {
            id: new.id,
            payload,
            action: new.action,
            status: TransactionStatus::Pending,
            details: new.details,
            summary: new.summary,
            added_time: Utc::now(),
            confirmed_time: None,
            from: self.config.account.clone(),
            last_checked_block_number: None,
            original_id: None,
            replacement_reason: None,
        };

        self.registry.write().await.insert(record.clone())?;
        info!("Tracking {} {}: {}", record.kind().as_str(), record.id, record.summary);
        self.notifier.notify(self.notification_for(&record));
        Ok(record)
    }

    pub async fn get_transaction(&self, id: &str, kind: TransactionType) -> Option<TransactionRecord> {
        self.registry.read().await.get(&RecordKey::new(id, kind)).cloned()
    }

    /// Merge a partial update; `None` when no such record exists.
    pub async fn update_transaction(
        &self,
        id: &str,
        kind: TransactionType,
        update: TransactionUpdate,
    ) -> Result<Option<TransactionRecord>, RegistryError> {
        self.registry
            .write()
            .await
            .update(&RecordKey::new(id, kind), update)
    }

    /// Move a record to the id of its replacement (speed-up or cancel).
    pub async fn replace_transaction(
        &self,
        old_id: &str,
        kind: TransactionType,
        new_id: &str,
        reason: ReplacementReason,
    ) -> Result<Option<TransactionRecord>, RegistryError> {
        let replaced = self
            .update_transaction(
                old_id,
                kind,
                TransactionUpdate {
                    id: Some(new_id.to_string()),
                    replacement_reason: Some(reason),
                    ..Default::default()
                },
            )
            .await?;
        if replaced.is_some() {
            info!("Replaced {} with {} ({:?})", old_id, new_id, reason);
        }
        Ok(replaced)
    }

    /// Confirm a record with its receipt and notify. Records already confirmed
    /// are left alone, so concurrent finalizers notify once.
    pub async fn finalize_transaction(
        &self,
        id: &str,
        kind: TransactionType,
        receipt: Receipt,
    ) -> Result<Option<TransactionRecord>, RegistryError> {
        let key = RecordKey::new(id, kind);
        let confirmed = {
            let mut registry = self.registry.write().await;
            let record = match registry.get(&key) {
                Some(record) if record.status != TransactionStatus::Confirmed => record.clone(),
                _ => return Ok(None),
            };

            let summary = match &receipt {
                Receipt::Order(order) => settled_order_summary(&record, order),
                Receipt::Tx(_) => None,
            };

            registry.update(
                &key,
                TransactionUpdate {
                    status: Some(TransactionStatus::Confirmed),
                    receipt: Some(receipt),
                    summary,
                    confirmed_time: Some(Utc::now()),
                    ..Default::default()
                },
            )?
        };

        let record = match confirmed {
            Some(record) => record,
            None => return Ok(None),
        };
        self.processed.write().await.insert(record.id.clone());

        info!("Confirmed {} {}", record.kind().as_str(), record.id);
        self.notifier.notify(self.notification_for(&record));
        Ok(Some(record))
    }

    /// Remember a hash handled by its confirmation listener this session
    pub async fn mark_processed(&self, id: &str) {
        self.processed.write().await.insert(id.to_string());
    }

    pub async fn is_processed(&self, id: &str) -> bool {
        self.processed.read().await.contains(id)
    }

    pub async fn clear_all_transactions(&self) -> Result<(), RegistryError> {
        self.registry.write().await.clear()?;
        info!("Cleared all transactions");
        Ok(())
    }

    /// Every record of the active network
    pub async fn all_transactions(&self) -> TransactionsMap {
        self.registry.read().await.records().clone()
    }

    /// Records within the retention window, newest first
    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        let cutoff = Utc::now() - self.config.retention;
        let mut records: Vec<TransactionRecord> = self
            .registry
            .read()
            .await
            .records()
            .values()
            .filter(|record| record.added_time > cutoff)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.added_time.cmp(&a.added_time));
        records
    }

    pub async fn pending_transactions(&self) -> Vec<TransactionRecord> {
        self.transactions()
            .await
            .into_iter()
            .filter(|record| record.status == TransactionStatus::Pending)
            .collect()
    }

    pub async fn pending_order_activity(&self) -> Vec<TransactionRecord> {
        self.pending_of(TransactionType::Order).await
    }

    pub async fn pending_tx_activity(&self) -> Vec<TransactionRecord> {
        self.pending_of(TransactionType::Tx).await
    }

    async fn pending_of(&self, kind: TransactionType) -> Vec<TransactionRecord> {
        self.pending_transactions()
            .await
            .into_iter()
            .filter(|record| record.kind() == kind)
            .collect()
    }

    pub fn explorer_link(&self, id: &str, kind: TransactionType) -> String {
        self.config.explorer.link(id, kind)
    }

    /// Poll every pending record within the retention window that is due at
    /// `block_number`. Records are checked concurrently, each key at most
    /// once at a time.
    pub async fn handle_pending_transactions(&self, block_number: u64) -> SweepReport {
        let now = Utc::now();
        let pending = self.pending_transactions().await;
        let total = pending.len();
        let due: Vec<TransactionRecord> = {
            let processed = self.processed.read().await;
            pending
                .into_iter()
                .filter(|record| match record.kind() {
                    TransactionType::Tx => should_check_tx(record, block_number, now, &processed),
                    TransactionType::Order => true,
                })
                .collect()
        };

        let claimed: Vec<(TransactionRecord, InFlightGuard<'_>)> = due
            .into_iter()
            .filter_map(|record| self.claim(&record).map(|guard| (record, guard)))
            .collect();

        let mut report = SweepReport {
            checked: claimed.len(),
            skipped: total - claimed.len(),
            ..Default::default()
        };

        let checks = claimed.into_iter().map(|(record, guard)| async move {
            let outcome = match record.kind() {
                TransactionType::Tx => self.check_tx_activity(&record).await,
                TransactionType::Order => self.check_order_activity(&record).await,
            };
            self.touch(&record, block_number).await;
            drop(guard);
            outcome
        });

        for outcome in join_all(checks).await {
            match outcome {
                PollOutcome::Confirmed => report.confirmed += 1,
                PollOutcome::Failed => report.failed += 1,
                PollOutcome::Pending => {}
            }
        }

        debug!("Sweep at block {}: {:?}", block_number, report);
        report
    }

    fn claim(&self, record: &TransactionRecord) -> Option<InFlightGuard<'_>> {
        let key = record.key().to_string();
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(key.clone()) {
            debug!("Check for {} already in flight", key);
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            key,
        })
    }

    async fn check_tx_activity(&self, record: &TransactionRecord) -> PollOutcome {
        let lookup = timeout(
            self.config.poll_timeout,
            self.provider.get_transaction_receipt(&record.id),
        )
        .await;

        match lookup {
            Ok(Ok(Some(receipt))) => self.finalize_polled(record, Receipt::Tx(receipt)).await,
            Ok(Ok(None)) => PollOutcome::Pending,
            Ok(Err(e)) => {
                warn!("Receipt lookup for {} failed: {}", record.id, e);
                PollOutcome::Failed
            }
            Err(_) => {
                warn!(
                    "Receipt lookup for {} timed out after {:?}",
                    record.id, self.config.poll_timeout
                );
                PollOutcome::Failed
            }
        }
    }

    async fn check_order_activity(&self, record: &TransactionRecord) -> PollOutcome {
        let lookup = timeout(self.config.poll_timeout, self.order_book.get_order(&record.id)).await;

        match lookup {
            Ok(Ok(Some(order))) if order.is_settled() => {
                self.finalize_polled(record, Receipt::Order(order)).await
            }
            Ok(Ok(_)) => PollOutcome::Pending,
            Ok(Err(e)) => {
                warn!("Order lookup for {} failed: {}", record.id, e);
                PollOutcome::Failed
            }
            Err(_) => {
                warn!(
                    "Order lookup for {} timed out after {:?}",
                    record.id, self.config.poll_timeout
                );
                PollOutcome::Failed
            }
        }
    }

    async fn finalize_polled(&self, record: &TransactionRecord, receipt: Receipt) -> PollOutcome {
        match self.finalize_transaction(&record.id, record.kind(), receipt).await {
            Ok(Some(_)) => PollOutcome::Confirmed,
            Ok(None) => PollOutcome::Pending,
            Err(e) => {
                warn!("Failed to finalize {}: {}", record.id, e);
                PollOutcome::Failed
            }
        }
    }

    async fn touch(&self, record: &TransactionRecord, block_number: u64) {
        let update = TransactionUpdate {
            last_checked_block_number: Some(block_number),
            ..Default::default()
        };
        if let Err(e) = self.update_transaction(&record.id, record.kind(), update).await {
            warn!("Failed to record check of {}: {}", record.id, e);
        }
    }

    fn notification_for(&self, record: &TransactionRecord) -> Notification {
        let status = record.display_status();
        Notification {
            id: generate_id(),
            title: format!("{} {}", record.action.label(), status),
            message: record.summary.clone(),
            metadata: TransactionMetadata {
                id: record.id.clone(),
                kind: record.kind(),
                status,
                is_success: is_successful_transaction(record),
                explorer_link: self.explorer_link(&record.id, record.kind()),
            },
        }
    }
}

/// Summary rebuilt from the amounts the order actually executed with
fn settled_order_summary(record: &TransactionRecord, order: &OrderReceipt) -> Option<String> {
    let tokens: SummaryTokens = serde_json::from_value(record.details.clone()?).ok()?;
    let sold = to_decimal(order.executed_sell_amount, tokens.token_in.decimals).ok()?;
    let bought = to_decimal(order.executed_buy_amount, tokens.token_out.decimals).ok()?;
    Some(format!(
        "{} {} -> {} {}",
        format_amount(sold),
        tokens.token_in.symbol,
        format_amount(bought),
        tokens.token_out.symbol
    ))
}
