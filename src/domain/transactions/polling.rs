//! Adaptive polling cadence for pending on-chain transactions

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::{TransactionRecord, TransactionStatus};
use crate::shared::utils::minutes_between;

/// Pending longer than this is checked every `LONG_PENDING_BLOCKS`.
const LONG_PENDING_MINUTES: f64 = 60.0;
const LONG_PENDING_BLOCKS: u64 = 10;
const MEDIUM_PENDING_MINUTES: f64 = 5.0;
const MEDIUM_PENDING_BLOCKS: u64 = 3;

/// Whether a `tx` record should be polled at `block_number`.
pub fn should_check_tx(
    record: &TransactionRecord,
    block_number: u64,
    now: DateTime<Utc>,
    processed: &HashSet<String>,
) -> bool {
    if record.status == TransactionStatus::Confirmed || processed.contains(&record.id) {
        return false;
    }

    let last_checked = match record.last_checked_block_number {
        Some(block) => block,
        None => return true,
    };

    let blocks_since = block_number.saturating_sub(last_checked);
    if blocks_since < 1 {
        return false;
    }

    let minutes_pending = minutes_between(record.added_time, now);
    if minutes_pending > LONG_PENDING_MINUTES {
        blocks_since >= LONG_PENDING_BLOCKS
    } else if minutes_pending > MEDIUM_PENDING_MINUTES {
        blocks_since >= MEDIUM_PENDING_BLOCKS
    } else {
        true
    }
}
