//! Per-network map of transaction records, persisted as one versioned blob

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{RecordKey, TransactionRecord, TransactionUpdate};
use crate::infrastructure::storage::Persistence;
use crate::shared::errors::RegistryError;
use crate::shared::types::NetworkId;

pub const TRANSACTIONS_KEY: &str = "transactions";

/// Bump when the record layout changes; older blobs are discarded.
pub const TRANSACTIONS_SCHEMA_VERSION: &str = "1.1.2";

/// Records of one network keyed by `{type}_{id}`
pub type TransactionsMap = BTreeMap<String, TransactionRecord>;
pub type TransactionState = BTreeMap<NetworkId, TransactionsMap>;

pub struct TransactionRegistry {
    network_id: NetworkId,
    state: TransactionState,
    store: Arc<dyn Persistence>,
}

impl TransactionRegistry {
    /// Load persisted state, falling back to an empty registry when the
    /// stored blob is missing, unreadable or from another schema version.
    pub fn load(store: Arc<dyn Persistence>, network_id: NetworkId) -> Self {
        let mut state: TransactionState = match store.load(TRANSACTIONS_KEY, TRANSACTIONS_SCHEMA_VERSION) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Stored transactions are malformed, starting empty: {}", e);
                    TransactionState::new()
                }
            },
            Ok(None) => TransactionState::new(),
            Err(e) => {
                warn!("Failed to load transactions, starting empty: {}", e);
                TransactionState::new()
            }
        };
        state.entry(network_id).or_default();

        debug!(
            "Loaded {} transactions for network {}",
            state.get(&network_id).map(|m| m.len()).unwrap_or(0),
            network_id
        );

        Self {
            network_id,
            state,
            store,
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    /// Records of the active network
    pub fn records(&self) -> &TransactionsMap {
        static EMPTY: TransactionsMap = BTreeMap::new();
        self.state.get(&self.network_id).unwrap_or(&EMPTY)
    }

    fn records_mut(&mut self) -> &mut TransactionsMap {
        self.state.entry(self.network_id).or_default()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&TransactionRecord> {
        self.records().get(&key.to_string())
    }

    /// Insert a new record. An existing key is left untouched.
    pub fn insert(&mut self, record: TransactionRecord) -> Result<(), RegistryError> {
        let key = record.key().to_string();
        if self.records().contains_key(&key) {
            return Err(RegistryError::DuplicateTransaction(record.id));
        }
        self.records_mut().insert(key, record);
        self.persist()
    }

    /// Merge `update` into the record at `key`. A changed id moves the record
    /// to its new key and remembers the previous id as `original_id`.
    /// Returns the updated record, or `None` when `key` is unknown.
    pub fn update(
        &mut self,
        key: &RecordKey,
        update: TransactionUpdate,
    ) -> Result<Option<TransactionRecord>, RegistryError> {
        let old_key = key.to_string();
        let mut record = match self.records().get(&old_key) {
            Some(record) => record.clone(),
            None => return Ok(None),
        };

        let new_id = update.id.clone().filter(|id| *id != record.id);
        record.apply(update)?;

        match new_id {
            Some(new_id) => {
                let new_key = RecordKey::new(new_id.clone(), record.kind()).to_string();
                if self.records().contains_key(&new_key) {
                    return Err(RegistryError::DuplicateTransaction(new_id));
                }
                record.original_id = Some(std::mem::replace(&mut record.id, new_id));

                let records = self.records_mut();
                records.remove(&old_key);
                records.insert(new_key, record.clone());
            }
            None => {
                self.records_mut().insert(old_key, record.clone());
            }
        }

        self.persist()?;
        Ok(Some(record))
    }

    /// Drop every record of the active network
    pub fn clear(&mut self) -> Result<(), RegistryError> {
        self.records_mut().clear();
        self.persist()
    }

    fn persist(&self) -> Result<(), RegistryError> {
        let value = serde_json::to_value(&self.state)
            .map_err(crate::shared::errors::StorageError::from)?;
        self.store
            .save(TRANSACTIONS_KEY, &value, TRANSACTIONS_SCHEMA_VERSION)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transactions::tests::record;
    use crate::domain::transactions::{ReplacementReason, TransactionStatus, TransactionType};
    use crate::infrastructure::storage::MemoryStore;

    fn registry() -> (TransactionRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TransactionRegistry::load(store.clone(), 1), store)
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (mut registry, _) = registry();
        registry.insert(record("0x1", TransactionType::Tx)).unwrap();

        let mut dup = record("0x1", TransactionType::Tx);
        dup.summary = "other".to_string();
        let err = registry.insert(dup).unwrap_err();

        assert_eq!(err.to_string(), "The transaction 0x1 already exists.");
        let key = RecordKey::new("0x1", TransactionType::Tx);
        assert_eq!(registry.get(&key).unwrap().summary, "1 WETH -> 2000 USDC");
    }

    #[test]
    fn test_same_id_different_type_allowed() {
        let (mut registry, _) = registry();
        registry.insert(record("0x1", TransactionType::Tx)).unwrap();
        registry.insert(record("0x1", TransactionType::Order)).unwrap();
        assert_eq!(registry.records().len(), 2);
    }

    #[test]
    fn test_replacement_moves_key() {
        let (mut registry, _) = registry();
        registry.insert(record("0xAAA", TransactionType::Tx)).unwrap();

        let old = RecordKey::new("0xAAA", TransactionType::Tx);
        let updated = registry
            .update(
                &old,
                TransactionUpdate {
                    id: Some("0xBBB".to_string()),
                    replacement_reason: Some(ReplacementReason::SpeedUp),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.original_id.as_deref(), Some("0xAAA"));
        assert!(registry.get(&old).is_none());
        let new = RecordKey::new("0xBBB", TransactionType::Tx);
        assert_eq!(registry.get(&new).unwrap().id, "0xBBB");
    }

    #[test]
    fn test_chained_replacement_links_previous_id() {
        let (mut registry, _) = registry();
        registry.insert(record("0xAAA", TransactionType::Tx)).unwrap();

        for (from, to) in [("0xAAA", "0xBBB"), ("0xBBB", "0xCCC")] {
            registry
                .update(
                    &RecordKey::new(from, TransactionType::Tx),
                    TransactionUpdate {
                        id: Some(to.to_string()),
                        replacement_reason: Some(ReplacementReason::SpeedUp),
                        ..Default::default()
                    },
                )
                .unwrap()
                .unwrap();
        }

        let latest = registry.get(&RecordKey::new("0xCCC", TransactionType::Tx)).unwrap();
        assert_eq!(latest.original_id.as_deref(), Some("0xBBB"));
        assert_eq!(registry.records().len(), 1);
    }

    #[test]
    fn test_failed_update_leaves_record() {
        let (mut registry, _) = registry();
        let mut rec = record("0x1", TransactionType::Tx);
        rec.status = TransactionStatus::Confirmed;
        registry.insert(rec.clone()).unwrap();

        let key = rec.key();
        let result = registry.update(
            &key,
            TransactionUpdate {
                status: Some(TransactionStatus::Pending),
                summary: Some("changed".to_string()),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(registry.get(&key), Some(&rec));
    }

    #[test]
    fn test_unknown_key_is_none() {
        let (mut registry, _) = registry();
        let key = RecordKey::new("missing", TransactionType::Order);
        assert_eq!(registry.update(&key, TransactionUpdate::default()).unwrap(), None);
    }

    #[test]
    fn test_state_survives_reload_and_clear_persists() {
        let (mut registry, store) = registry();
        registry.insert(record("0x1", TransactionType::Tx)).unwrap();

        let reloaded = TransactionRegistry::load(store.clone(), 1);
        assert_eq!(reloaded.records().len(), 1);

        registry.clear().unwrap();
        let raw = store.raw(TRANSACTIONS_KEY).unwrap();
        assert_eq!(raw, serde_json::json!({ "1": {} }));
    }

    #[test]
    fn test_networks_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let mut mainnet = TransactionRegistry::load(store.clone(), 1);
        mainnet.insert(record("0x1", TransactionType::Tx)).unwrap();

        let other = TransactionRegistry::load(store, 137);
        assert!(other.records().is_empty());
    }

    #[test]
    fn test_schema_mismatch_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(TRANSACTIONS_KEY, &serde_json::json!({ "1": { "tx_0x1": {} } }), "0.9.0")
            .unwrap();
        let registry = TransactionRegistry::load(store, 1);
        assert!(registry.records().is_empty());
    }
}
