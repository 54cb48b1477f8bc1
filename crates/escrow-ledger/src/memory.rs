//! # In-Memory Ledger
//!
//! A `parking_lot::RwLock` over one map keyed by `(kind, id)`. The write
//! lock is held across the precondition check and the insert, which is
//! what makes `put` a compare-and-set. The lock is never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::kind::EntityKind;
use crate::store::{Filter, LedgerStore, Precondition, StoredRecord};

/// Thread-safe, cloneable in-memory ledger. Clones share data.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    data: Arc<RwLock<HashMap<(EntityKind, Uuid), StoredRecord>>>,
}

impl MemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of one kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.data.read().keys().filter(|(k, _)| *k == kind).count()
    }
}

impl LedgerStore for MemoryLedger {
    fn get(&self, kind: EntityKind, id: Uuid) -> Result<StoredRecord, StoreError> {
        self.data
            .read()
            .get(&(kind, id))
            .cloned()
            .ok_or(StoreError::NotFound { kind, id })
    }

    fn put(
        &self,
        kind: EntityKind,
        id: Uuid,
        body: Value,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        let mut guard = self.data.write();
        let current = guard.get(&(kind, id)).map(|r| r.version);
        precondition.check(kind, id, current)?;
        let version = current.map_or(1, |v| v + 1);
        guard.insert((kind, id), StoredRecord { id, version, body });
        Ok(version)
    }

    fn query(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self
            .data
            .read()
            .iter()
            .filter(|((k, _), record)| *k == kind && filter.matches(&record.body))
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn versions_start_at_one_and_increment() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        let kind = EntityKind::Dispute;
        assert_eq!(ledger.put(kind, id, json!({"n": 1}), Precondition::Absent).unwrap(), 1);
        assert_eq!(ledger.put(kind, id, json!({"n": 2}), Precondition::Version(1)).unwrap(), 2);
        let stored = ledger.get(kind, id).unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.body, json!({"n": 2}));
    }

    #[test]
    fn stale_version_conflicts_and_leaves_record_untouched() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        let kind = EntityKind::Transaction;
        ledger.put(kind, id, json!({"status": "created"}), Precondition::Absent).unwrap();
        ledger
            .put(kind, id, json!({"status": "contract_accepted"}), Precondition::Version(1))
            .unwrap();
        let err = ledger
            .put(kind, id, json!({"status": "contract_rejected"}), Precondition::Version(1))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                kind,
                id,
                expected: Precondition::Version(1),
                actual: Some(2),
            }
        );
        assert_eq!(ledger.get(kind, id).unwrap().body["status"], "contract_accepted");
    }

    #[test]
    fn insert_twice_conflicts() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        ledger.put(EntityKind::QueueItem, id, json!({}), Precondition::Absent).unwrap();
        assert!(ledger
            .put(EntityKind::QueueItem, id, json!({}), Precondition::Absent)
            .unwrap_err()
            .is_conflict());
    }

    #[test]
    fn kinds_are_separate_partitions() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        ledger.put(EntityKind::Transaction, id, json!({"a": 1}), Precondition::Absent).unwrap();
        ledger.put(EntityKind::ContractChain, id, json!({"b": 2}), Precondition::Absent).unwrap();
        assert_eq!(ledger.count(EntityKind::Transaction), 1);
        assert_eq!(ledger.count(EntityKind::ContractChain), 1);
        assert!(matches!(
            ledger.get(EntityKind::Dispute, id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn query_filters_by_field() {
        let ledger = MemoryLedger::new();
        for tx in ["t1", "t1", "t2"] {
            let record = json!({"transaction_id": tx});
            ledger
                .put(EntityKind::Dispute, Uuid::new_v4(), record, Precondition::Absent)
                .unwrap();
        }
        let hits = ledger
            .query(EntityKind::Dispute, &Filter::field_eq("transaction_id", "t1"))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(ledger.query(EntityKind::Dispute, &Filter::All).unwrap().len(), 3);
    }

    #[test]
    fn concurrent_cas_admits_exactly_one_winner() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();
        ledger
            .put(EntityKind::Dispute, id, json!({"status": "open"}), Precondition::Absent)
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    let record = json!({"status": "resolved", "by": i});
                    ledger
                        .put(EntityKind::Dispute, id, record, Precondition::Version(1))
                        .is_ok()
                })
            })
            .collect();
        let winners = handles.into_iter().filter_map(|h| h.join().ok()).filter(|ok| *ok).count();
        assert_eq!(winners, 1);
        assert_eq!(ledger.get(EntityKind::Dispute, id).unwrap().version, 2);
    }
}
