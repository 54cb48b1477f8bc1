//! # Typed Records
//!
//! [`Ledger`] wraps a [`LedgerStore`] and moves `serde` records in and out
//! of it. A loaded record comes back as [`Versioned<R>`]; mutating it and
//! passing it to [`Ledger::update`] writes under `Precondition::Version`
//! of the version that was read, so a concurrent writer in between turns
//! the update into a `Conflict`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use escrow_state::{ContractChain, Dispute, DisputeProposal, EscrowQueueItem, Transaction};

use crate::error::StoreError;
use crate::kind::EntityKind;
use crate::store::{Filter, LedgerStore, Precondition, StoredRecord};

/// A type persisted in one ledger partition.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Partition.
    const KIND: EntityKind;

    /// Key within the partition.
    fn record_id(&self) -> Uuid;
}

impl Record for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

impl Record for ContractChain {
    const KIND: EntityKind = EntityKind::ContractChain;

    fn record_id(&self) -> Uuid {
        *self.transaction_id.as_uuid()
    }
}

impl Record for Dispute {
    const KIND: EntityKind = EntityKind::Dispute;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

impl Record for DisputeProposal {
    const KIND: EntityKind = EntityKind::Proposal;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

impl Record for EscrowQueueItem {
    const KIND: EntityKind = EntityKind::QueueItem;

    fn record_id(&self) -> Uuid {
        *self.id.as_uuid()
    }
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<R> {
    /// The decoded record.
    pub record: R,
    /// Store version at read time; bumped by a successful update.
    pub version: u64,
}

/// Typed access to a shared [`LedgerStore`]. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Wrap a store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Read and decode one record.
    pub fn load<R: Record>(&self, id: Uuid) -> Result<Versioned<R>, StoreError> {
        decode(self.store.get(R::KIND, id)?)
    }

    /// Like [`Ledger::load`], mapping `NotFound` to `None`.
    pub fn try_load<R: Record>(&self, id: Uuid) -> Result<Option<Versioned<R>>, StoreError> {
        match self.load(id) {
            Ok(found) => Ok(Some(found)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Write a record that must not exist yet.
    pub fn insert<R: Record>(&self, record: R) -> Result<Versioned<R>, StoreError> {
        let version = self
            .store
            .put(R::KIND, record.record_id(), encode(&record)?, Precondition::Absent)?;
        Ok(Versioned { record, version })
    }

    /// Write `entry.record` if the store still holds `entry.version`.
    ///
    /// On success `entry.version` is advanced to the stored version.
    pub fn update<R: Record>(&self, entry: &mut Versioned<R>) -> Result<(), StoreError> {
        let body = encode(&entry.record)?;
        let version = self.store.put(
            R::KIND,
            entry.record.record_id(),
            body,
            Precondition::Version(entry.version),
        )?;
        entry.version = version;
        Ok(())
    }

    /// Decode every record of `R`'s kind matching `filter`.
    pub fn find<R: Record>(&self, filter: &Filter) -> Result<Vec<Versioned<R>>, StoreError> {
        self.store
            .query(R::KIND, filter)?
            .into_iter()
            .map(decode)
            .collect()
    }
}

fn encode<R: Record>(record: &R) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::Serialization {
        kind: R::KIND,
        message: e.to_string(),
    })
}

fn decode<R: Record>(stored: StoredRecord) -> Result<Versioned<R>, StoreError> {
    let record = serde_json::from_value(stored.body).map_err(|e| StoreError::Serialization {
        kind: R::KIND,
        message: e.to_string(),
    })?;
    Ok(Versioned {
        record,
        version: stored.version,
    })
}
