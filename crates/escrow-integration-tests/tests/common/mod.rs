//! Shared fixture: a marketplace with two parties and a staff roster over
//! any ledger store and clock.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use escrow_core::{Amount, ContractId, PartyRole, TransactionId, UserId, UserRole};
use escrow_engine::{
    ChangeFeed, Clock, CreateContract, EngineConfig, EngineContext, EscrowEngine, NewTransaction,
    StaticDirectory, SystemClock,
};
use escrow_ledger::{
    EntityKind, Filter, LedgerStore, MemoryLedger, Precondition, StoreError, StoredRecord,
};
use escrow_state::ContractResponse;

pub struct World {
    pub engine: EscrowEngine,
    pub directory: StaticDirectory,
    pub feed: ChangeFeed,
    pub buyer: UserId,
    pub seller: UserId,
    pub admin: UserId,
    pub moderator: UserId,
    pub stranger: UserId,
}

impl World {
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryLedger::new()), Arc::new(SystemClock))
    }

    pub fn build(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        let directory = StaticDirectory::new();
        let user = |role| {
            let id = UserId::new();
            directory.register(id, role);
            id
        };
        let (buyer, seller, admin, moderator, stranger) = (
            user(UserRole::User),
            user(UserRole::User),
            user(UserRole::Admin),
            user(UserRole::Moderator),
            user(UserRole::User),
        );
        let feed = ChangeFeed::new(1024);
        let ctx = EngineContext::new(
            store,
            Arc::new(directory.clone()),
            Arc::new(feed.clone()),
            clock,
            EngineConfig::default(),
        );
        Self {
            engine: EscrowEngine::new(ctx),
            directory,
            feed,
            buyer,
            seller,
            admin,
            moderator,
            stranger,
        }
    }

    pub fn open(&self, amount: u64) -> TransactionId {
        self.engine
            .transactions()
            .create(
                NewTransaction {
                    buyer_id: self.buyer,
                    seller_id: self.seller,
                    title: "Mobile app MVP".into(),
                    amount: Amount::new(amount),
                },
                self.buyer,
            )
            .unwrap()
            .id
    }

    pub fn offer(&self, tx: TransactionId, amount: Option<u64>) -> ContractId {
        self.engine
            .contracts()
            .create_contract(CreateContract {
                transaction_id: tx,
                creator_id: self.seller,
                role: PartyRole::Seller,
                recipient_id: Some(self.buyer),
                content: "iOS and Android builds, four sprints".into(),
                amount: amount.map(Amount::new),
                parent_id: None,
            })
            .unwrap()
    }

    pub fn accepted(&self, amount: u64) -> TransactionId {
        let tx = self.open(amount);
        let contract = self.offer(tx, None);
        self.engine
            .contracts()
            .respond(contract, self.buyer, ContractResponse::Accept, None)
            .unwrap();
        tx
    }

    pub fn paid(&self, amount: u64) -> TransactionId {
        let tx = self.accepted(amount);
        self.engine.transactions().record_payment(tx, self.buyer).unwrap();
        tx
    }

    pub fn delivered(&self, amount: u64) -> TransactionId {
        let tx = self.paid(amount);
        self.engine
            .transactions()
            .mark_work_completed(tx, self.seller)
            .unwrap();
        tx
    }
}

/// Memory ledger whose writes to selected partitions fail on demand.
#[derive(Default)]
pub struct FaultyLedger {
    inner: MemoryLedger,
    failing: Mutex<HashSet<EntityKind>>,
}

impl FaultyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write to `kind` until [`FaultyLedger::heal`].
    pub fn break_writes(&self, kind: EntityKind) {
        self.failing.lock().insert(kind);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }
}

impl LedgerStore for FaultyLedger {
    fn get(&self, kind: EntityKind, id: Uuid) -> Result<StoredRecord, StoreError> {
        self.inner.get(kind, id)
    }

    fn put(
        &self,
        kind: EntityKind,
        id: Uuid,
        body: Value,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        if self.failing.lock().contains(&kind) {
            return Err(StoreError::Unavailable(format!("{kind} writes are down")));
        }
        self.inner.put(kind, id, body, precondition)
    }

    fn query(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.query(kind, filter)
    }
}
