//! Shared fixture for the service tests.

use std::sync::Arc;

use escrow_core::{Amount, ContractId, TransactionId, UserId, UserRole};
use escrow_state::ContractResponse;

use crate::clock::{Clock, SystemClock};
use crate::contract::CreateContract;
use crate::transaction::NewTransaction;
use crate::{EngineContext, EscrowEngine, StaticDirectory};

pub(crate) struct Harness {
    pub engine: EscrowEngine,
    pub ctx: EngineContext,
    pub buyer: UserId,
    pub seller: UserId,
    pub admin: UserId,
    pub moderator: UserId,
    pub support: UserId,
    pub stranger: UserId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let dir = StaticDirectory::new();
        let users = [
            UserRole::User,
            UserRole::User,
            UserRole::Admin,
            UserRole::Moderator,
            UserRole::Support,
            UserRole::User,
        ]
        .map(|role| {
            let id = UserId::new();
            dir.register(id, role);
            id
        });
        let ctx = EngineContext::in_memory(dir).with_clock(clock);
        Self {
            engine: EscrowEngine::new(ctx.clone()),
            ctx,
            buyer: users[0],
            seller: users[1],
            admin: users[2],
            moderator: users[3],
            support: users[4],
            stranger: users[5],
        }
    }

    /// A fresh transaction in `created`.
    pub fn open(&self, amount: u64) -> TransactionId {
        self.engine
            .transactions()
            .create(
                NewTransaction {
                    buyer_id: self.buyer,
                    seller_id: self.seller,
                    title: "Brand identity package".into(),
                    amount: Amount::new(amount),
                },
                self.buyer,
            )
            .unwrap()
            .id
    }

    /// Seller offers a contract to the buyer.
    pub fn offer(&self, tx: TransactionId, amount: u64) -> ContractId {
        self.engine
            .contracts()
            .create_contract(CreateContract {
                transaction_id: tx,
                creator_id: self.seller,
                role: escrow_core::PartyRole::Seller,
                recipient_id: Some(self.buyer),
                content: "Three concepts, two revision rounds".into(),
                amount: Some(Amount::new(amount)),
                parent_id: None,
            })
            .unwrap()
    }

    /// A transaction in `contract_accepted`.
    pub fn accepted(&self, amount: u64) -> TransactionId {
        let tx = self.open(amount);
        let c = self.offer(tx, amount);
        self.engine
            .contracts()
            .respond(c, self.buyer, ContractResponse::Accept, None)
            .unwrap();
        tx
    }

    /// A transaction in `payment_made` with escrow held.
    pub fn paid(&self, amount: u64) -> TransactionId {
        let tx = self.accepted(amount);
        self.engine.transactions().record_payment(tx, self.buyer).unwrap();
        tx
    }
}
