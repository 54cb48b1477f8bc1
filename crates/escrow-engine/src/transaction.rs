//! # TransactionStateMachine
//!
//! Owns transaction creation and the party-driven payment actions. The
//! transition table itself lives in `escrow_state::transaction`; this
//! service resolves the caller to a side of the deal, applies the event
//! under a version precondition and notifies the counterparty.

use escrow_core::{Actor, Amount, PartyRole, TransactionId, UserId};
use escrow_ledger::Filter;
use escrow_state::{Outcome, Transaction, TransactionEvent};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::notify::EventKind;
use crate::queue::close_settled_items;

/// Input for [`TransactionStateMachine::create`].
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Paying party.
    pub buyer_id: UserId,
    /// Delivering party.
    pub seller_id: UserId,
    /// Short description.
    pub title: String,
    /// Escrow total, smallest currency unit.
    pub amount: Amount,
}

/// Transaction lifecycle service.
#[derive(Debug, Clone)]
pub struct TransactionStateMachine {
    ctx: EngineContext,
}

impl TransactionStateMachine {
    /// Bind to a context.
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Open a transaction between two known users. The caller must be one
    /// of them.
    pub fn create(
        &self,
        input: NewTransaction,
        caller: UserId,
    ) -> Result<Transaction, EngineError> {
        self.ctx.require_user(input.buyer_id)?;
        self.ctx.require_user(input.seller_id)?;
        let tx = Transaction::new(
            input.buyer_id,
            input.seller_id,
            &input.title,
            input.amount,
            self.ctx.now(),
        )?;
        let role = self.ctx.party_of(&tx, caller, "create transaction")?;
        let tx = self.ctx.ledger.insert(tx)?.record;
        tracing::info!(transaction_id = %tx.id, amount = %tx.amount, "transaction created");
        self.ctx.notify(
            EventKind::TransactionCreated,
            tx.id,
            None,
            None,
            caller,
            &[tx.party(role.counterparty())],
        );
        Ok(tx)
    }

    /// Read a transaction as stored, without repair.
    pub fn get(&self, id: TransactionId) -> Result<Transaction, EngineError> {
        Ok(self.ctx.load_transaction(id)?.record)
    }

    /// Every transaction the user is buyer or seller on, oldest first.
    pub fn list_for_user(&self, user: UserId) -> Result<Vec<Transaction>, EngineError> {
        let key = user.as_uuid().to_string();
        let mut found: Vec<Transaction> = self
            .ctx
            .ledger
            .find::<Transaction>(&Filter::field_eq("buyer_id", key.clone()))?
            .into_iter()
            .chain(self.ctx.ledger.find::<Transaction>(&Filter::field_eq("seller_id", key))?)
            .map(|v| v.record)
            .collect();
        found.sort_by_key(|t| (t.created_at, t.id));
        Ok(found)
    }

    /// Buyer pays into escrow: `contract_accepted → payment_made`.
    pub fn record_payment(
        &self,
        id: TransactionId,
        caller: UserId,
    ) -> Result<Transaction, EngineError> {
        self.party_action(id, caller, TransactionEvent::MakePayment, EventKind::PaymentMade)
    }

    /// Seller delivers: `payment_made → work_completed`. Repeating it is a no-op.
    pub fn mark_work_completed(
        &self,
        id: TransactionId,
        caller: UserId,
    ) -> Result<Transaction, EngineError> {
        self.party_action(id, caller, TransactionEvent::MarkWorkCompleted, EventKind::WorkCompleted)
    }

    /// Buyer releases escrow to the seller: `work_completed → completed`.
    /// Open release-queue items for the transaction are closed.
    pub fn release_payment(
        &self,
        id: TransactionId,
        caller: UserId,
    ) -> Result<Transaction, EngineError> {
        self.party_action(id, caller, TransactionEvent::ReleasePayment, EventKind::PaymentReleased)
    }

    fn party_action(
        &self,
        id: TransactionId,
        caller: UserId,
        event: TransactionEvent,
        kind: EventKind,
    ) -> Result<Transaction, EngineError> {
        let mut entry = self.ctx.load_transaction(id)?;
        let role = self.ctx.party_of(&entry.record, caller, event.name())?;
        let outcome = self.ctx.advance(&mut entry, Actor::from(role), &event)?;
        if outcome == Outcome::Applied {
            close_settled_items(&self.ctx, &entry.record);
            self.ctx.notify(
                kind,
                id,
                None,
                None,
                caller,
                &[entry.record.party(role.counterparty())],
            );
        }
        Ok(entry.record)
    }

    /// Side of `caller` on transaction `id`.
    pub fn role_of(&self, id: TransactionId, caller: UserId) -> Result<PartyRole, EngineError> {
        let entry = self.ctx.load_transaction(id)?;
        self.ctx.party_of(&entry.record, caller, "view transaction")
    }
}
