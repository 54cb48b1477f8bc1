//! # escrow-engine: Lifecycle Services
//!
//! The services that drive an escrow deal from negotiation to payout:
//!
//! - **Contracts** ([`contract`]): offers, answers and revision chains.
//!
//! - **Transactions** ([`transaction`]): creation and the party-driven
//!   payment actions.
//!
//! - **Disputes** ([`dispute`]): disputes, proposals, fund splits and
//!   escalation.
//!
//! - **Release queue** ([`queue`]): staff approve, reject or hold escrow.
//!
//! - **Repair** ([`reconcile`]): re-applies cross-entity writes that a
//!   failed cascade left behind.
//!
//! Every service is a thin handle over an [`EngineContext`] and keeps no
//! state of its own; the ledger store is the only shared mutable
//! resource. [`EscrowEngine`] bundles them.

pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod contract;
pub mod dispute;
pub mod error;
pub mod notify;
pub mod queue;
pub mod reconcile;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testkit;

pub use auth::{AdminAuth, StaticDirectory};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use context::EngineContext;
pub use contract::{ContractLedger, CreateContract};
pub use dispute::DisputeResolutionEngine;
pub use error::EngineError;
pub use notify::{
    ChangeFeed, EventKind, FanoutSink, Notification, NotificationSink, NotifyError, TracingSink,
};
pub use queue::EscrowReleaseQueue;
pub use reconcile::{Reconciler, RepairReport};
pub use transaction::{NewTransaction, TransactionStateMachine};

use escrow_core::TransactionId;
use escrow_state::Transaction;

/// All services over one context.
#[derive(Debug, Clone)]
pub struct EscrowEngine {
    ctx: EngineContext,
    contracts: ContractLedger,
    transactions: TransactionStateMachine,
    disputes: DisputeResolutionEngine,
    queue: EscrowReleaseQueue,
    reconciler: Reconciler,
}

impl EscrowEngine {
    /// Build every service over `ctx`.
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            contracts: ContractLedger::new(ctx.clone()),
            transactions: TransactionStateMachine::new(ctx.clone()),
            disputes: DisputeResolutionEngine::new(ctx.clone()),
            queue: EscrowReleaseQueue::new(ctx.clone()),
            reconciler: Reconciler::new(ctx.clone()),
            ctx,
        }
    }

    /// The shared context.
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Contract negotiation.
    pub fn contracts(&self) -> &ContractLedger {
        &self.contracts
    }

    /// Transaction lifecycle.
    pub fn transactions(&self) -> &TransactionStateMachine {
        &self.transactions
    }

    /// Disputes and proposals.
    pub fn disputes(&self) -> &DisputeResolutionEngine {
        &self.disputes
    }

    /// Staff release queue.
    pub fn queue(&self) -> &EscrowReleaseQueue {
        &self.queue
    }

    /// Cascade repair.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Read a transaction after repairing any lost cascades.
    ///
    /// A failed repair is logged and the transaction is returned as
    /// stored; the next read tries again.
    pub fn transaction(&self, id: TransactionId) -> Result<Transaction, EngineError> {
        if let Err(err) = self.reconciler.repair(id) {
            if matches!(err, EngineError::NotFound { .. }) {
                return Err(err);
            }
            tracing::warn!(
                transaction_id = %id,
                error = %err,
                "repair failed; serving stored state"
            );
        }
        self.transactions.get(id)
    }
}
