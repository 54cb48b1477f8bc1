//! # escrow-state: Entity Records and State Machines
//!
//! Pure, I/O-free models of every entity the lifecycle engine persists.
//! Each record owns its transition rules; the engine loads a record,
//! applies one transition, and writes it back under a version precondition.
//!
//! ## State Machines
//!
//! - **Transaction** (`transaction.rs`): `created → contract_accepted →
//!   payment_made → work_completed → completed`, with `contract_rejected`,
//!   `disputed`, `escalated` and `refunded` branches. Role-gated events,
//!   idempotent repeats, terminal guards.
//!
//! - **Contract chain** (`contract.rs`): every contract version of one
//!   transaction in a single aggregate, so "deactivate the old chain and
//!   insert the new revision" is one write.
//!
//! - **Dispute / proposal** (`dispute.rs`): open → resolved; proposals
//!   pending → accepted | rejected.
//!
//! - **Fund split** (`resolution.rs`): the pure mapping from
//!   `(proposal type, amount, total)` to a conserved `ResolutionBreakdown`.
//!
//! - **Release queue item** (`queue.rs`): pending ⇄ held → approved |
//!   rejected, with deterministic priority ordering.
//!
//! ## Design
//!
//! States are closed enums matched exhaustively. Rejections carry the
//! entity id with the current and requested state so callers can render a
//! precise message.

pub mod contract;
pub mod dispute;
pub mod error;
pub mod queue;
pub mod resolution;
pub mod transaction;

use serde::{Deserialize, Serialize};

/// Result of applying a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The record changed and must be written back.
    Applied,
    /// The record was already in the requested state; nothing to write.
    Unchanged,
}

impl Outcome {
    /// Whether the record changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

// ─── Re-exports ─────────────────────────────────────────────────────

pub use contract::{Contract, ContractChain, ContractResponse, ContractStatus, NewContract};
pub use dispute::{
    Dispute, DisputeProposal, DisputeResolution, DisputeStatus, ProposalResponse, ProposalStatus,
};
pub use error::TransitionError;
pub use queue::{order_queue, EscrowQueueItem, Priority, QueueDecision, QueueNote, QueueStatus};
pub use resolution::{compute_split, ProposalType, ResolutionBreakdown};
pub use transaction::{
    FundsStatus, Transaction, TransactionEvent, TransactionStatus, TransactionTransitionRecord,
};
