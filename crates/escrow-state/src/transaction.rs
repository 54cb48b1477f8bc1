//! # Transaction Lifecycle State Machine
//!
//! ```text
//! Created ──accept──▶ ContractAccepted ──pay──▶ PaymentMade ──done──▶ WorkCompleted
//!    │  ▲                                          │                     │
//!  reject│ revise                                  │                  release ──▶ Completed
//!    ▼  │                                          ├────── dispute ──────┘
//! ContractRejected                                 ▼
//!                                                  Disputed ──settle──▶ Completed
//!                                                     │
//!                                                  escalate
//!                                                     ▼
//!                                                 Escalated ──admin release──▶ Completed
//!                                                           ──admin refund───▶ Refunded
//! ```
//!
//! Admin release/refund is also available from `PaymentMade`,
//! `WorkCompleted` and `Disputed` through the release queue.
//!
//! Checks run in a fixed order: role guard, idempotent repeat, terminal
//! guard, adjacency. A repeat is a no-op only when the event would write
//! what is already recorded: a fund-moving event must match the stored
//! split and an acceptance must match the stored amount. Any other repeat
//! is refused.
//!
//! Escrowed funds leave `Held` exactly once, on the transition into
//! `Completed` or `Refunded`.

use serde::{Deserialize, Serialize};

use escrow_core::{Actor, Amount, PartyRole, Timestamp, TransactionId, UserId, ValidationError};

use crate::error::TransitionError;
use crate::resolution::ResolutionBreakdown;
use crate::Outcome;

const ENTITY: &str = "transaction";

// ─── Status ─────────────────────────────────────────────────────────

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting contract acceptance.
    Created,
    /// A contract was accepted; awaiting payment.
    ContractAccepted,
    /// The active contract was rejected; awaiting a revision.
    ContractRejected,
    /// The buyer paid into escrow.
    PaymentMade,
    /// The seller marked the work delivered.
    WorkCompleted,
    /// A dispute is open.
    Disputed,
    /// The dispute was escalated to staff; proposals are frozen.
    Escalated,
    /// Funds were paid out (fully or split). Terminal.
    Completed,
    /// Funds were returned to the buyer by an admin decision. Terminal.
    Refunded,
}

impl TransactionStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Completed | Self::Refunded => true,
            Self::Created
            | Self::ContractAccepted
            | Self::ContractRejected
            | Self::PaymentMade
            | Self::WorkCompleted
            | Self::Disputed
            | Self::Escalated => false,
        }
    }

    /// Whether the buyer's payment is sitting in escrow.
    pub fn holds_funds(&self) -> bool {
        match self {
            Self::PaymentMade | Self::WorkCompleted | Self::Disputed | Self::Escalated => true,
            Self::Created
            | Self::ContractAccepted
            | Self::ContractRejected
            | Self::Completed
            | Self::Refunded => false,
        }
    }

    /// Whether contract negotiation is still open.
    pub fn is_negotiating(&self) -> bool {
        matches!(self, Self::Created | Self::ContractRejected)
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ContractAccepted => "contract_accepted",
            Self::ContractRejected => "contract_rejected",
            Self::PaymentMade => "payment_made",
            Self::WorkCompleted => "work_completed",
            Self::Disputed => "disputed",
            Self::Escalated => "escalated",
            Self::Completed => "completed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the buyer's money currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundsStatus {
    /// Nothing paid in yet.
    Unfunded,
    /// Paid in and held by the platform.
    Held,
    /// Paid out to the seller in full.
    Released,
    /// Returned to the buyer in full.
    Refunded,
    /// Divided between buyer and seller.
    Split,
}

impl FundsStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unfunded => "unfunded",
            Self::Held => "held",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Split => "split",
        }
    }
}

impl std::fmt::Display for FundsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Events ─────────────────────────────────────────────────────────

/// A request to advance a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransactionEvent {
    /// The active contract was accepted at `amount`.
    AcceptContract {
        /// The accepted contract's amount; becomes the escrow total.
        amount: Amount,
    },
    /// The active contract was rejected.
    RejectContract,
    /// A new contract version re-opened negotiation.
    ReopenNegotiation,
    /// The buyer paid into escrow.
    MakePayment,
    /// The seller delivered the work.
    MarkWorkCompleted,
    /// The buyer released escrow to the seller.
    ReleasePayment,
    /// A party opened a dispute.
    OpenDispute,
    /// The dispute moved to staff review.
    Escalate,
    /// An accepted proposal settled the dispute.
    SettleDispute {
        /// The computed split.
        breakdown: ResolutionBreakdown,
    },
    /// A release-queue approval paid out the seller.
    AdminRelease,
    /// A release-queue rejection refunded the buyer.
    AdminRefund,
}

impl TransactionEvent {
    /// Status the event moves the transaction to.
    pub fn target(&self) -> TransactionStatus {
        use TransactionStatus as S;
        match self {
            Self::AcceptContract { .. } => S::ContractAccepted,
            Self::RejectContract => S::ContractRejected,
            Self::ReopenNegotiation => S::Created,
            Self::MakePayment => S::PaymentMade,
            Self::MarkWorkCompleted => S::WorkCompleted,
            Self::ReleasePayment => S::Completed,
            Self::OpenDispute => S::Disputed,
            Self::Escalate => S::Escalated,
            Self::SettleDispute { .. } => S::Completed,
            Self::AdminRelease => S::Completed,
            Self::AdminRefund => S::Refunded,
        }
    }

    /// Statuses the event may fire from.
    pub fn sources(&self) -> &'static [TransactionStatus] {
        use TransactionStatus as S;
        match self {
            Self::AcceptContract { .. } | Self::RejectContract => &[S::Created],
            Self::ReopenNegotiation => &[S::ContractRejected],
            Self::MakePayment => &[S::ContractAccepted],
            Self::MarkWorkCompleted => &[S::PaymentMade],
            Self::ReleasePayment => &[S::WorkCompleted],
            Self::OpenDispute => &[S::PaymentMade, S::WorkCompleted],
            Self::Escalate | Self::SettleDispute { .. } => &[S::Disputed],
            Self::AdminRelease | Self::AdminRefund => {
                &[S::PaymentMade, S::WorkCompleted, S::Disputed, S::Escalated]
            }
        }
    }

    /// Whether `actor` may fire this event.
    pub fn permits(&self, actor: Actor) -> bool {
        match self {
            Self::MakePayment | Self::ReleasePayment => actor == Actor::Buyer,
            Self::MarkWorkCompleted => actor == Actor::Seller,
            Self::AcceptContract { .. }
            | Self::RejectContract
            | Self::ReopenNegotiation
            | Self::OpenDispute => matches!(actor, Actor::Buyer | Actor::Seller),
            Self::Escalate => {
                matches!(actor, Actor::Buyer | Actor::Seller | Actor::Admin | Actor::System)
            }
            Self::SettleDispute { .. } => {
                matches!(actor, Actor::Buyer | Actor::Seller | Actor::System)
            }
            Self::AdminRelease | Self::AdminRefund => matches!(actor, Actor::Admin | Actor::System),
        }
    }

    /// Short action name for error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AcceptContract { .. } => "accept_contract",
            Self::RejectContract => "reject_contract",
            Self::ReopenNegotiation => "reopen_negotiation",
            Self::MakePayment => "make_payment",
            Self::MarkWorkCompleted => "mark_work_completed",
            Self::ReleasePayment => "release_payment",
            Self::OpenDispute => "open_dispute",
            Self::Escalate => "escalate",
            Self::SettleDispute { .. } => "settle_dispute",
            Self::AdminRelease => "admin_release",
            Self::AdminRefund => "admin_refund",
        }
    }
}

// ─── Transaction ────────────────────────────────────────────────────

/// Record of a single status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTransitionRecord {
    /// Status before.
    pub from: TransactionStatus,
    /// Status after.
    pub to: TransactionStatus,
    /// Who drove it.
    pub actor: Actor,
    /// Event name.
    pub event: String,
    /// When.
    pub at: Timestamp,
}

/// A buyer/seller deal whose funds pass through escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier.
    pub id: TransactionId,
    /// The paying party.
    pub buyer_id: UserId,
    /// The delivering party.
    pub seller_id: UserId,
    /// Short description of the deal.
    pub title: String,
    /// Escrow total in the smallest currency unit.
    pub amount: Amount,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Where the money is.
    pub funds: FundsStatus,
    /// Set exactly once, when funds leave escrow.
    pub resolution: Option<ResolutionBreakdown>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Ordered log of status changes.
    pub transitions: Vec<TransactionTransitionRecord>,
}

impl Transaction {
    /// Create a transaction in `Created` with nothing paid in.
    pub fn new(
        buyer_id: UserId,
        seller_id: UserId,
        title: &str,
        amount: Amount,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        if buyer_id == seller_id {
            return Err(ValidationError::Inconsistent(format!(
                "buyer and seller must be different users, both are {buyer_id}"
            )));
        }
        let title = escrow_core::error::require_text("title", title)?;
        let amount = Amount::positive("amount", amount.units())?;
        Ok(Self {
            id: TransactionId::new(),
            buyer_id,
            seller_id,
            title,
            amount,
            status: TransactionStatus::Created,
            funds: FundsStatus::Unfunded,
            resolution: None,
            created_at: at,
            updated_at: at,
            transitions: Vec::new(),
        })
    }

    /// Which side `user` is on, if either.
    pub fn party_role(&self, user: UserId) -> Option<PartyRole> {
        if user == self.buyer_id {
            Some(PartyRole::Buyer)
        } else if user == self.seller_id {
            Some(PartyRole::Seller)
        } else {
            None
        }
    }

    /// The user on the given side.
    pub fn party(&self, role: PartyRole) -> UserId {
        match role {
            PartyRole::Buyer => self.buyer_id,
            PartyRole::Seller => self.seller_id,
        }
    }

    /// Whether the transaction has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply `event` on behalf of `actor`.
    ///
    /// Returns [`Outcome::Unchanged`] when the transaction already sits in
    /// the event's target status with the same amount and split the event
    /// would write. Nothing is mutated on error.
    pub fn apply(
        &mut self,
        event: &TransactionEvent,
        actor: Actor,
        at: Timestamp,
    ) -> Result<Outcome, TransitionError> {
        let target = event.target();
        if !event.permits(actor) {
            return Err(TransitionError::not_permitted(actor, event.name(), self.id));
        }
        if self.status == target {
            return self.repeat(event);
        }
        if self.status.is_terminal() {
            return Err(TransitionError::terminal(ENTITY, self.id, self.status, target));
        }
        if !event.sources().contains(&self.status) {
            return Err(TransitionError::invalid(ENTITY, self.id, self.status, target));
        }

        let mut amount = self.amount;
        let mut funds = self.funds;
        let mut resolution = self.resolution;
        match event {
            TransactionEvent::AcceptContract { amount: accepted } => {
                amount = Amount::positive("amount", accepted.units())?;
            }
            TransactionEvent::MakePayment => {
                if funds != FundsStatus::Unfunded {
                    return Err(TransitionError::terminal(
                        "escrow funds",
                        self.id,
                        funds,
                        FundsStatus::Held,
                    ));
                }
                funds = FundsStatus::Held;
            }
            TransactionEvent::ReleasePayment | TransactionEvent::AdminRelease => {
                let breakdown = ResolutionBreakdown::release_full(self.amount);
                funds = self.release_funds(&breakdown)?;
                resolution = Some(breakdown);
            }
            TransactionEvent::AdminRefund => {
                let breakdown = ResolutionBreakdown::refund_full(self.amount);
                funds = self.release_funds(&breakdown)?;
                resolution = Some(breakdown);
            }
            TransactionEvent::SettleDispute { breakdown } => {
                if breakdown.total_amount != self.amount || !breakdown.is_conserved() {
                    return Err(ValidationError::Inconsistent(format!(
                        "split {} + {} does not settle escrow total {} of {}",
                        breakdown.buyer_refund, breakdown.seller_release, self.amount, self.id
                    ))
                    .into());
                }
                funds = self.release_funds(breakdown)?;
                resolution = Some(*breakdown);
            }
            TransactionEvent::RejectContract
            | TransactionEvent::ReopenNegotiation
            | TransactionEvent::MarkWorkCompleted
            | TransactionEvent::OpenDispute
            | TransactionEvent::Escalate => {}
        }

        self.transitions.push(TransactionTransitionRecord {
            from: self.status,
            to: target,
            actor,
            event: event.name().to_string(),
            at,
        });
        self.amount = amount;
        self.funds = funds;
        self.resolution = resolution;
        self.status = target;
        self.updated_at = at;
        Ok(Outcome::Applied)
    }

    /// The split `event` writes when funds leave escrow, if it moves funds.
    pub fn breakdown_for(&self, event: &TransactionEvent) -> Option<ResolutionBreakdown> {
        match event {
            TransactionEvent::ReleasePayment | TransactionEvent::AdminRelease => {
                Some(ResolutionBreakdown::release_full(self.amount))
            }
            TransactionEvent::AdminRefund => Some(ResolutionBreakdown::refund_full(self.amount)),
            TransactionEvent::SettleDispute { breakdown } => Some(*breakdown),
            TransactionEvent::AcceptContract { .. }
            | TransactionEvent::RejectContract
            | TransactionEvent::ReopenNegotiation
            | TransactionEvent::MakePayment
            | TransactionEvent::MarkWorkCompleted
            | TransactionEvent::OpenDispute
            | TransactionEvent::Escalate => None,
        }
    }

    /// The transaction already sits in the event's target status.
    fn repeat(&self, event: &TransactionEvent) -> Result<Outcome, TransitionError> {
        let matches = match event {
            TransactionEvent::AcceptContract { amount } => *amount == self.amount,
            _ => match self.breakdown_for(event) {
                Some(breakdown) => self.resolution == Some(breakdown),
                None => true,
            },
        };
        if matches {
            return Ok(Outcome::Unchanged);
        }
        let requested = event.name();
        if self.status.is_terminal() {
            Err(TransitionError::terminal(ENTITY, self.id, self.status, requested))
        } else {
            Err(TransitionError::invalid(ENTITY, self.id, self.status, requested))
        }
    }

    /// Funds may leave `Held` only once.
    fn release_funds(
        &self,
        breakdown: &ResolutionBreakdown,
    ) -> Result<FundsStatus, TransitionError> {
        let next = breakdown.funds_status();
        if self.funds != FundsStatus::Held || self.resolution.is_some() {
            return Err(TransitionError::terminal("escrow funds", self.id, self.funds, next));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{compute_split, ProposalType};

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn tx() -> Transaction {
        Transaction::new(UserId::new(), UserId::new(), "Logo design", Amount::new(10_000), at(0))
            .unwrap()
    }

    fn paid() -> Transaction {
        let mut t = tx();
        let accept = TransactionEvent::AcceptContract { amount: Amount::new(9_000) };
        t.apply(&accept, Actor::Buyer, at(1)).unwrap();
        t.apply(&TransactionEvent::MakePayment, Actor::Buyer, at(2)).unwrap();
        t
    }

    #[test]
    fn new_rejects_same_party_and_zero_amount() {
        let u = UserId::new();
        assert!(Transaction::new(u, u, "x", Amount::new(1), at(0)).is_err());
        let (buyer, seller) = (UserId::new(), UserId::new());
        assert!(Transaction::new(buyer, seller, "x", Amount::ZERO, at(0)).is_err());
        assert!(Transaction::new(buyer, seller, " ", Amount::new(1), at(0)).is_err());
    }

    #[test]
    fn happy_path_releases_full_amount() {
        let mut t = paid();
        assert_eq!(t.amount, Amount::new(9_000));
        assert_eq!(t.funds, FundsStatus::Held);
        t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(3)).unwrap();
        t.apply(&TransactionEvent::ReleasePayment, Actor::Buyer, at(4)).unwrap();
        assert_eq!(t.status, TransactionStatus::Completed);
        assert_eq!(t.funds, FundsStatus::Released);
        assert_eq!(t.resolution, Some(ResolutionBreakdown::release_full(Amount::new(9_000))));
        assert_eq!(t.transitions.len(), 4);
    }

    #[test]
    fn only_seller_marks_work_completed() {
        let mut t = paid();
        let err = t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Buyer, at(3)).unwrap_err();
        assert!(matches!(err, TransitionError::NotPermitted { .. }));
        assert_eq!(t.status, TransactionStatus::PaymentMade);
    }

    #[test]
    fn only_buyer_releases_payment() {
        let mut t = paid();
        t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(3)).unwrap();
        let err = t.apply(&TransactionEvent::ReleasePayment, Actor::Seller, at(4)).unwrap_err();
        assert!(matches!(err, TransitionError::NotPermitted { .. }));
    }

    #[test]
    fn repeated_work_completed_is_noop() {
        let mut t = paid();
        assert_eq!(
            t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(3)).unwrap(),
            Outcome::Applied
        );
        let snapshot = t.clone();
        assert_eq!(
            t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(4)).unwrap(),
            Outcome::Unchanged
        );
        assert_eq!(t, snapshot);
    }

    #[test]
    fn work_completed_after_completion_is_already_terminal() {
        let mut t = paid();
        t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(3)).unwrap();
        t.apply(&TransactionEvent::ReleasePayment, Actor::Buyer, at(4)).unwrap();
        let err = t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(5)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
    }

    #[test]
    fn non_adjacent_transition_reports_both_states() {
        let mut t = tx();
        let err = t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(1)).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                entity: "transaction",
                id: t.id.to_string(),
                from: "created".into(),
                to: "work_completed".into(),
            }
        );
    }

    #[test]
    fn dispute_only_after_payment() {
        let mut t = tx();
        assert!(t.apply(&TransactionEvent::OpenDispute, Actor::Buyer, at(1)).is_err());
        let mut t = paid();
        t.apply(&TransactionEvent::OpenDispute, Actor::Buyer, at(3)).unwrap();
        assert_eq!(t.status, TransactionStatus::Disputed);
    }

    #[test]
    fn settle_dispute_writes_split() {
        let mut t = paid();
        t.apply(&TransactionEvent::OpenDispute, Actor::Buyer, at(3)).unwrap();
        let partial = Some(Amount::new(6_000));
        let breakdown = compute_split(ProposalType::ReleasePartial, partial, t.amount).unwrap();
        t.apply(&TransactionEvent::SettleDispute { breakdown }, Actor::System, at(4)).unwrap();
        assert_eq!(t.status, TransactionStatus::Completed);
        assert_eq!(t.funds, FundsStatus::Split);
        assert_eq!(t.resolution.unwrap().buyer_refund, Amount::new(3_000));
    }

    #[test]
    fn settle_rejects_split_for_wrong_total() {
        let mut t = paid();
        t.apply(&TransactionEvent::OpenDispute, Actor::Buyer, at(3)).unwrap();
        let breakdown = ResolutionBreakdown::release_full(Amount::new(10_000));
        let err = t
            .apply(&TransactionEvent::SettleDispute { breakdown }, Actor::System, at(4))
            .unwrap_err();
        assert!(matches!(err, TransitionError::Validation(_)));
        assert_eq!(t.status, TransactionStatus::Disputed);
        assert_eq!(t.funds, FundsStatus::Held);
    }

    #[test]
    fn admin_refund_from_escalated_is_terminal() {
        let mut t = paid();
        t.apply(&TransactionEvent::OpenDispute, Actor::Seller, at(3)).unwrap();
        t.apply(&TransactionEvent::Escalate, Actor::Buyer, at(4)).unwrap();
        let breakdown = ResolutionBreakdown::release_full(t.amount);
        let settle = TransactionEvent::SettleDispute { breakdown };
        assert!(t.apply(&settle, Actor::System, at(5)).is_err());
        t.apply(&TransactionEvent::AdminRefund, Actor::Admin, at(6)).unwrap();
        assert_eq!(t.status, TransactionStatus::Refunded);
        assert_eq!(t.funds, FundsStatus::Refunded);
        let err = t.apply(&TransactionEvent::AdminRelease, Actor::Admin, at(7)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
    }

    #[test]
    fn release_after_refund_settlement_is_already_terminal() {
        let mut t = paid();
        t.apply(&TransactionEvent::OpenDispute, Actor::Buyer, at(3)).unwrap();
        let refund = ResolutionBreakdown::refund_full(t.amount);
        t.apply(&TransactionEvent::SettleDispute { breakdown: refund }, Actor::System, at(4))
            .unwrap();
        let snapshot = t.clone();

        let err = t.apply(&TransactionEvent::AdminRelease, Actor::Admin, at(5)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }), "{err}");
        let partial = compute_split(ProposalType::RefundPartial, Some(Amount::new(1_000)), t.amount)
            .unwrap();
        let err = t
            .apply(&TransactionEvent::SettleDispute { breakdown: partial }, Actor::System, at(6))
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }), "{err}");
        assert_eq!(t, snapshot);

        let again = t
            .apply(&TransactionEvent::SettleDispute { breakdown: refund }, Actor::System, at(7))
            .unwrap();
        assert_eq!(again, Outcome::Unchanged);
    }

    #[test]
    fn release_repeats_only_as_full_release() {
        let mut t = paid();
        t.apply(&TransactionEvent::MarkWorkCompleted, Actor::Seller, at(3)).unwrap();
        t.apply(&TransactionEvent::ReleasePayment, Actor::Buyer, at(4)).unwrap();
        assert_eq!(
            t.apply(&TransactionEvent::AdminRelease, Actor::Admin, at(5)).unwrap(),
            Outcome::Unchanged
        );
        let split = compute_split(ProposalType::ReleasePartial, Some(Amount::new(100)), t.amount)
            .unwrap();
        let err = t
            .apply(&TransactionEvent::SettleDispute { breakdown: split }, Actor::System, at(6))
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
        assert_eq!(t.funds, FundsStatus::Released);
    }

    #[test]
    fn accepting_again_at_another_amount_is_refused() {
        let mut t = tx();
        let accept = |units| TransactionEvent::AcceptContract { amount: Amount::new(units) };
        t.apply(&accept(8_000), Actor::Buyer, at(1)).unwrap();
        assert_eq!(t.apply(&accept(8_000), Actor::Buyer, at(2)).unwrap(), Outcome::Unchanged);
        let err = t.apply(&accept(7_500), Actor::Buyer, at(3)).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
        assert_eq!(t.amount, Amount::new(8_000));
    }

    #[test]
    fn parties_cannot_fire_admin_events() {
        let mut t = paid();
        let err = t.apply(&TransactionEvent::AdminRelease, Actor::Seller, at(3)).unwrap_err();
        assert!(matches!(err, TransitionError::NotPermitted { .. }));
    }

    #[test]
    fn reject_then_reopen_returns_to_created() {
        let mut t = tx();
        t.apply(&TransactionEvent::RejectContract, Actor::Buyer, at(1)).unwrap();
        assert_eq!(t.status, TransactionStatus::ContractRejected);
        t.apply(&TransactionEvent::ReopenNegotiation, Actor::Seller, at(2)).unwrap();
        assert_eq!(t.status, TransactionStatus::Created);
        assert_eq!(
            t.apply(&TransactionEvent::ReopenNegotiation, Actor::Seller, at(3)).unwrap(),
            Outcome::Unchanged
        );
    }

    #[test]
    fn party_role_lookup() {
        let t = tx();
        assert_eq!(t.party_role(t.buyer_id), Some(PartyRole::Buyer));
        assert_eq!(t.party_role(t.seller_id), Some(PartyRole::Seller));
        assert_eq!(t.party_role(UserId::new()), None);
        assert_eq!(t.party(PartyRole::Seller), t.seller_id);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionStatus::ContractAccepted).unwrap();
        assert_eq!(json, "\"contract_accepted\"");
    }
}
