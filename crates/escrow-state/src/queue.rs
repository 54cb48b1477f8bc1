//! # Escrow Release Queue Items
//!
//! Transactions needing a manual fund decision wait here for staff.
//!
//! ```text
//! Pending ──hold──▶ Held ──hold──▶ Held
//!    │                │
//!    ├──approve───────┼──▶ Approved (terminal)
//!    ├──reject────────┼──▶ Rejected (terminal)
//!    └──funds left────┴──▶ Closed (terminal)
//! ```
//!
//! `Closed` is never a staff decision: it records that the transaction
//! settled outside the queue (buyer release, accepted proposal, or a
//! decision on a duplicate item) while the item was still open.
//!
//! Listing order is `(priority rank, queued_at, id)`: urgent before high
//! before normal before low, oldest first within a band, id as the final
//! tie-break so the order is total. A hold resets `queued_at`, sending the
//! item to the back of its band.

use serde::{Deserialize, Serialize};

use escrow_core::{Amount, QueueItemId, Timestamp, TransactionId, UserId, ValidationError};

use crate::error::TransitionError;
use crate::resolution::ResolutionBreakdown;
use crate::Outcome;

/// Review priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Review first.
    Urgent,
    /// Above normal.
    High,
    /// Default.
    #[default]
    Normal,
    /// Review last.
    Low,
}

impl Priority {
    /// Sort rank; lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Ok(Self::Urgent),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(ValidationError::UnknownVariant {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// Status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Awaiting review.
    Pending,
    /// Released to the seller. Terminal.
    Approved,
    /// Refunded to the buyer. Terminal.
    Rejected,
    /// Deferred; still awaiting review.
    Held,
    /// Funds left escrow outside the queue. Terminal.
    Closed,
}

impl QueueStatus {
    /// Whether a final decision was made.
    pub fn is_decided(&self) -> bool {
        match self {
            Self::Approved | Self::Rejected | Self::Closed => true,
            Self::Pending | Self::Held => false,
        }
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Held => "held",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staff decision on a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDecision {
    /// Release escrow to the seller.
    Approve,
    /// Refund escrow to the buyer.
    Reject,
    /// Defer for later review.
    Hold,
}

impl QueueDecision {
    /// Status the decision moves the item to.
    pub fn target(&self) -> QueueStatus {
        match self {
            Self::Approve => QueueStatus::Approved,
            Self::Reject => QueueStatus::Rejected,
            Self::Hold => QueueStatus::Held,
        }
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Hold => "hold",
        }
    }
}

impl std::fmt::Display for QueueDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in an item's review history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueNote {
    /// Staff member.
    pub author_id: UserId,
    /// What they decided.
    pub decision: QueueDecision,
    /// Their notes.
    pub notes: String,
    /// When.
    pub at: Timestamp,
}

/// A transaction awaiting a manual release decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowQueueItem {
    /// Identifier.
    pub id: QueueItemId,
    /// Transaction whose funds are at stake.
    pub transaction_id: TransactionId,
    /// Escrowed total.
    pub total_amount: Amount,
    /// Withheld by the platform on release.
    pub platform_fee: Amount,
    /// `total_amount - platform_fee`.
    pub net_escrow: Amount,
    /// Review priority.
    pub priority: Priority,
    /// Status.
    pub status: QueueStatus,
    /// Why the item was queued.
    pub reason: String,
    /// Notes from the most recent decision.
    pub admin_notes: Option<String>,
    /// Full review history.
    pub history: Vec<QueueNote>,
    /// Staff member who made the final decision.
    pub decided_by: Option<UserId>,
    /// When the final decision was made.
    pub decided_at: Option<Timestamp>,
    /// Ordering key within the priority band.
    pub queued_at: Timestamp,
    /// Creation time.
    pub created_at: Timestamp,
}

impl EscrowQueueItem {
    /// Queue a transaction for review, withholding `fee_bps` basis points.
    pub fn new(
        transaction_id: TransactionId,
        total_amount: Amount,
        fee_bps: u32,
        priority: Priority,
        reason: &str,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        let reason = escrow_core::error::require_text("reason", reason)?;
        let platform_fee = total_amount.basis_points(fee_bps);
        let net_escrow = total_amount.checked_sub(platform_fee)?;
        Ok(Self {
            id: QueueItemId::new(),
            transaction_id,
            total_amount,
            platform_fee,
            net_escrow,
            priority,
            status: QueueStatus::Pending,
            reason,
            admin_notes: None,
            history: Vec::new(),
            decided_by: None,
            decided_at: None,
            queued_at: at,
            created_at: at,
        })
    }

    /// Whether the item still awaits a final decision.
    pub fn is_open(&self) -> bool {
        !self.status.is_decided()
    }

    /// Deterministic listing key.
    pub fn sort_key(&self) -> (u8, Timestamp, QueueItemId) {
        (self.priority.rank(), self.queued_at, self.id)
    }

    /// Close an open item whose transaction settled with `breakdown`
    /// outside the queue. A decided item is left as it is.
    pub fn close_settled(&mut self, breakdown: &ResolutionBreakdown, at: Timestamp) -> Outcome {
        if self.status.is_decided() {
            return Outcome::Unchanged;
        }
        self.status = QueueStatus::Closed;
        self.admin_notes = Some(format!(
            "escrow {} outside the release queue ({})",
            breakdown.funds_status(),
            breakdown.resolution_type
        ));
        self.decided_at = Some(at);
        Outcome::Applied
    }

    /// Record a staff decision. Notes are mandatory.
    pub fn decide(
        &mut self,
        staff: UserId,
        decision: QueueDecision,
        notes: &str,
        at: Timestamp,
    ) -> Result<(), TransitionError> {
        let notes = escrow_core::error::require_text("notes", notes)?;
        if self.status.is_decided() {
            return Err(TransitionError::AlreadyDecided {
                entity: "queue item",
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        self.history.push(QueueNote {
            author_id: staff,
            decision,
            notes: notes.clone(),
            at,
        });
        self.admin_notes = Some(notes);
        self.status = decision.target();
        match decision {
            QueueDecision::Hold => self.queued_at = at,
            QueueDecision::Approve | QueueDecision::Reject => {
                self.decided_by = Some(staff);
                self.decided_at = Some(at);
            }
        }
        Ok(())
    }
}

/// Sort items into review order.
pub fn order_queue(items: &mut [EscrowQueueItem]) {
    items.sort_by_key(EscrowQueueItem::sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn item(priority: Priority, t: i64) -> EscrowQueueItem {
        let tx = TransactionId::new();
        EscrowQueueItem::new(tx, Amount::new(10_000), 250, priority, "work delivered", at(t))
            .unwrap()
    }

    #[test]
    fn fee_and_net_escrow() {
        let i = item(Priority::Normal, 0);
        assert_eq!(i.platform_fee, Amount::new(250));
        assert_eq!(i.net_escrow, Amount::new(9_750));
    }

    #[test]
    fn listing_order_by_priority_then_age() {
        let mut items =
            vec![item(Priority::Urgent, 2), item(Priority::High, 1), item(Priority::Urgent, 1)];
        order_queue(&mut items);
        let got: Vec<(Priority, i64)> =
            items.iter().map(|i| (i.priority, i.queued_at.as_millis())).collect();
        assert_eq!(got, vec![(Priority::Urgent, 1), (Priority::Urgent, 2), (Priority::High, 1)]);
    }

    #[test]
    fn hold_requeues_to_back_of_band() {
        let mut a = item(Priority::Normal, 1);
        let b = item(Priority::Normal, 2);
        a.decide(UserId::new(), QueueDecision::Hold, "waiting on delivery proof", at(3)).unwrap();
        assert_eq!(a.status, QueueStatus::Held);
        assert!(a.is_open());
        assert!(a.decided_by.is_none());
        let mut items = vec![a, b];
        order_queue(&mut items);
        assert_eq!(items[0].queued_at, at(2));
        assert_eq!(items[1].admin_notes.as_deref(), Some("waiting on delivery proof"));
    }

    #[test]
    fn decide_requires_notes() {
        let mut i = item(Priority::Low, 0);
        let err = i.decide(UserId::new(), QueueDecision::Approve, "  ", at(1)).unwrap_err();
        assert!(matches!(err, TransitionError::Validation(_)));
        assert_eq!(i.status, QueueStatus::Pending);
    }

    #[test]
    fn approved_item_cannot_be_redecided() {
        let mut i = item(Priority::High, 0);
        let admin = UserId::new();
        i.decide(admin, QueueDecision::Approve, "delivery confirmed", at(1)).unwrap();
        assert_eq!(i.decided_by, Some(admin));
        for d in [QueueDecision::Approve, QueueDecision::Reject, QueueDecision::Hold] {
            let err = i.decide(admin, d, "again", at(2)).unwrap_err();
            assert!(matches!(err, TransitionError::AlreadyDecided { .. }));
        }
        assert_eq!(i.history.len(), 1);
    }

    #[test]
    fn settled_elsewhere_closes_open_item_once() {
        let mut i = item(Priority::Normal, 0);
        let split = ResolutionBreakdown::refund_full(i.total_amount);
        assert_eq!(i.close_settled(&split, at(5)), Outcome::Applied);
        assert_eq!(i.status, QueueStatus::Closed);
        assert!(!i.is_open());
        assert_eq!(i.decided_by, None);
        assert_eq!(i.decided_at, Some(at(5)));
        assert!(i.admin_notes.as_deref().unwrap_or_default().contains("refunded"));
        assert_eq!(i.close_settled(&split, at(6)), Outcome::Unchanged);

        let err = i.decide(UserId::new(), QueueDecision::Approve, "late", at(7)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyDecided { .. }));
    }

    #[test]
    fn decided_item_is_not_closed() {
        let mut i = item(Priority::High, 0);
        i.decide(UserId::new(), QueueDecision::Reject, "refund", at(1)).unwrap();
        let split = ResolutionBreakdown::refund_full(i.total_amount);
        assert_eq!(i.close_settled(&split, at(2)), Outcome::Unchanged);
        assert_eq!(i.status, QueueStatus::Rejected);
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("asap".parse::<Priority>().is_err());
    }

    fn priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Urgent),
            Just(Priority::High),
            Just(Priority::Normal),
            Just(Priority::Low),
        ]
    }

    proptest! {
        #[test]
        fn order_is_sorted_and_input_order_independent(
            specs in proptest::collection::vec((priority(), 0i64..20), 0..30),
        ) {
            let items: Vec<EscrowQueueItem> = specs.iter().map(|(p, t)| item(*p, *t)).collect();
            let mut forward = items.clone();
            let mut backward: Vec<EscrowQueueItem> = items.into_iter().rev().collect();
            order_queue(&mut forward);
            order_queue(&mut backward);
            prop_assert_eq!(&forward, &backward);
            for w in forward.windows(2) {
                let (a, b) = (&w[0], &w[1]);
                prop_assert!(a.priority.rank() < b.priority.rank()
                    || (a.priority == b.priority && a.queued_at <= b.queued_at));
            }
        }
    }
}
