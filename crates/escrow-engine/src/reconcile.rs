//! # Read-Time Repair
//!
//! Cross-entity writes are cascades: the first write commits, the rest
//! are attempted once and logged if they fail. [`Reconciler::repair`]
//! re-derives what the transaction (and the records hanging off it)
//! should look like from the records that did commit, and re-applies the
//! missing writes:
//!
//! - the active contract's answer, onto the transaction status
//! - a proposal-settled dispute, onto the transaction, the accepted
//!   proposal and the other pending proposals
//! - an escalated dispute, onto the transaction and the release queue
//! - a decided queue item, onto the transaction and its open dispute
//! - a settled transaction, onto its still-open queue items
//!
//! Every step is a no-op when its target already matches, so repair can
//! run on every read.
//!
//! Repair never overwrites a settlement. When two committed records
//! disagree about where the escrow went (a resolved dispute or a decided
//! queue item against the transaction's split), the disagreement is
//! listed in [`RepairReport::conflicts`] and left for staff.

use serde::Serialize;

use escrow_core::{Actor, TransactionId};
use escrow_state::{
    ContractChain, ContractStatus, Dispute, EscrowQueueItem, Outcome, QueueDecision, QueueStatus,
    ResolutionBreakdown, Transaction, TransactionEvent, TransactionStatus,
};

use crate::context::EngineContext;
use crate::dispute::{disputes_of, escalation_reason, settle};
use crate::error::EngineError;
use crate::queue::{
    apply_decision, close_settled_items, items_of, release_event, EscrowReleaseQueue,
};

/// What a repair pass changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// The transaction repaired.
    pub transaction_id: TransactionId,
    /// Steps that wrote something, in order.
    pub applied: Vec<&'static str>,
    /// Committed records that disagree with the transaction's split.
    pub conflicts: Vec<String>,
}

impl RepairReport {
    /// Whether nothing needed repair and nothing disagrees.
    pub fn is_clean(&self) -> bool {
        self.applied.is_empty() && self.conflicts.is_empty()
    }
}

/// Re-applies lost cascades.
#[derive(Debug, Clone)]
pub struct Reconciler {
    ctx: EngineContext,
}

impl Reconciler {
    /// Bind to a context.
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Repair one transaction and everything that hangs off it.
    pub fn repair(&self, transaction_id: TransactionId) -> Result<RepairReport, EngineError> {
        let tx = self.ctx.load_transaction(transaction_id)?.record;
        let mut applied = Vec::new();

        self.repair_contract(&tx, &mut applied)?;

        for dispute in disputes_of(&self.ctx, transaction_id)? {
            let dispute = dispute.record;
            if dispute.resolution.is_some() {
                applied.extend(settle(&self.ctx, &dispute, Actor::System));
            } else if dispute.is_escalated() {
                self.repair_escalation(transaction_id, &dispute, &mut applied);
            }
        }

        for item in items_of(&self.ctx, transaction_id)? {
            let Some(event) = decision_event(item.record.status) else {
                continue;
            };
            applied.extend(apply_decision(&self.ctx, &item.record, &event, Actor::System));
        }

        let tx = self.ctx.load_transaction(transaction_id)?.record;
        applied.extend(close_settled_items(&self.ctx, &tx));

        let disputes: Vec<Dispute> = disputes_of(&self.ctx, transaction_id)?
            .into_iter()
            .map(|d| d.record)
            .collect();
        let items: Vec<EscrowQueueItem> = items_of(&self.ctx, transaction_id)?
            .into_iter()
            .map(|i| i.record)
            .collect();
        let conflicts = divergences(&tx, &disputes, &items);

        if !applied.is_empty() {
            tracing::info!(
                transaction_id = %transaction_id,
                steps = ?applied,
                "repaired lost cascades"
            );
        }
        for conflict in &conflicts {
            tracing::error!(
                transaction_id = %transaction_id,
                conflict = %conflict,
                "records disagree"
            );
        }
        Ok(RepairReport {
            transaction_id,
            applied,
            conflicts,
        })
    }

    fn repair_contract(
        &self,
        tx: &Transaction,
        applied: &mut Vec<&'static str>,
    ) -> Result<(), EngineError> {
        let Some(chain) = self.ctx.ledger.try_load::<ContractChain>(*tx.id.as_uuid())? else {
            return Ok(());
        };
        let Some(active) = chain.record.active() else {
            return Ok(());
        };
        let creator = tx.party_role(active.creator_id).map(Actor::from);
        let recipient = active
            .recipient_id
            .and_then(|r| tx.party_role(r))
            .map(Actor::from);

        let mut steps: Vec<(Actor, TransactionEvent)> = Vec::new();
        match (active.status, tx.status) {
            (ContractStatus::AcceptedAwaitingPayment, TransactionStatus::ContractRejected) => {
                steps.extend(creator.map(|a| (a, TransactionEvent::ReopenNegotiation)));
                steps.extend(recipient.map(|a| {
                    (a, TransactionEvent::AcceptContract { amount: active.amount })
                }));
            }
            (ContractStatus::AcceptedAwaitingPayment, TransactionStatus::Created) => {
                steps.extend(recipient.map(|a| {
                    (a, TransactionEvent::AcceptContract { amount: active.amount })
                }));
            }
            (ContractStatus::Rejected, TransactionStatus::Created) => {
                steps.extend(recipient.map(|a| (a, TransactionEvent::RejectContract)));
            }
            (
                ContractStatus::Draft | ContractStatus::AwaitingAcceptance,
                TransactionStatus::ContractRejected,
            ) => {
                steps.extend(creator.map(|a| (a, TransactionEvent::ReopenNegotiation)));
            }
            _ => {}
        }

        for (actor, event) in steps {
            let moved = self.ctx.advance_by_id(tx.id, actor, &event);
            match self.ctx.cascade("transaction follows contract", tx.id, moved) {
                Some((_, Outcome::Applied)) => applied.push(event.name()),
                Some((_, Outcome::Unchanged)) => {}
                None => break,
            }
        }
        Ok(())
    }

    fn repair_escalation(
        &self,
        transaction_id: TransactionId,
        dispute: &Dispute,
        applied: &mut Vec<&'static str>,
    ) {
        let moved = self
            .ctx
            .advance_by_id(transaction_id, Actor::System, &TransactionEvent::Escalate);
        match self.ctx.cascade("transaction follows escalation", transaction_id, moved) {
            Some((_, Outcome::Applied)) => applied.push("escalate transaction"),
            Some((_, Outcome::Unchanged)) => {}
            None => return,
        }

        let items = self
            .ctx
            .cascade("load queue items", transaction_id, items_of(&self.ctx, transaction_id))
            .unwrap_or_default();
        if !items.is_empty() {
            return;
        }
        let queued = EscrowReleaseQueue::new(self.ctx.clone()).enqueue(
            transaction_id,
            dispute.initiator_id,
            &escalation_reason(dispute),
            self.ctx.config.escalation_priority,
        );
        if self.ctx.cascade("enqueue escalation", transaction_id, queued).is_some() {
            applied.push("enqueue escalation");
        }
    }
}

/// Settled disputes and decided items whose split differs from the one
/// recorded on the transaction.
fn divergences(
    tx: &Transaction,
    disputes: &[Dispute],
    items: &[EscrowQueueItem],
) -> Vec<String> {
    let Some(settled) = tx.resolution else {
        return Vec::new();
    };
    let recorded = disputes
        .iter()
        .filter_map(|d| d.resolution.map(|r| (format!("dispute {}", d.id), r.breakdown)))
        .chain(items.iter().filter_map(|item| {
            let expected = match item.status {
                QueueStatus::Approved => ResolutionBreakdown::release_full(tx.amount),
                QueueStatus::Rejected => ResolutionBreakdown::refund_full(tx.amount),
                QueueStatus::Pending | QueueStatus::Held | QueueStatus::Closed => return None,
            };
            Some((format!("queue item {} ({})", item.id, item.status), expected))
        }));
    recorded
        .filter(|(_, breakdown)| *breakdown != settled)
        .map(|(source, breakdown)| {
            format!(
                "{source} settles {} ({} to buyer, {} to seller) but the transaction \
                 recorded {} ({} to buyer, {} to seller)",
                breakdown.resolution_type,
                breakdown.buyer_refund,
                breakdown.seller_release,
                settled.resolution_type,
                settled.buyer_refund,
                settled.seller_release,
            )
        })
        .collect()
}

fn decision_event(status: QueueStatus) -> Option<TransactionEvent> {
    match status {
        QueueStatus::Approved => release_event(QueueDecision::Approve),
        QueueStatus::Rejected => release_event(QueueDecision::Reject),
        QueueStatus::Pending | QueueStatus::Held | QueueStatus::Closed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Harness;
    use escrow_core::Amount;
    use escrow_core::QueueItemId;
    use escrow_state::{
        ContractResponse, DisputeResolution, FundsStatus, Priority, ProposalResponse,
        ProposalStatus, ProposalType,
    };

    /// A paid transaction with an open item, whose dispute is committed as
    /// settled 6000/4000 while the transaction itself records a full
    /// release to the seller.
    fn diverged(h: &Harness) -> (TransactionId, QueueItemId) {
        let tx = h.paid(10_000);
        let item = h
            .engine
            .queue()
            .enqueue(tx, h.buyer, "delivery unclear", Priority::Normal)
            .unwrap();
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "half done", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleasePartial, Some(Amount::new(6_000)), None)
            .unwrap();
        let breakdown = h
            .engine
            .disputes()
            .proposal(p)
            .unwrap()
            .breakdown(Amount::new(10_000))
            .unwrap();

        let mut dispute = h.ctx.ledger.load::<Dispute>(*d.as_uuid()).unwrap();
        let resolution = DisputeResolution {
            accepted_proposal_id: Some(p),
            breakdown,
            decided_by: h.buyer,
        };
        dispute.record.resolve(resolution, None, h.ctx.now()).unwrap();
        h.ctx.ledger.update(&mut dispute).unwrap();

        let mut stored = h.ctx.load_transaction(tx).unwrap();
        stored
            .record
            .apply(&TransactionEvent::AdminRelease, Actor::Admin, h.ctx.now())
            .unwrap();
        h.ctx.ledger.update(&mut stored).unwrap();
        (tx, item)
    }

    #[test]
    fn clean_transaction_needs_nothing() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let report = h.engine.reconciler().repair(tx).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn resolved_dispute_completes_transaction() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleasePartial, Some(Amount::new(7_000)), None)
            .unwrap();
        let breakdown = h
            .engine
            .disputes()
            .proposal(p)
            .unwrap()
            .breakdown(Amount::new(10_000))
            .unwrap();

        // Commit only the dispute write, as if every cascade was lost.
        let mut dispute = h.ctx.ledger.load::<Dispute>(*d.as_uuid()).unwrap();
        dispute
            .record
            .resolve(
                DisputeResolution {
                    accepted_proposal_id: Some(p),
                    breakdown,
                    decided_by: h.buyer,
                },
                None,
                h.ctx.now(),
            )
            .unwrap();
        h.ctx.ledger.update(&mut dispute).unwrap();
        assert_eq!(h.engine.transactions().get(tx).unwrap().status, TransactionStatus::Disputed);

        let report = h.engine.reconciler().repair(tx).unwrap();
        assert_eq!(report.applied, vec!["mark proposal accepted", "settle transaction"]);
        let t = h.engine.transactions().get(tx).unwrap();
        assert_eq!(t.status, TransactionStatus::Completed);
        assert_eq!(t.resolution, Some(breakdown));
        assert_eq!(h.engine.disputes().proposal(p).unwrap().status, ProposalStatus::Accepted);

        assert!(h.engine.reconciler().repair(tx).unwrap().is_clean());
    }

    #[test]
    fn accepted_contract_moves_transaction() {
        let h = Harness::new();
        let tx = h.open(10_000);
        let c = h.offer(tx, 8_000);

        // Accept on the chain only.
        let mut chain = h.ctx.ledger.load::<ContractChain>(*tx.as_uuid()).unwrap();
        chain
            .record
            .respond(c, h.buyer, ContractResponse::Accept, None, h.ctx.now())
            .unwrap();
        h.ctx.ledger.update(&mut chain).unwrap();

        let repaired = h.engine.transaction(tx).unwrap();
        assert_eq!(repaired.status, TransactionStatus::ContractAccepted);
        assert_eq!(repaired.amount, Amount::new(8_000));
    }

    #[test]
    fn settled_flow_is_stable_under_repeated_repair() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.buyer, ProposalType::RefundFull, None, None)
            .unwrap();
        h.engine.disputes().respond(p, h.seller, ProposalResponse::Accept).unwrap();
        let settled = h.engine.transactions().get(tx).unwrap();
        for _ in 0..3 {
            assert!(h.engine.reconciler().repair(tx).unwrap().is_clean());
        }
        assert_eq!(h.engine.transactions().get(tx).unwrap(), settled);
        assert_eq!(settled.resolution, Some(ResolutionBreakdown::refund_full(Amount::new(10_000))));
    }

    #[test]
    fn diverging_settlements_are_reported_not_overwritten() {
        let h = Harness::new();
        let (tx, item) = diverged(&h);
        let before = h.engine.transactions().get(tx).unwrap();

        let report = h.engine.reconciler().repair(tx).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.conflicts.len(), 1, "{:?}", report.conflicts);
        assert!(report.conflicts[0].contains("release_partial"), "{}", report.conflicts[0]);

        let after = h.engine.transactions().get(tx).unwrap();
        assert_eq!(after.resolution, before.resolution);
        assert_eq!(after.funds, before.funds);
        assert_eq!(h.engine.queue().item(item).unwrap().status, QueueStatus::Closed);

        let again = h.engine.reconciler().repair(tx).unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.conflicts, report.conflicts);
    }

    #[test]
    fn decision_is_refused_while_records_disagree() {
        let h = Harness::new();
        let (tx, item) = diverged(&h);
        let err = h
            .engine
            .queue()
            .decide(item, h.admin, QueueDecision::Reject, "refund the buyer")
            .unwrap_err();
        assert!(matches!(err, EngineError::Diverged { .. }), "{err}");
        assert_eq!(err.code(), "DIVERGED");
        assert_eq!(h.engine.transactions().get(tx).unwrap().funds, FundsStatus::Released);
    }
}
