//! # DisputeResolutionEngine
//!
//! Opens disputes, collects proposals and settles the dispute when one is
//! accepted.
//!
//! ```text
//!   open_dispute ──▶ Open ──accept proposal──▶ Resolved
//!                     │                           ▲
//!                     └──escalate──▶ Open+frozen ─┘ staff queue decision
//! ```
//!
//! The dispute record is the commit point. Accepting a proposal writes the
//! resolution (proposal id and split) onto the dispute under its version
//! precondition; marking the proposal accepted, sweeping the other pending
//! proposals and settling the transaction follow as cascades. Escalation
//! also writes the dispute first, so an acceptance racing an escalation
//! loses with `Conflict` instead of settling a frozen case.

use escrow_core::{Actor, Amount, DisputeId, ProposalId, QueueItemId, TransactionId, UserId};
use escrow_ledger::{Filter, Versioned};
use escrow_state::{
    Dispute, DisputeProposal, DisputeResolution, Outcome, ProposalResponse, ProposalStatus,
    ProposalType, Transaction, TransactionEvent, TransactionStatus,
};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::notify::EventKind;
use crate::queue::{close_settled_items, EscrowReleaseQueue};

/// Dispute and proposal service.
#[derive(Debug, Clone)]
pub struct DisputeResolutionEngine {
    ctx: EngineContext,
    queue: EscrowReleaseQueue,
}

impl DisputeResolutionEngine {
    /// Bind to a context.
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            queue: EscrowReleaseQueue::new(ctx.clone()),
            ctx,
        }
    }

    /// Open a dispute on a paid transaction.
    ///
    /// The transaction must be `payment_made` or `work_completed`; it moves
    /// to `disputed`. A transaction has at most one open dispute: opening
    /// again while it is `disputed` returns the existing dispute.
    pub fn open_dispute(
        &self,
        transaction_id: TransactionId,
        initiator: UserId,
        reason: &str,
        description: Option<String>,
    ) -> Result<DisputeId, EngineError> {
        let mut tx = self.ctx.load_transaction(transaction_id)?;
        let role = self.ctx.party_of(&tx.record, initiator, "open dispute")?;
        let candidate =
            Dispute::open(transaction_id, initiator, reason, description, self.ctx.now())?;

        let outcome = self
            .ctx
            .advance(&mut tx, Actor::from(role), &TransactionEvent::OpenDispute)?;
        if outcome == Outcome::Unchanged {
            if let Some(existing) = self.open_dispute_of(transaction_id)? {
                tracing::debug!(
                    transaction_id = %transaction_id,
                    dispute_id = %existing.record.id,
                    "dispute already open"
                );
                return Ok(existing.record.id);
            }
        }

        let dispute = self.ctx.ledger.insert(candidate)?.record;
        tracing::info!(
            transaction_id = %transaction_id,
            dispute_id = %dispute.id,
            initiator = %initiator,
            "dispute opened"
        );
        self.ctx.notify(
            EventKind::DisputeOpened,
            transaction_id,
            None,
            Some(dispute.id),
            initiator,
            &[tx.record.party(role.counterparty())],
        );
        Ok(dispute.id)
    }

    /// A party proposes a resolution.
    ///
    /// Fails with `Escalated` while the case is under staff review, whoever
    /// the caller is. Partial types need `0 < amount < transaction.amount`.
    pub fn propose(
        &self,
        dispute_id: DisputeId,
        proposer: UserId,
        proposal_type: ProposalType,
        amount: Option<Amount>,
        description: Option<String>,
    ) -> Result<ProposalId, EngineError> {
        let dispute = self.load_dispute(dispute_id)?.record;
        let tx = self.ctx.load_transaction(dispute.transaction_id)?.record;
        ensure_not_escalated(&dispute, &tx)?;
        let role = self.ctx.party_of(&tx, proposer, "propose")?;
        ensure_negotiable(&dispute, &tx)?;

        let proposal = DisputeProposal::new(
            &dispute,
            proposer,
            proposal_type,
            amount,
            description,
            tx.amount,
            self.ctx.now(),
        )?;
        let proposal = self.ctx.ledger.insert(proposal)?.record;
        tracing::info!(
            dispute_id = %dispute_id,
            proposal_id = %proposal.id,
            proposal_type = %proposal_type,
            "proposal made"
        );
        self.ctx.notify(
            EventKind::ProposalMade,
            tx.id,
            None,
            Some(dispute_id),
            proposer,
            &[tx.party(role.counterparty())],
        );
        Ok(proposal.id)
    }

    /// The other party accepts or rejects a proposal.
    ///
    /// Rejecting changes only the proposal. Accepting computes the split
    /// from `(type, amount, transaction.amount)`, resolves the dispute and
    /// completes the transaction. Accepting the proposal that already
    /// settled the dispute re-runs the follow-up writes and succeeds.
    pub fn respond(
        &self,
        proposal_id: ProposalId,
        responder: UserId,
        response: ProposalResponse,
    ) -> Result<(), EngineError> {
        let mut proposal = self.load_proposal(proposal_id)?;
        let mut dispute = self.load_dispute(proposal.record.dispute_id)?;
        let tx = self.ctx.load_transaction(dispute.record.transaction_id)?.record;
        ensure_not_escalated(&dispute.record, &tx)?;
        let role = self.ctx.party_of(&tx, responder, "answer proposal")?;

        let mut answered = proposal.record.clone();
        let outcome = answered.respond(responder, response, self.ctx.now())?;

        match response {
            ProposalResponse::Reject => {
                if outcome == Outcome::Applied {
                    proposal.record = answered;
                    self.ctx.ledger.update(&mut proposal)?;
                    tracing::info!(proposal_id = %proposal_id, "proposal rejected");
                    self.ctx.notify(
                        EventKind::ProposalRejected,
                        tx.id,
                        None,
                        Some(dispute.record.id),
                        responder,
                        &[proposal.record.proposer_id],
                    );
                }
                Ok(())
            }
            ProposalResponse::Accept => {
                let breakdown = proposal.record.breakdown(tx.amount)?;
                if dispute.record.is_open() {
                    ensure_negotiable(&dispute.record, &tx)?;
                }
                let resolution = DisputeResolution {
                    accepted_proposal_id: Some(proposal_id),
                    breakdown,
                    decided_by: responder,
                };
                let mut resolved = dispute.record.clone();
                let committed = resolved.resolve(resolution, None, self.ctx.now())?;
                if committed == Outcome::Applied {
                    dispute.record = resolved;
                    self.ctx.ledger.update(&mut dispute)?;
                    tracing::info!(
                        dispute_id = %dispute.record.id,
                        proposal_id = %proposal_id,
                        buyer_refund = %breakdown.buyer_refund,
                        seller_release = %breakdown.seller_release,
                        "dispute resolved"
                    );
                }
                settle(&self.ctx, &dispute.record, Actor::from(role));
                if committed == Outcome::Applied {
                    self.ctx.notify(
                        EventKind::DisputeResolved,
                        tx.id,
                        None,
                        Some(dispute.record.id),
                        responder,
                        &[proposal.record.proposer_id],
                    );
                }
                Ok(())
            }
        }
    }

    /// Hand a dispute to staff: proposals freeze, the transaction moves to
    /// `escalated` and an escrow queue item is opened at the configured
    /// escalation priority. Either party or a staff member may escalate.
    pub fn escalate(
        &self,
        dispute_id: DisputeId,
        caller: UserId,
    ) -> Result<QueueItemId, EngineError> {
        let user_role = self.ctx.require_user(caller)?;
        let mut dispute = self.load_dispute(dispute_id)?;
        let tx = self.ctx.load_transaction(dispute.record.transaction_id)?.record;
        let actor = match tx.party_role(caller) {
            Some(role) => Actor::from(role),
            None if user_role.can_hold_release() => Actor::Admin,
            None => return Err(EngineError::not_authorized(caller, "escalate", dispute_id)),
        };
        if dispute.record.is_open()
            && !matches!(tx.status, TransactionStatus::Disputed | TransactionStatus::Escalated)
        {
            return Err(EngineError::invalid(
                "transaction",
                tx.id,
                tx.status,
                TransactionStatus::Escalated,
            ));
        }

        let mut escalated = dispute.record.clone();
        if escalated.escalate(self.ctx.now())? == Outcome::Applied {
            dispute.record = escalated;
            self.ctx.ledger.update(&mut dispute)?;
            tracing::info!(dispute_id = %dispute_id, actor = %actor, "dispute escalated");
            let recipients: Vec<UserId> = [tx.buyer_id, tx.seller_id]
                .into_iter()
                .filter(|u| *u != caller)
                .collect();
            self.ctx.notify(
                EventKind::DisputeEscalated,
                tx.id,
                None,
                Some(dispute_id),
                caller,
                &recipients,
            );
        }

        let moved = self
            .ctx
            .advance_by_id(tx.id, actor, &TransactionEvent::Escalate);
        self.ctx.cascade("transaction follows escalation", tx.id, moved);

        self.queue.enqueue(
            tx.id,
            caller,
            &escalation_reason(&dispute.record),
            self.ctx.config.escalation_priority,
        )
    }

    /// One dispute.
    pub fn dispute(&self, id: DisputeId) -> Result<Dispute, EngineError> {
        Ok(self.load_dispute(id)?.record)
    }

    /// One proposal.
    pub fn proposal(&self, id: ProposalId) -> Result<DisputeProposal, EngineError> {
        Ok(self.load_proposal(id)?.record)
    }

    /// Every dispute raised on a transaction, oldest first.
    pub fn disputes_for(&self, transaction_id: TransactionId) -> Result<Vec<Dispute>, EngineError> {
        Ok(disputes_of(&self.ctx, transaction_id)?
            .into_iter()
            .map(|v| v.record)
            .collect())
    }

    /// Every proposal made on a dispute, oldest first.
    pub fn proposals_for(
        &self,
        dispute_id: DisputeId,
    ) -> Result<Vec<DisputeProposal>, EngineError> {
        Ok(proposals_of(&self.ctx, dispute_id)?
            .into_iter()
            .map(|v| v.record)
            .collect())
    }

    fn load_dispute(&self, id: DisputeId) -> Result<Versioned<Dispute>, EngineError> {
        self.ctx
            .ledger
            .try_load(*id.as_uuid())?
            .ok_or_else(|| EngineError::not_found("dispute", id))
    }

    fn load_proposal(&self, id: ProposalId) -> Result<Versioned<DisputeProposal>, EngineError> {
        self.ctx
            .ledger
            .try_load(*id.as_uuid())?
            .ok_or_else(|| EngineError::not_found("proposal", id))
    }

    fn open_dispute_of(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Versioned<Dispute>>, EngineError> {
        Ok(disputes_of(&self.ctx, transaction_id)?
            .into_iter()
            .find(|d| d.record.is_open()))
    }
}

fn ensure_not_escalated(dispute: &Dispute, tx: &Transaction) -> Result<(), EngineError> {
    if dispute.is_escalated() || tx.status == TransactionStatus::Escalated {
        return Err(EngineError::Escalated {
            dispute_id: dispute.id.to_string(),
            transaction_id: tx.id.to_string(),
        });
    }
    Ok(())
}

fn ensure_negotiable(dispute: &Dispute, tx: &Transaction) -> Result<(), EngineError> {
    if !dispute.is_open() {
        return Err(EngineError::AlreadyDecided {
            entity: "dispute",
            id: dispute.id.to_string(),
            status: dispute.status.to_string(),
        });
    }
    if tx.status != TransactionStatus::Disputed {
        return Err(EngineError::invalid("transaction", tx.id, tx.status, "dispute settlement"));
    }
    Ok(())
}

pub(crate) fn escalation_reason(dispute: &Dispute) -> String {
    format!("dispute escalated: {}", dispute.reason)
}

pub(crate) fn disputes_of(
    ctx: &EngineContext,
    transaction_id: TransactionId,
) -> Result<Vec<Versioned<Dispute>>, EngineError> {
    let mut found = ctx.ledger.find::<Dispute>(&Filter::field_eq(
        "transaction_id",
        transaction_id.as_uuid().to_string(),
    ))?;
    found.sort_by_key(|d| (d.record.opened_at, d.record.id));
    Ok(found)
}

pub(crate) fn proposals_of(
    ctx: &EngineContext,
    dispute_id: DisputeId,
) -> Result<Vec<Versioned<DisputeProposal>>, EngineError> {
    let mut found = ctx.ledger.find::<DisputeProposal>(&Filter::field_eq(
        "dispute_id",
        dispute_id.as_uuid().to_string(),
    ))?;
    found.sort_by_key(|p| (p.record.created_at, p.record.id));
    Ok(found)
}

/// Bring the accepted proposal, the other pending proposals and the
/// transaction in line with a dispute settled by proposal. Each step is
/// idempotent; failures are logged and left for the next repair.
pub(crate) fn settle(ctx: &EngineContext, dispute: &Dispute, actor: Actor) -> Vec<&'static str> {
    let mut applied = Vec::new();
    let Some(resolution) = dispute.resolution else {
        return applied;
    };
    let Some(accepted_id) = resolution.accepted_proposal_id else {
        return applied;
    };
    let at = dispute.resolved_at.unwrap_or_else(|| ctx.now());

    let proposals = ctx.cascade("load proposals", dispute.id, proposals_of(ctx, dispute.id));
    for mut proposal in proposals.unwrap_or_default() {
        let outcome = if proposal.record.id == accepted_id {
            proposal.record.mark_accepted(resolution.decided_by, at)
        } else if proposal.record.status == ProposalStatus::Pending {
            proposal.record.supersede(at)
        } else {
            Outcome::Unchanged
        };
        if outcome == Outcome::Applied {
            let step = if proposal.record.id == accepted_id {
                "mark proposal accepted"
            } else {
                "supersede proposal"
            };
            let written = ctx.ledger.update(&mut proposal).map_err(EngineError::from);
            if ctx.cascade(step, proposal.record.id, written).is_some() {
                applied.push(step);
            }
        }
    }

    let event = TransactionEvent::SettleDispute {
        breakdown: resolution.breakdown,
    };
    let moved = ctx.advance_by_id(dispute.transaction_id, actor, &event);
    if let Some((tx, outcome)) = ctx.cascade("settle transaction", dispute.transaction_id, moved) {
        if outcome == Outcome::Applied {
            applied.push("settle transaction");
        }
        applied.extend(close_settled_items(ctx, &tx));
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Harness;
    use escrow_state::{DisputeStatus, FundsStatus};
    use proptest::prelude::*;

    #[test]
    fn open_requires_paid_transaction() {
        let h = Harness::new();
        let tx = h.accepted(10_000);
        let err = h
            .engine
            .disputes()
            .open_dispute(tx, h.buyer, "not delivered", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn second_open_returns_existing_dispute() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let first = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let again = h.engine.disputes().open_dispute(tx, h.seller, "also late", None).unwrap();
        assert_eq!(first, again);
        assert_eq!(h.engine.disputes().disputes_for(tx).unwrap().len(), 1);
    }

    #[test]
    fn outsider_cannot_open() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let err = h
            .engine
            .disputes()
            .open_dispute(tx, h.admin, "staff cannot open", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized { .. }));
    }

    #[test]
    fn accepting_refund_partial_splits_funds() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "half done", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.buyer, ProposalType::RefundPartial, Some(Amount::new(4_000)), None)
            .unwrap();
        h.engine.disputes().respond(p, h.seller, ProposalResponse::Accept).unwrap();

        let t = h.engine.transactions().get(tx).unwrap();
        assert_eq!(t.status, TransactionStatus::Completed);
        assert_eq!(t.funds, FundsStatus::Split);
        let split = t.resolution.unwrap();
        assert_eq!(split.buyer_refund, Amount::new(4_000));
        assert_eq!(split.seller_release, Amount::new(6_000));
        assert_eq!(h.engine.disputes().dispute(d).unwrap().status, DisputeStatus::Resolved);
        assert_eq!(h.engine.disputes().proposal(p).unwrap().status, ProposalStatus::Accepted);
    }

    #[test]
    fn rejection_keeps_dispute_open() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleaseFull, None, None)
            .unwrap();
        h.engine.disputes().respond(p, h.buyer, ProposalResponse::Reject).unwrap();
        assert!(h.engine.disputes().dispute(d).unwrap().is_open());
        assert_eq!(h.engine.transactions().get(tx).unwrap().status, TransactionStatus::Disputed);
        assert_eq!(h.engine.disputes().proposal(p).unwrap().status, ProposalStatus::Rejected);
    }

    #[test]
    fn acceptance_sweeps_other_pending_proposals() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let ours = h
            .engine
            .disputes()
            .propose(d, h.buyer, ProposalType::RefundFull, None, None)
            .unwrap();
        let theirs = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleasePartial, Some(Amount::new(5_000)), None)
            .unwrap();
        h.engine.disputes().respond(theirs, h.buyer, ProposalResponse::Accept).unwrap();
        assert_eq!(h.engine.disputes().proposal(ours).unwrap().status, ProposalStatus::Rejected);

        let err = h
            .engine
            .disputes()
            .respond(ours, h.seller, ProposalResponse::Accept)
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyDecided { .. }));
    }

    #[test]
    fn accepting_twice_is_idempotent() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleaseFull, None, None)
            .unwrap();
        h.engine.disputes().respond(p, h.buyer, ProposalResponse::Accept).unwrap();
        let before = h.engine.transactions().get(tx).unwrap();
        h.engine.disputes().respond(p, h.buyer, ProposalResponse::Accept).unwrap();
        assert_eq!(h.engine.transactions().get(tx).unwrap(), before);
    }

    #[test]
    fn partial_amount_at_total_is_validation_error() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let err = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleasePartial, Some(Amount::new(10_000)), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn escalation_freezes_proposals_for_everyone() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let p = h
            .engine
            .disputes()
            .propose(d, h.seller, ProposalType::ReleaseFull, None, None)
            .unwrap();
        let item = h.engine.disputes().escalate(d, h.buyer).unwrap();
        assert_eq!(h.engine.transactions().get(tx).unwrap().status, TransactionStatus::Escalated);
        assert_eq!(
            h.engine.queue().item(item).unwrap().priority,
            h.engine.context().config().escalation_priority
        );

        for actor in [h.buyer, h.seller, h.admin, h.stranger] {
            let err = h
                .engine
                .disputes()
                .propose(d, actor, ProposalType::RefundFull, None, None)
                .unwrap_err();
            assert!(matches!(err, EngineError::Escalated { .. }), "{actor}");
            let err = h
                .engine
                .disputes()
                .respond(p, actor, ProposalResponse::Accept)
                .unwrap_err();
            assert!(matches!(err, EngineError::Escalated { .. }), "{actor}");
        }
    }

    #[test]
    fn escalating_twice_reuses_the_queue_item() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.seller, "buyer unresponsive", None).unwrap();
        let first = h.engine.disputes().escalate(d, h.seller).unwrap();
        let second = h.engine.disputes().escalate(d, h.moderator).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn plain_user_outsider_cannot_escalate() {
        let h = Harness::new();
        let tx = h.paid(10_000);
        let d = h.engine.disputes().open_dispute(tx, h.buyer, "late", None).unwrap();
        let err = h.engine.disputes().escalate(d, h.stranger).unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized { .. }));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn accepted_split_always_conserves_escrow(
            (total, amount) in (2u64..1_000_000).prop_flat_map(|t| (Just(t), 1..t)),
            refund in any::<bool>(),
        ) {
            let h = Harness::new();
            let tx = h.paid(total);
            let disputes = h.engine.disputes();
            let d = disputes.open_dispute(tx, h.buyer, "partial delivery", None).unwrap();
            let kind = if refund {
                ProposalType::RefundPartial
            } else {
                ProposalType::ReleasePartial
            };
            let p = disputes
                .propose(d, h.seller, kind, Some(Amount::new(amount)), None)
                .unwrap();
            disputes.respond(p, h.buyer, ProposalResponse::Accept).unwrap();

            let t = h.engine.transactions().get(tx).unwrap();
            let split = t.resolution.unwrap();
            prop_assert_eq!(t.status, TransactionStatus::Completed);
            prop_assert_eq!(split.total_amount, Amount::new(total));
            prop_assert_eq!(split.buyer_refund.units() + split.seller_release.units(), total);
        }
    }
}
