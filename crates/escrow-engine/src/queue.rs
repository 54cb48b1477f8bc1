//! # EscrowReleaseQueue
//!
//! Manual release review. An item is opened for a transaction holding
//! escrow (most often by escalation) and closed by a staff decision:
//!
//! | decision  | who                       | item       | transaction              |
//! |-----------|---------------------------|------------|--------------------------|
//! | `approve` | admin                     | `approved` | `completed`, `released`  |
//! | `reject`  | admin                     | `rejected` | `refunded`, `refunded`   |
//! | `hold`    | admin, moderator, support | `held`     | unchanged                |
//!
//! The item write is the commit point. A decision first repairs the
//! transaction, so a settlement whose transaction write was lost is
//! applied before staff can overrule it, and is refused outright when the
//! committed records disagree. The decision is then applied to a scratch
//! copy of the transaction so an item is never approved for a
//! transaction whose funds already left escrow another way. The
//! transaction write and the closing of an open dispute follow as
//! cascades.
//!
//! When funds leave escrow outside the queue, open items for the
//! transaction are moved to `closed`.

use escrow_core::{Actor, QueueItemId, TransactionId, UserId, UserRole};
use escrow_ledger::{Filter, Versioned};
use escrow_state::{
    order_queue, DisputeResolution, EscrowQueueItem, Outcome, Priority, QueueDecision, QueueStatus,
    ResolutionBreakdown, Transaction, TransactionEvent,
};

use crate::context::EngineContext;
use crate::dispute::disputes_of;
use crate::error::EngineError;
use crate::notify::EventKind;
use crate::reconcile::Reconciler;

/// Staff review queue.
#[derive(Debug, Clone)]
pub struct EscrowReleaseQueue {
    ctx: EngineContext,
}

impl EscrowReleaseQueue {
    /// Bind to a context.
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Queue a transaction holding escrow for a release decision.
    ///
    /// `requested_by` must be a party or staff. If the transaction already
    /// has an open item, that item's id is returned and nothing is written.
    pub fn enqueue(
        &self,
        transaction_id: TransactionId,
        requested_by: UserId,
        reason: &str,
        priority: Priority,
    ) -> Result<QueueItemId, EngineError> {
        let role = self.ctx.require_user(requested_by)?;
        let tx = self.ctx.load_transaction(transaction_id)?.record;
        if tx.party_role(requested_by).is_none() && !role.can_hold_release() {
            return Err(EngineError::not_authorized(requested_by, "enqueue", transaction_id));
        }
        if !tx.status.holds_funds() {
            return Err(EngineError::invalid("transaction", tx.id, tx.status, "escrow review"));
        }
        if let Some(open) = items_of(&self.ctx, transaction_id)?
            .into_iter()
            .find(|item| item.record.is_open())
        {
            tracing::debug!(
                transaction_id = %transaction_id,
                queue_item_id = %open.record.id,
                "transaction already queued"
            );
            return Ok(open.record.id);
        }

        let item = EscrowQueueItem::new(
            tx.id,
            tx.amount,
            self.ctx.config.platform_fee_bps,
            priority,
            reason,
            self.ctx.now(),
        )?;
        let item = self.ctx.ledger.insert(item)?.record;
        tracing::info!(
            transaction_id = %tx.id,
            queue_item_id = %item.id,
            priority = %item.priority,
            platform_fee = %item.platform_fee,
            "escrow queued for review"
        );
        self.ctx.notify(
            EventKind::EscrowQueued,
            tx.id,
            None,
            None,
            requested_by,
            &[tx.buyer_id, tx.seller_id],
        );
        Ok(item.id)
    }

    /// Record a staff decision. Notes are mandatory; an approved or
    /// rejected item cannot be decided again.
    pub fn decide(
        &self,
        item_id: QueueItemId,
        staff_id: UserId,
        decision: QueueDecision,
        notes: &str,
    ) -> Result<EscrowQueueItem, EngineError> {
        let role = self.ctx.require_user(staff_id)?;
        if !permits(role, decision) {
            return Err(EngineError::not_authorized(
                format!("{staff_id} ({role})"),
                decision,
                item_id,
            ));
        }
        let transaction_id = self.load(item_id)?.record.transaction_id;
        let report = Reconciler::new(self.ctx.clone()).repair(transaction_id)?;
        if let Some(detail) = report.conflicts.first() {
            return Err(EngineError::Diverged {
                transaction_id: transaction_id.to_string(),
                detail: detail.clone(),
            });
        }

        let mut entry = self.load(item_id)?;
        let now = self.ctx.now();
        let mut decided = entry.record.clone();
        decided.decide(staff_id, decision, notes, now)?;

        let tx = self.ctx.load_transaction(decided.transaction_id)?.record;
        if let Some(event) = release_event(decision) {
            // Scratch copy only; the real write happens after the commit.
            tx.clone().apply(&event, Actor::Admin, now)?;
        }

        entry.record = decided;
        self.ctx.ledger.update(&mut entry)?;
        tracing::info!(
            queue_item_id = %item_id,
            transaction_id = %tx.id,
            decision = %decision,
            staff_id = %staff_id,
            "escrow decision recorded"
        );

        if let Some(event) = release_event(decision) {
            apply_decision(&self.ctx, &entry.record, &event, Actor::Admin);
        }
        let kind = match decision {
            QueueDecision::Approve => EventKind::EscrowApproved,
            QueueDecision::Reject => EventKind::EscrowRejected,
            QueueDecision::Hold => EventKind::EscrowHeld,
        };
        self.ctx
            .notify(kind, tx.id, None, None, staff_id, &[tx.buyer_id, tx.seller_id]);
        Ok(entry.record)
    }

    /// Items in review order. With no status filter, the open (pending and
    /// held) items are listed.
    pub fn list(&self, status: Option<QueueStatus>) -> Result<Vec<EscrowQueueItem>, EngineError> {
        let filter = match status {
            Some(status) => Filter::field_eq("status", status.as_str()),
            None => Filter::All,
        };
        let mut items: Vec<EscrowQueueItem> = self
            .ctx
            .ledger
            .find::<EscrowQueueItem>(&filter)?
            .into_iter()
            .map(|v| v.record)
            .filter(|item| status.is_some() || item.is_open())
            .collect();
        order_queue(&mut items);
        Ok(items)
    }

    /// One item.
    pub fn item(&self, id: QueueItemId) -> Result<EscrowQueueItem, EngineError> {
        Ok(self.load(id)?.record)
    }

    /// Every item ever opened for a transaction, in review order.
    pub fn items_for(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<EscrowQueueItem>, EngineError> {
        let mut items: Vec<EscrowQueueItem> = items_of(&self.ctx, transaction_id)?
            .into_iter()
            .map(|v| v.record)
            .collect();
        order_queue(&mut items);
        Ok(items)
    }

    fn load(&self, id: QueueItemId) -> Result<Versioned<EscrowQueueItem>, EngineError> {
        self.ctx
            .ledger
            .try_load(*id.as_uuid())?
            .ok_or_else(|| EngineError::not_found("queue item", id))
    }
}

fn permits(role: UserRole, decision: QueueDecision) -> bool {
    match decision {
        QueueDecision::Approve | QueueDecision::Reject => role.can_decide_release(),
        QueueDecision::Hold => role.can_hold_release(),
    }
}

pub(crate) fn release_event(decision: QueueDecision) -> Option<TransactionEvent> {
    match decision {
        QueueDecision::Approve => Some(TransactionEvent::AdminRelease),
        QueueDecision::Reject => Some(TransactionEvent::AdminRefund),
        QueueDecision::Hold => None,
    }
}

pub(crate) fn items_of(
    ctx: &EngineContext,
    transaction_id: TransactionId,
) -> Result<Vec<Versioned<EscrowQueueItem>>, EngineError> {
    Ok(ctx.ledger.find::<EscrowQueueItem>(&Filter::field_eq(
        "transaction_id",
        transaction_id.as_uuid().to_string(),
    ))?)
}

/// Move the transaction and close its open dispute to match a decided
/// item. Idempotent; failures are logged and left for the next repair.
pub(crate) fn apply_decision(
    ctx: &EngineContext,
    item: &EscrowQueueItem,
    event: &TransactionEvent,
    actor: Actor,
) -> Vec<&'static str> {
    let mut applied = Vec::new();
    let moved = ctx.advance_by_id(item.transaction_id, actor, event);
    let step = "transaction follows queue decision";
    let Some((tx, outcome)) = ctx.cascade(step, item.transaction_id, moved) else {
        return applied;
    };
    if outcome == Outcome::Applied {
        applied.push("apply queue decision");
    }
    if close_dispute(ctx, &tx, item) {
        applied.push("close dispute");
    }
    applied.extend(close_settled_items(ctx, &tx));
    applied
}

/// Close the open items of a transaction whose funds already left escrow.
pub(crate) fn close_settled_items(ctx: &EngineContext, tx: &Transaction) -> Vec<&'static str> {
    let mut applied = Vec::new();
    let Some(breakdown) = tx.resolution.filter(|_| tx.is_terminal()) else {
        return applied;
    };
    let items = ctx.cascade("load queue items", tx.id, items_of(ctx, tx.id));
    for mut item in items.unwrap_or_default() {
        if item.record.close_settled(&breakdown, ctx.now()) == Outcome::Unchanged {
            continue;
        }
        let written = ctx.ledger.update(&mut item).map_err(EngineError::from);
        if ctx.cascade("close queue item", item.record.id, written).is_some() {
            tracing::info!(
                transaction_id = %tx.id,
                queue_item_id = %item.record.id,
                funds = %tx.funds,
                "queue item closed; escrow settled elsewhere"
            );
            applied.push("close queue item");
        }
    }
    applied
}

fn close_dispute(ctx: &EngineContext, tx: &Transaction, item: &EscrowQueueItem) -> bool {
    let (Some(decided_by), Some(breakdown)) = (item.decided_by, staff_breakdown(tx, item)) else {
        return false;
    };
    let disputes = ctx.cascade("load disputes", tx.id, disputes_of(ctx, tx.id));
    let Some(mut open) = disputes
        .unwrap_or_default()
        .into_iter()
        .find(|d| d.record.is_open())
    else {
        return false;
    };
    let resolution = DisputeResolution {
        accepted_proposal_id: None,
        breakdown,
        decided_by,
    };
    let at = item.decided_at.unwrap_or_else(|| ctx.now());
    let closed = open
        .record
        .resolve(resolution, item.admin_notes.clone(), at)
        .map_err(EngineError::from)
        .and_then(|outcome| {
            if outcome == Outcome::Applied {
                ctx.ledger.update(&mut open)?;
            }
            Ok(outcome)
        });
    matches!(ctx.cascade("close dispute", open.record.id, closed), Some(Outcome::Applied))
}

fn staff_breakdown(tx: &Transaction, item: &EscrowQueueItem) -> Option<ResolutionBreakdown> {
    match item.status {
        QueueStatus::Approved => Some(ResolutionBreakdown::release_full(tx.amount)),
        QueueStatus::Rejected => Some(ResolutionBreakdown::refund_full(tx.amount)),
        QueueStatus::Pending | QueueStatus::Held | QueueStatus::Closed => None,
    }
}
