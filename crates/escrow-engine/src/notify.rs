//! # Notifications and the Change Feed
//!
//! After every committed transition the engine hands a [`Notification`]
//! to its [`NotificationSink`]. Dispatch is fire-and-forget: a sink
//! failure is logged at `warn` and never changes the operation's result.
//!
//! [`ChangeFeed`] publishes notifications on a `tokio::sync::broadcast`
//! channel. Subscribers treat each event as "re-read this entity"; a
//! lagging subscriber that drops events loses nothing but latency, since
//! the ledger and the repair pass remain the source of truth.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use escrow_core::{ContractId, DisputeId, Timestamp, TransactionId, UserId};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A transaction was opened.
    TransactionCreated,
    /// A contract was sent (or drafted).
    ContractCreated,
    /// A draft was addressed to its recipient.
    ContractSubmitted,
    /// A contract was accepted.
    ContractAccepted,
    /// A contract was rejected.
    ContractRejected,
    /// A rejected contract was revised.
    ContractRevised,
    /// A contract was withdrawn.
    ContractExpired,
    /// The buyer paid into escrow.
    PaymentMade,
    /// The seller delivered.
    WorkCompleted,
    /// The buyer released escrow.
    PaymentReleased,
    /// A dispute was opened.
    DisputeOpened,
    /// A dispute went to staff review.
    DisputeEscalated,
    /// A resolution was proposed.
    ProposalMade,
    /// A proposal was turned down.
    ProposalRejected,
    /// A dispute was settled.
    DisputeResolved,
    /// A transaction entered the release queue.
    EscrowQueued,
    /// Staff released escrow to the seller.
    EscrowApproved,
    /// Staff refunded escrow to the buyer.
    EscrowRejected,
    /// Staff deferred a release decision.
    EscrowHeld,
}

/// One event addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub kind: EventKind,
    /// The transaction involved.
    pub transaction_id: TransactionId,
    /// The contract involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<ContractId>,
    /// The dispute involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<DisputeId>,
    /// Who did it.
    pub actor_id: UserId,
    /// Who should hear about it.
    pub recipient_id: UserId,
    /// When.
    pub at: Timestamp,
}

/// A sink refused or failed to take a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// External collaborator receiving engine events.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification. Must not block for long.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Logs every notification at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(
            kind = ?n.kind,
            transaction_id = %n.transaction_id,
            actor_id = %n.actor_id,
            recipient_id = %n.recipient_id,
            "notification"
        );
        Ok(())
    }
}

/// Broadcast channel of notifications.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Notification>,
}

impl ChangeFeed {
    /// A feed buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A new subscriber, receiving events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for ChangeFeed {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        // No subscribers is not a failure.
        let _ = self.sender.send(notification.clone());
        Ok(())
    }
}

/// Delivers to several sinks; one failing does not stop the others.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    /// No sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let failures: Vec<String> = self
            .sinks
            .iter()
            .filter_map(|sink| sink.notify(notification).err())
            .map(|e| e.0)
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError(failures.join("; ")))
        }
    }
}

/// Hand `notification` to `sink`, logging a failure instead of returning it.
pub(crate) fn dispatch(sink: &dyn NotificationSink, notification: Notification) {
    if let Err(err) = sink.notify(&notification) {
        tracing::warn!(
            kind = ?notification.kind,
            transaction_id = %notification.transaction_id,
            recipient_id = %notification.recipient_id,
            error = %err,
            "notification dispatch failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl NotificationSink for Failing {
        fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError("smtp down".into()))
        }
    }

    fn sample() -> Notification {
        Notification {
            kind: EventKind::DisputeOpened,
            transaction_id: TransactionId::new(),
            contract_id: None,
            dispute_id: Some(DisputeId::new()),
            actor_id: UserId::new(),
            recipient_id: UserId::new(),
            at: Timestamp::from_millis(0),
        }
    }

    #[tokio::test]
    async fn change_feed_delivers_to_subscribers() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        let n = sample();
        feed.notify(&n).unwrap();
        assert_eq!(rx.recv().await.unwrap(), n);
    }

    #[test]
    fn change_feed_without_subscribers_is_ok() {
        assert!(ChangeFeed::default().notify(&sample()).is_ok());
    }

    #[test]
    fn fanout_reports_failures_but_reaches_every_sink() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        let fanout = FanoutSink::new()
            .with(Arc::new(Failing))
            .with(Arc::new(feed.clone()));
        let err = fanout.notify(&sample()).unwrap_err();
        assert!(err.to_string().contains("smtp down"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn dispatch_swallows_failures() {
        dispatch(&Failing, sample());
    }

    #[test]
    fn notification_omits_absent_ids() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("contract_id").is_none());
        assert_eq!(json["kind"], "dispute_opened");
    }
}
