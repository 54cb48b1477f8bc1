//! # Engine Context
//!
//! The collaborators every service shares: the ledger, the user directory,
//! the notification sink, the clock and the configuration. Services hold
//! a clone; nothing in here caches entity state between calls.

use std::fmt::Display;
use std::sync::Arc;

use escrow_core::{
    Actor, ContractId, DisputeId, PartyRole, Timestamp, TransactionId, UserId, UserRole,
};
use escrow_ledger::{Ledger, LedgerStore, MemoryLedger, Versioned};
use escrow_state::{Outcome, Transaction, TransactionEvent};

use crate::auth::{AdminAuth, StaticDirectory};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notify::{dispatch, EventKind, Notification, NotificationSink, TracingSink};

/// Shared collaborators. Cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub(crate) ledger: Ledger,
    pub(crate) auth: Arc<dyn AdminAuth>,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Assemble a context from its collaborators.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        auth: Arc<dyn AdminAuth>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger: Ledger::new(store),
            auth,
            sink,
            clock,
            config,
        }
    }

    /// In-memory ledger, wall clock, tracing sink, default config.
    pub fn in_memory(directory: StaticDirectory) -> Self {
        Self::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(directory),
            Arc::new(TracingSink),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the notification sink.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// The user's directory role; unknown users are `NotFound`.
    pub(crate) fn require_user(&self, user: UserId) -> Result<UserRole, EngineError> {
        self.auth
            .role(user)
            .ok_or_else(|| EngineError::not_found("user", user))
    }

    pub(crate) fn load_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Versioned<Transaction>, EngineError> {
        self.ledger
            .try_load(*id.as_uuid())?
            .ok_or_else(|| EngineError::not_found("transaction", id))
    }

    /// The caller's side of `tx`; outsiders are `NotAuthorized`.
    pub(crate) fn party_of(
        &self,
        tx: &Transaction,
        user: UserId,
        action: &str,
    ) -> Result<PartyRole, EngineError> {
        tx.party_role(user)
            .ok_or_else(|| EngineError::not_authorized(user, action, tx.id))
    }

    /// Apply `event` to a loaded transaction and write it back if it changed.
    pub(crate) fn advance(
        &self,
        entry: &mut Versioned<Transaction>,
        actor: Actor,
        event: &TransactionEvent,
    ) -> Result<Outcome, EngineError> {
        let from = entry.record.status;
        let mut next = entry.record.clone();
        let outcome = next.apply(event, actor, self.now())?;
        match outcome {
            Outcome::Applied => {
                let mut candidate = Versioned {
                    record: next,
                    version: entry.version,
                };
                self.ledger.update(&mut candidate)?;
                *entry = candidate;
                tracing::info!(
                    transaction_id = %entry.record.id,
                    from = %from,
                    to = %entry.record.status,
                    actor = %actor,
                    event = event.name(),
                    "transaction transition"
                );
            }
            Outcome::Unchanged => {
                tracing::debug!(
                    transaction_id = %entry.record.id,
                    status = %from,
                    event = event.name(),
                    "transition already applied"
                );
            }
        }
        Ok(outcome)
    }

    /// Load, apply and write back in one step.
    pub(crate) fn advance_by_id(
        &self,
        id: TransactionId,
        actor: Actor,
        event: &TransactionEvent,
    ) -> Result<(Transaction, Outcome), EngineError> {
        let mut entry = self.load_transaction(id)?;
        let outcome = self.advance(&mut entry, actor, event)?;
        Ok((entry.record, outcome))
    }

    /// Log a failed follow-up write; it is left for the repair pass.
    pub(crate) fn cascade<T>(
        &self,
        step: &'static str,
        entity: impl Display,
        result: Result<T, EngineError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    step,
                    entity = %entity,
                    error = %err,
                    "cascade failed; left for repair"
                );
                None
            }
        }
    }

    pub(crate) fn notify(
        &self,
        kind: EventKind,
        transaction_id: TransactionId,
        contract_id: Option<ContractId>,
        dispute_id: Option<DisputeId>,
        actor_id: UserId,
        recipients: &[UserId],
    ) {
        let at = self.now();
        for recipient_id in recipients {
            dispatch(
                self.sink.as_ref(),
                Notification {
                    kind,
                    transaction_id,
                    contract_id,
                    dispute_id,
                    actor_id,
                    recipient_id: *recipient_id,
                    at,
                },
            );
        }
    }
}
