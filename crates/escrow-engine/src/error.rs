//! # Engine Errors
//!
//! The single error taxonomy every engine operation returns. Lower-layer
//! errors (`ValidationError`, `TransitionError`, `StoreError`) convert
//! into it with `?`. Every variant names the entity and, where a state is
//! involved, the current and requested state.

use thiserror::Error;

use escrow_core::ValidationError;
use escrow_ledger::StoreError;
use escrow_state::TransitionError;

/// An engine operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed, missing or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The actor is not a permitted party or role for the action.
    #[error("not authorized: {actor} may not {action} on {entity}")]
    NotAuthorized {
        /// Who attempted it.
        actor: String,
        /// What they attempted.
        action: String,
        /// Entity identifier.
        entity: String,
    },

    /// The current state does not permit the requested action.
    #[error("invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// A concurrent write won the precondition race. Re-read and retry.
    #[error("write conflict on {entity} {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// What this writer read.
        expected: String,
        /// What the store now holds.
        actual: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// A decision was already recorded.
    #[error("{entity} {id} already decided as {status}")]
    AlreadyDecided {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Recorded decision.
        status: String,
    },

    /// The entity is terminal; the request targets a different state.
    #[error("{entity} {id} is terminal in state {state}; cannot move to {requested}")]
    AlreadyTerminal {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Current terminal state.
        state: String,
        /// Requested state.
        requested: String,
    },

    /// The dispute was escalated; proposal activity is frozen.
    #[error("dispute {dispute_id} on {transaction_id} is escalated; proposals are frozen")]
    Escalated {
        /// The frozen dispute.
        dispute_id: String,
        /// Its transaction.
        transaction_id: String,
    },

    /// Committed records disagree about where the escrow went. Repair
    /// cannot pick a side; staff must look at the transaction.
    #[error("records of transaction {transaction_id} disagree: {detail}")]
    Diverged {
        /// The affected transaction.
        transaction_id: String,
        /// What disagrees with what.
        detail: String,
    },

    /// The ledger store failed.
    #[error("ledger store failure: {0}")]
    Store(String),
}

impl EngineError {
    /// Whether re-reading and retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyDecided { .. } => "ALREADY_DECIDED",
            Self::AlreadyTerminal { .. } => "ALREADY_TERMINAL",
            Self::Escalated { .. } => "ESCALATED",
            Self::Diverged { .. } => "DIVERGED",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    pub(crate) fn not_authorized(
        actor: impl ToString,
        action: impl ToString,
        entity: impl ToString,
    ) -> Self {
        Self::NotAuthorized {
            actor: actor.to_string(),
            action: action.to_string(),
            entity: entity.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(
        entity: &'static str,
        id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { entity, id, from, to } => {
                Self::InvalidTransition { entity, id, from, to }
            }
            TransitionError::AlreadyTerminal {
                entity,
                id,
                state,
                requested,
            } => Self::AlreadyTerminal {
                entity,
                id,
                state,
                requested,
            },
            TransitionError::NotPermitted { actor, action, id } => Self::NotAuthorized {
                actor,
                action,
                entity: id,
            },
            TransitionError::AlreadyDecided { entity, id, status } => {
                Self::AlreadyDecided { entity, id, status }
            }
            TransitionError::Validation(e) => Self::Validation(e),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound {
                entity: kind.as_str(),
                id: id.to_string(),
            },
            StoreError::Conflict {
                kind,
                id,
                expected,
                actual,
            } => Self::Conflict {
                entity: kind.as_str(),
                id: id.to_string(),
                expected: expected.to_string(),
                actual: actual.map_or_else(|| "no record".to_string(), |v| format!("version {v}")),
            },
            StoreError::Serialization { .. } | StoreError::Unavailable(_) => {
                Self::Store(err.to_string())
            }
        }
    }
}
