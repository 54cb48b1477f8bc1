//! # Transition Errors
//!
//! Rejections raised by the pure state machines. Every variant names the
//! entity and carries the current and requested state.

use thiserror::Error;

use escrow_core::ValidationError;

/// A state machine refused a transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The current state does not permit the requested one.
    #[error("invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind ("transaction", "contract", ...).
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The entity is terminal and the request targets a different state.
    #[error("{entity} {id} is already terminal in state {state}; cannot move to {requested}")]
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

    /// The actor may not perform this action on this entity.
    #[error("{actor} may not {action} on {id}")]
    NotPermitted {
        /// Who attempted the action.
        actor: String,
        /// What they attempted.
        action: String,
        /// Entity identifier.
        id: String,
    },

    /// A decision was already recorded and differs from the request.
    #[error("{entity} {id} was already decided as {status}")]
    AlreadyDecided {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// The recorded decision.
        status: String,
    },

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl TransitionError {
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

    pub(crate) fn terminal(
        entity: &'static str,
        id: impl ToString,
        state: impl ToString,
        requested: impl ToString,
    ) -> Self {
        Self::AlreadyTerminal {
            entity,
            id: id.to_string(),
            state: state.to_string(),
            requested: requested.to_string(),
        }
    }

    pub(crate) fn not_permitted(
        actor: impl ToString,
        action: impl ToString,
        id: impl ToString,
    ) -> Self {
        Self::NotPermitted {
            actor: actor.to_string(),
            action: action.to_string(),
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = TransitionError::invalid("transaction", "tx:1", "created", "completed");
        assert_eq!(
            err.to_string(),
            "invalid transaction transition for tx:1: created -> completed"
        );
    }

    #[test]
    fn validation_is_transparent() {
        let err: TransitionError = ValidationError::EmptyField { field: "reason" }.into();
        assert_eq!(err.to_string(), "reason must not be empty");
    }
}
