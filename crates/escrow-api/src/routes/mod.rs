//! # Route Modules
//!
//! One module per resource. Each exposes `router()` returning a
//! `Router<AppState>` that [`crate::app`] merges under the auth layer.
//!
//! Reads are open to the transaction's parties and to staff; writes go
//! through the engine, which enforces its own party and role checks.

pub mod contracts;
pub mod disputes;
pub mod proposals;
pub mod queue;
pub mod transactions;
pub mod users;

use escrow_state::Transaction;

use crate::auth::CallerIdentity;
use crate::error::AppError;

/// Allow the transaction's buyer, its seller, and staff.
pub(crate) fn ensure_can_view(caller: &CallerIdentity, tx: &Transaction) -> Result<(), AppError> {
    if caller.is_staff() || tx.party_role(caller.user_id).is_some() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{} is not a party to {}",
            caller.user_id, tx.id
        )))
    }
}
