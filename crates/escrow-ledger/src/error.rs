//! # Store Errors

use thiserror::Error;
use uuid::Uuid;

use crate::kind::EntityKind;
use crate::store::Precondition;

/// A ledger operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record under this key.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Partition.
        kind: EntityKind,
        /// Key.
        id: Uuid,
    },

    /// The write's precondition no longer holds; re-read and retry.
    #[error("{kind} {id} write conflict: expected {expected}, found {}", display_version(.actual))]
    Conflict {
        /// Partition.
        kind: EntityKind,
        /// Key.
        id: Uuid,
        /// What the writer expected.
        expected: Precondition,
        /// What the store holds (`None`: absent).
        actual: Option<u64>,
    },

    /// A record body could not be encoded or decoded.
    #[error("{kind} serialization failed: {message}")]
    Serialization {
        /// Partition.
        kind: EntityKind,
        /// Encoder/decoder message.
        message: String,
    },

    /// The backing store could not be reached.
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether re-reading and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn display_version(version: &Option<u64>) -> String {
    match version {
        Some(v) => format!("version {v}"),
        None => "no record".to_string(),
    }
}
