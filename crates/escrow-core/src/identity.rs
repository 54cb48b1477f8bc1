//! # Identity Newtypes
//!
//! UUID-backed identifiers for every entity the engine touches. Each
//! identifier is a distinct type, always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Namespace prefix used in log output.
            pub const PREFIX: &'static str = $prefix;
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }
    };
}

uuid_id!(
    /// A marketplace user (buyer, seller, or staff member).
    UserId,
    "user"
);

uuid_id!(
    /// A buyer/seller transaction held in escrow.
    TransactionId,
    "tx"
);

uuid_id!(
    /// One version of a contract within a revision chain.
    ContractId,
    "contract"
);

uuid_id!(
    /// A dispute raised against a transaction.
    DisputeId,
    "dispute"
);

uuid_id!(
    /// A resolution proposal made within a dispute.
    ProposalId,
    "proposal"
);

uuid_id!(
    /// An item in the admin escrow release queue.
    QueueItemId,
    "queue"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }

    #[test]
    fn display_carries_prefix() {
        let id = DisputeId::new();
        assert!(id.to_string().starts_with("dispute:"));
        assert!(ContractId::new().to_string().starts_with("contract:"));
    }

    #[test]
    fn from_uuid_roundtrip() {
        let raw = Uuid::new_v4();
        assert_eq!(*UserId::from_uuid(raw).as_uuid(), raw);
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let raw = Uuid::new_v4();
        let json = serde_json::to_string(&ProposalId::from_uuid(raw)).unwrap();
        assert_eq!(json, format!("\"{raw}\""));
    }
}
