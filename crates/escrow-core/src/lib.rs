//! # escrow-core: Foundational Types for the Escrow Marketplace
//!
//! Defines the primitives every other crate in the workspace builds on.
//! Depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `UserId`, `TransactionId`,
//!    `ContractId`, `DisputeId`, `ProposalId`, `QueueItemId` are distinct
//!    types. A contract id cannot be passed where a dispute id is expected.
//!
//! 2. **Integer money.** [`Amount`] is a count of the smallest currency unit.
//!    No floats anywhere near a fund split.
//!
//! 3. **Closed role enumerations.** Parties are `Buyer` or `Seller`; directory
//!    roles are `Admin`, `Support`, `Moderator`, `User`. Every consumer
//!    matches exhaustively.
//!
//! 4. **UTC-only timestamps** with millisecond precision, totally ordered.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod money;
pub mod role;
pub mod temporal;

pub use error::ValidationError;
pub use identity::{ContractId, DisputeId, ProposalId, QueueItemId, TransactionId, UserId};
pub use money::Amount;
pub use role::{Actor, PartyRole, UserRole};
pub use temporal::Timestamp;
