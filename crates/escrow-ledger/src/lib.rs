//! # escrow-ledger: The Ledger Store Boundary
//!
//! The engine's only shared mutable resource. Three operations:
//!
//! - `get(kind, id)` returns the stored body and its version.
//! - `put(kind, id, body, precondition)` writes conditionally: the write
//!   lands only if the stored version still matches what the caller read,
//!   otherwise it fails with [`StoreError::Conflict`].
//! - `query(kind, filter)` lists bodies of one kind.
//!
//! There are no multi-record transactions. Anything that must change
//! atomically has to live in one record.
//!
//! [`MemoryLedger`] is the in-process implementation used by the binary
//! and the tests. [`Ledger`] layers typed records over any
//! [`LedgerStore`].

pub mod error;
pub mod kind;
pub mod memory;
pub mod store;
pub mod typed;

pub use error::StoreError;
pub use kind::EntityKind;
pub use memory::MemoryLedger;
pub use store::{Filter, LedgerStore, Precondition, StoredRecord};
pub use typed::{Ledger, Record, Versioned};
