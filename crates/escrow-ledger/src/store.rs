//! # Ledger Store Interface
//!
//! Bodies are opaque JSON values; typing happens one layer up in
//! [`crate::typed`]. Every stored record carries a version that starts at
//! 1 and increments on each successful write.

use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::kind::EntityKind;

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Key within the partition.
    pub id: Uuid,
    /// Incremented on every write.
    pub version: u64,
    /// JSON body.
    pub body: Value,
}

/// Condition a write must satisfy to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write.
    None,
    /// The key must not exist yet.
    Absent,
    /// The stored version must equal this value.
    Version(u64),
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("any version"),
            Self::Absent => f.write_str("no record"),
            Self::Version(v) => write!(f, "version {v}"),
        }
    }
}

impl Precondition {
    /// Check against the currently stored version (`None`: absent).
    pub fn check(&self, kind: EntityKind, id: Uuid, actual: Option<u64>) -> Result<(), StoreError> {
        let holds = match (self, actual) {
            (Self::None, _) => true,
            (Self::Absent, None) => true,
            (Self::Absent, Some(_)) => false,
            (Self::Version(expected), Some(current)) => *expected == current,
            (Self::Version(_), None) => false,
        };
        if holds {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                kind,
                id,
                expected: *self,
                actual,
            })
        }
    }
}

/// Selection over one partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every record.
    All,
    /// Records whose top-level `field` equals `value`.
    FieldEq {
        /// Top-level JSON field name.
        field: String,
        /// Required value.
        value: Value,
    },
    /// Records whose top-level array `array` holds an object with `field`
    /// equal to `value`.
    ElementEq {
        /// Top-level JSON array field name.
        array: String,
        /// Field within each element.
        field: String,
        /// Required value.
        value: Value,
    },
}

impl Filter {
    /// Records whose `field` equals `value`.
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Records holding an element of `array` whose `field` equals `value`.
    pub fn element_eq(
        array: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::ElementEq {
            array: array.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether `body` is selected.
    pub fn matches(&self, body: &Value) -> bool {
        match self {
            Self::All => true,
            Self::FieldEq { field, value } => body.get(field) == Some(value),
            Self::ElementEq {
                array,
                field,
                value,
            } => body
                .get(array)
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|item| item.get(field) == Some(value))),
        }
    }
}

/// Durable key/value persistence with conditional writes.
///
/// Implementations must make each `put` atomic with its precondition
/// check. Nothing spans more than one key.
pub trait LedgerStore: Send + Sync {
    /// Read one record.
    fn get(&self, kind: EntityKind, id: Uuid) -> Result<StoredRecord, StoreError>;

    /// Write one record if `precondition` holds; returns the new version.
    fn put(
        &self,
        kind: EntityKind,
        id: Uuid,
        body: Value,
        precondition: Precondition,
    ) -> Result<u64, StoreError>;

    /// List the records of one kind matching `filter`, in no particular order.
    fn query(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<StoredRecord>, StoreError>;
}
