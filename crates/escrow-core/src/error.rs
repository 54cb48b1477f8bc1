//! # Validation Errors
//!
//! Errors raised when a domain primitive is constructed from malformed or
//! out-of-range input. Higher layers wrap these in their own taxonomies.

use thiserror::Error;

/// A domain primitive failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field was empty or whitespace-only.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// An amount that must be strictly positive was zero.
    #[error("{field} must be a positive amount, got 0")]
    NonPositiveAmount {
        /// Name of the offending field.
        field: &'static str,
    },

    /// An amount fell outside its exclusive bounds.
    #[error("{field} must satisfy {min} < amount < {max}, got {amount}")]
    AmountOutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected amount.
        amount: u64,
        /// Exclusive lower bound.
        min: u64,
        /// Exclusive upper bound.
        max: u64,
    },

    /// A required field was absent.
    #[error("{field} is required for {context}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
        /// What required it.
        context: String,
    },

    /// A field was present where it must not be.
    #[error("{field} is not allowed for {context}")]
    UnexpectedField {
        /// Name of the unexpected field.
        field: &'static str,
        /// What forbids it.
        context: String,
    },

    /// Arithmetic on amounts overflowed or underflowed.
    #[error("amount arithmetic overflow in {operation}")]
    Overflow {
        /// The operation that overflowed.
        operation: &'static str,
    },

    /// A string did not name a known variant.
    #[error("unknown {kind}: \"{value}\"")]
    UnknownVariant {
        /// The enumeration being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Two identifiers that must differ were equal.
    #[error("{0}")]
    Inconsistent(String),
}

/// Reject empty or whitespace-only text, returning the trimmed value.
pub fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(trimmed.to_string())
}
