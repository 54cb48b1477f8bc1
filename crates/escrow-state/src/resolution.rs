//! # Fund Split
//!
//! Maps an accepted proposal onto a buyer/seller division of the escrowed
//! total. The mapping is a pure function of `(type, amount, total)`:
//!
//! | type              | seller_release     | buyer_refund       |
//! |-------------------|--------------------|--------------------|
//! | `release_full`    | total              | 0                  |
//! | `refund_full`     | 0                  | total              |
//! | `release_partial` | amount             | total - amount     |
//! | `refund_partial`  | total - amount     | amount             |
//!
//! `buyer_refund + seller_release == total_amount` holds for every value
//! this module produces.

use serde::{Deserialize, Serialize};

use escrow_core::{Amount, ValidationError};

use crate::transaction::FundsStatus;

/// Kind of dispute resolution a party proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    /// Everything goes to the seller.
    ReleaseFull,
    /// `amount` goes to the seller, the rest back to the buyer.
    ReleasePartial,
    /// Everything goes back to the buyer.
    RefundFull,
    /// `amount` goes back to the buyer, the rest to the seller.
    RefundPartial,
}

impl ProposalType {
    /// Whether this type requires an explicit amount.
    pub fn is_partial(&self) -> bool {
        match self {
            Self::ReleasePartial | Self::RefundPartial => true,
            Self::ReleaseFull | Self::RefundFull => false,
        }
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReleaseFull => "release_full",
            Self::ReleasePartial => "release_partial",
            Self::RefundFull => "refund_full",
            Self::RefundPartial => "refund_partial",
        }
    }
}

impl std::fmt::Display for ProposalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProposalType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release_full" => Ok(Self::ReleaseFull),
            "release_partial" => Ok(Self::ReleasePartial),
            "refund_full" => Ok(Self::RefundFull),
            "refund_partial" => Ok(Self::RefundPartial),
            other => Err(ValidationError::UnknownVariant {
                kind: "proposal type",
                value: other.to_string(),
            }),
        }
    }
}

/// How the escrowed total was divided when a transaction closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionBreakdown {
    /// Returned to the buyer.
    pub buyer_refund: Amount,
    /// Paid out to the seller.
    pub seller_release: Amount,
    /// The resolution kind that produced this split.
    pub resolution_type: ProposalType,
    /// The escrowed total at resolution time.
    pub total_amount: Amount,
}

impl ResolutionBreakdown {
    /// Full release to the seller.
    pub fn release_full(total: Amount) -> Self {
        Self {
            buyer_refund: Amount::ZERO,
            seller_release: total,
            resolution_type: ProposalType::ReleaseFull,
            total_amount: total,
        }
    }

    /// Full refund to the buyer.
    pub fn refund_full(total: Amount) -> Self {
        Self {
            buyer_refund: total,
            seller_release: Amount::ZERO,
            resolution_type: ProposalType::RefundFull,
            total_amount: total,
        }
    }

    /// Whether the two shares add up to the total.
    pub fn is_conserved(&self) -> bool {
        self.buyer_refund
            .checked_add(self.seller_release)
            .map(|sum| sum == self.total_amount)
            .unwrap_or(false)
    }

    /// Where the escrowed funds end up.
    pub fn funds_status(&self) -> FundsStatus {
        match (self.buyer_refund.is_zero(), self.seller_release.is_zero()) {
            (true, _) => FundsStatus::Released,
            (false, true) => FundsStatus::Refunded,
            (false, false) => FundsStatus::Split,
        }
    }
}

/// Compute the split for an accepted proposal.
///
/// Partial types require `0 < amount < total`; full types must not carry
/// an amount.
pub fn compute_split(
    kind: ProposalType,
    amount: Option<Amount>,
    total: Amount,
) -> Result<ResolutionBreakdown, ValidationError> {
    let (buyer_refund, seller_release) = match (kind, amount) {
        (ProposalType::ReleaseFull, None) => (Amount::ZERO, total),
        (ProposalType::RefundFull, None) => (total, Amount::ZERO),
        (ProposalType::ReleasePartial, Some(amount)) => {
            let release = amount.strictly_within("amount", total)?;
            (total.checked_sub(release)?, release)
        }
        (ProposalType::RefundPartial, Some(amount)) => {
            let refund = amount.strictly_within("amount", total)?;
            (refund, total.checked_sub(refund)?)
        }
        (ProposalType::ReleasePartial | ProposalType::RefundPartial, None) => {
            return Err(ValidationError::MissingField {
                field: "amount",
                context: kind.to_string(),
            });
        }
        (ProposalType::ReleaseFull | ProposalType::RefundFull, Some(_)) => {
            return Err(ValidationError::UnexpectedField {
                field: "amount",
                context: kind.to_string(),
            });
        }
    };
    Ok(ResolutionBreakdown {
        buyer_refund,
        seller_release,
        resolution_type: kind,
        total_amount: total,
    })
}
