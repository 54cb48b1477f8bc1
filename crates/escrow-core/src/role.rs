//! # Roles
//!
//! Three closed enumerations:
//!
//! - [`PartyRole`]: which side of a transaction a user is on.
//! - [`UserRole`]: a user's standing in the staff directory, consulted
//!   only to gate escrow queue decisions.
//! - [`Actor`]: who is driving a state transition. Parties act on their own
//!   transactions; `Admin` acts through the release queue; `System` covers
//!   cascades and repair.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A party to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    /// Pays into escrow.
    Buyer,
    /// Delivers the work and receives released funds.
    Seller,
}

impl PartyRole {
    /// The other side.
    pub fn counterparty(&self) -> PartyRole {
        match self {
            Self::Buyer => Self::Seller,
            Self::Seller => Self::Buyer,
        }
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PartyRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            other => Err(ValidationError::UnknownVariant {
                kind: "party role",
                value: other.to_string(),
            }),
        }
    }
}

/// A user's role in the staff directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Full authority over escrow release decisions.
    Admin,
    /// Customer support staff.
    Support,
    /// Content and dispute moderator.
    Moderator,
    /// Ordinary marketplace user.
    User,
}

impl UserRole {
    /// May approve or reject a queued release.
    pub fn can_decide_release(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// May put a queued release on hold.
    pub fn can_hold_release(&self) -> bool {
        match self {
            Self::Admin | Self::Moderator | Self::Support => true,
            Self::User => false,
        }
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Support => "support",
            Self::Moderator => "moderator",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "support" => Ok(Self::Support),
            "moderator" => Ok(Self::Moderator),
            "user" => Ok(Self::User),
            other => Err(ValidationError::UnknownVariant {
                kind: "user role",
                value: other.to_string(),
            }),
        }
    }
}

/// The originator of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// The transaction's buyer.
    Buyer,
    /// The transaction's seller.
    Seller,
    /// A staff member acting through the release queue.
    Admin,
    /// The engine itself (cascades, repair, expiry).
    System,
}

impl Actor {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl From<PartyRole> for Actor {
    fn from(role: PartyRole) -> Self {
        match role {
            PartyRole::Buyer => Self::Buyer,
            PartyRole::Seller => Self::Seller,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterparty_flips() {
        assert_eq!(PartyRole::Buyer.counterparty(), PartyRole::Seller);
        assert_eq!(PartyRole::Seller.counterparty(), PartyRole::Buyer);
    }

    #[test]
    fn only_admin_decides_release() {
        assert!(UserRole::Admin.can_decide_release());
        assert!(!UserRole::Moderator.can_decide_release());
        assert!(!UserRole::Support.can_decide_release());
        assert!(!UserRole::User.can_decide_release());
    }

    #[test]
    fn staff_may_hold() {
        assert!(UserRole::Support.can_hold_release());
        assert!(!UserRole::User.can_hold_release());
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("owner".parse::<UserRole>().is_err());
        assert_eq!("moderator".parse::<UserRole>().unwrap(), UserRole::Moderator);
        assert_eq!("seller".parse::<PartyRole>().unwrap(), PartyRole::Seller);
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&Actor::System).unwrap(), "\"system\"");
        assert_eq!(Actor::from(PartyRole::Buyer), Actor::Buyer);
    }
}
