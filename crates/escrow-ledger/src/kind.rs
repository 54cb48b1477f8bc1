//! Entity kinds the ledger partitions records by.

use serde::{Deserialize, Serialize};

/// A record partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// `Transaction`, keyed by transaction id.
    Transaction,
    /// `ContractChain`, keyed by transaction id.
    ContractChain,
    /// `Dispute`, keyed by dispute id.
    Dispute,
    /// `DisputeProposal`, keyed by proposal id.
    Proposal,
    /// `EscrowQueueItem`, keyed by queue item id.
    QueueItem,
}

impl EntityKind {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::ContractChain => "contract_chain",
            Self::Dispute => "dispute",
            Self::Proposal => "proposal",
            Self::QueueItem => "queue_item",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
