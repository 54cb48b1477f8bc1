//! # Contract Revision Chain
//!
//! Every contract version of one transaction lives in a single
//! [`ContractChain`] aggregate. A revision is built by deactivating every
//! version in the aggregate and appending the new one in the same value,
//! so persisting the aggregate under one version precondition makes
//! "insert new active version + deactivate the old chain" atomic.
//!
//! ## Per-contract states
//!
//! ```text
//! Draft ──submit──▶ AwaitingAcceptance ──accept──▶ AcceptedAwaitingPayment (terminal)
//!   │                     │
//!   │                   reject ──▶ Rejected ──revise (creator)──▶ new version, revision + 1
//!   └──────expire─────────┴──▶ Expired (terminal)
//! ```
//!
//! Chains are identified by their root contract id. Revisions point at
//! the root through `parent_contract_id` and carry a strictly increasing
//! `revision_number`. A fresh contract created after the previous one
//! expired or was rejected starts a new root at revision 1.

use serde::{Deserialize, Serialize};

use escrow_core::{Amount, ContractId, Timestamp, TransactionId, UserId, ValidationError};

use crate::error::TransitionError;
use crate::Outcome;

const ENTITY: &str = "contract";

/// Status of one contract version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Being written; no recipient yet.
    Draft,
    /// Sent to the recipient.
    AwaitingAcceptance,
    /// Accepted by the recipient. Terminal.
    AcceptedAwaitingPayment,
    /// Rejected by the recipient; may be revised by its creator.
    Rejected,
    /// Withdrawn before a response. Terminal.
    Expired,
}

impl ContractStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::AcceptedAwaitingPayment | Self::Expired => true,
            Self::Draft | Self::AwaitingAcceptance | Self::Rejected => false,
        }
    }

    /// Whether the version still awaits a decision.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Draft | Self::AwaitingAcceptance)
    }

    /// Whether a replacement contract may be created on top of this one.
    pub fn is_replaceable(&self) -> bool {
        matches!(self, Self::Rejected | Self::Expired)
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AwaitingAcceptance => "awaiting_acceptance",
            Self::AcceptedAwaitingPayment => "accepted_awaiting_payment",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recipient's answer to a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractResponse {
    /// Agree to the terms.
    Accept,
    /// Turn the terms down.
    Reject,
}

impl ContractResponse {
    fn target(&self) -> ContractStatus {
        match self {
            Self::Accept => ContractStatus::AcceptedAwaitingPayment,
            Self::Reject => ContractStatus::Rejected,
        }
    }
}

/// One contract version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Identifier.
    pub id: ContractId,
    /// Governing transaction.
    pub transaction_id: TransactionId,
    /// Author.
    pub creator_id: UserId,
    /// Counterparty expected to respond; unset while drafting.
    pub recipient_id: Option<UserId>,
    /// Contract body.
    pub content: String,
    /// Price this version proposes.
    pub amount: Amount,
    /// Status.
    pub status: ContractStatus,
    /// Root of the revision chain this version belongs to.
    pub chain_root_id: ContractId,
    /// The chain root, for revisions; `None` on the root itself.
    pub parent_contract_id: Option<ContractId>,
    /// 1 for the root, strictly increasing along the chain.
    pub revision_number: u32,
    /// Whether this version currently governs the transaction.
    pub is_active: bool,
    /// Message left by the responder.
    pub response_message: Option<String>,
    /// When the recipient responded.
    pub responded_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
}

/// Input for a fresh (root) contract.
#[derive(Debug, Clone)]
pub struct NewContract {
    /// Author.
    pub creator_id: UserId,
    /// Counterparty, or `None` to start as a draft.
    pub recipient_id: Option<UserId>,
    /// Contract body.
    pub content: String,
    /// Proposed price.
    pub amount: Amount,
}

/// All contract versions for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractChain {
    /// The transaction these contracts govern; also the aggregate key.
    pub transaction_id: TransactionId,
    /// Versions in insertion order.
    pub contracts: Vec<Contract>,
}

impl ContractChain {
    /// An empty chain.
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            contracts: Vec::new(),
        }
    }

    /// The version currently governing the transaction.
    pub fn active(&self) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.is_active)
    }

    /// Look up a version.
    pub fn get(&self, id: ContractId) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ContractId) -> Result<&mut Contract, TransitionError> {
        let transaction_id = self.transaction_id;
        self.contracts.iter_mut().find(|c| c.id == id).ok_or_else(|| {
            let detail = format!("{id} does not belong to {transaction_id}");
            ValidationError::Inconsistent(detail).into()
        })
    }

    /// Number of versions flagged active.
    pub fn active_count(&self) -> usize {
        self.contracts.iter().filter(|c| c.is_active).count()
    }

    /// Versions of one chain in revision order.
    pub fn revisions(&self, root: ContractId) -> Vec<&Contract> {
        let mut chain: Vec<&Contract> = self
            .contracts
            .iter()
            .filter(|c| c.chain_root_id == root)
            .collect();
        chain.sort_by_key(|c| c.revision_number);
        chain
    }

    /// Highest revision number within a chain.
    pub fn max_revision(&self, root: ContractId) -> u32 {
        self.contracts
            .iter()
            .filter(|c| c.chain_root_id == root)
            .map(|c| c.revision_number)
            .max()
            .unwrap_or(0)
    }

    /// Start a new chain with a root contract at revision 1.
    ///
    /// Refused while the current active version is still open or accepted.
    pub fn create(
        &mut self,
        input: NewContract,
        at: Timestamp,
    ) -> Result<ContractId, TransitionError> {
        if let Some(active) = self.active() {
            if !active.status.is_replaceable() {
                return Err(TransitionError::invalid(
                    ENTITY,
                    active.id,
                    active.status,
                    "new contract",
                ));
            }
        }
        if input.recipient_id == Some(input.creator_id) {
            return Err(ValidationError::Inconsistent(
                "a contract cannot be addressed to its own creator".to_string(),
            )
            .into());
        }
        let content = escrow_core::error::require_text("content", &input.content)?;
        let amount = Amount::positive("amount", input.amount.units())?;
        let id = ContractId::new();
        let status = match input.recipient_id {
            Some(_) => ContractStatus::AwaitingAcceptance,
            None => ContractStatus::Draft,
        };
        self.deactivate_all(at);
        self.contracts.push(Contract {
            id,
            transaction_id: self.transaction_id,
            creator_id: input.creator_id,
            recipient_id: input.recipient_id,
            content,
            amount,
            status,
            chain_root_id: id,
            parent_contract_id: None,
            revision_number: 1,
            is_active: true,
            response_message: None,
            responded_at: None,
            created_at: at,
            updated_at: at,
        });
        Ok(id)
    }

    /// Build the next revision of a rejected contract.
    ///
    /// Only the original's creator may revise, only from `Rejected`, and
    /// only while the original is still the active version. The new
    /// version is addressed to the same recipient and becomes the sole
    /// active contract.
    pub fn revise(
        &mut self,
        original_id: ContractId,
        caller: UserId,
        content: &str,
        amount: Amount,
        at: Timestamp,
    ) -> Result<ContractId, TransitionError> {
        let original = self.get(original_id).ok_or_else(|| {
            TransitionError::from(ValidationError::Inconsistent(format!(
                "{original_id} does not belong to {}",
                self.transaction_id
            )))
        })?;
        if original.creator_id != caller {
            return Err(TransitionError::not_permitted(caller, "revise", original_id));
        }
        if original.status != ContractStatus::Rejected {
            return Err(TransitionError::invalid(ENTITY, original_id, original.status, "revision"));
        }
        if !original.is_active {
            return Err(TransitionError::invalid(
                ENTITY,
                original_id,
                "superseded",
                "revision",
            ));
        }
        let content = escrow_core::error::require_text("content", content)?;
        let amount = Amount::positive("amount", amount.units())?;
        let root = original.chain_root_id;
        let recipient_id = original.recipient_id;
        let status = match recipient_id {
            Some(_) => ContractStatus::AwaitingAcceptance,
            None => ContractStatus::Draft,
        };
        let revision_number = self.max_revision(root) + 1;
        let id = ContractId::new();

        self.deactivate_all(at);
        self.contracts.push(Contract {
            id,
            transaction_id: self.transaction_id,
            creator_id: caller,
            recipient_id,
            content,
            amount,
            status,
            chain_root_id: root,
            parent_contract_id: Some(root),
            revision_number,
            is_active: true,
            response_message: None,
            responded_at: None,
            created_at: at,
            updated_at: at,
        });
        Ok(id)
    }

    /// Record the recipient's answer.
    ///
    /// Repeating the same answer is a no-op. Answering an accepted or
    /// expired contract differently is `AlreadyTerminal`.
    pub fn respond(
        &mut self,
        contract_id: ContractId,
        responder: UserId,
        response: ContractResponse,
        message: Option<String>,
        at: Timestamp,
    ) -> Result<Outcome, TransitionError> {
        let contract = self.get_mut(contract_id)?;
        if contract.recipient_id != Some(responder) {
            let action = match response {
                ContractResponse::Accept => "accept",
                ContractResponse::Reject => "reject",
            };
            return Err(TransitionError::not_permitted(responder, action, contract_id));
        }
        let target = response.target();
        if contract.status == target {
            return Ok(Outcome::Unchanged);
        }
        if contract.status.is_terminal() {
            return Err(TransitionError::terminal(ENTITY, contract_id, contract.status, target));
        }
        if !contract.status.is_open() || !contract.is_active {
            return Err(TransitionError::invalid(ENTITY, contract_id, contract.status, target));
        }
        contract.status = target;
        contract.response_message = message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
        contract.responded_at = Some(at);
        contract.updated_at = at;
        Ok(Outcome::Applied)
    }

    /// Address a draft to its recipient (`Draft → AwaitingAcceptance`).
    pub fn submit(
        &mut self,
        contract_id: ContractId,
        caller: UserId,
        recipient: UserId,
        at: Timestamp,
    ) -> Result<Outcome, TransitionError> {
        let contract = self.get_mut(contract_id)?;
        if contract.creator_id != caller || recipient == caller {
            return Err(TransitionError::not_permitted(caller, "submit", contract_id));
        }
        match contract.status {
            ContractStatus::AwaitingAcceptance if contract.recipient_id == Some(recipient) => {
                Ok(Outcome::Unchanged)
            }
            ContractStatus::Draft if contract.is_active => {
                contract.recipient_id = Some(recipient);
                contract.status = ContractStatus::AwaitingAcceptance;
                contract.updated_at = at;
                Ok(Outcome::Applied)
            }
            status if status.is_terminal() => Err(TransitionError::terminal(
                ENTITY,
                contract_id,
                status,
                ContractStatus::AwaitingAcceptance,
            )),
            status => Err(TransitionError::invalid(
                ENTITY,
                contract_id,
                status,
                ContractStatus::AwaitingAcceptance,
            )),
        }
    }

    /// Withdraw an unanswered version (`Draft | AwaitingAcceptance → Expired`).
    pub fn expire(
        &mut self,
        contract_id: ContractId,
        at: Timestamp,
    ) -> Result<Outcome, TransitionError> {
        let contract = self.get_mut(contract_id)?;
        match contract.status {
            ContractStatus::Expired => Ok(Outcome::Unchanged),
            ContractStatus::Draft | ContractStatus::AwaitingAcceptance => {
                contract.status = ContractStatus::Expired;
                contract.updated_at = at;
                Ok(Outcome::Applied)
            }
            status @ ContractStatus::AcceptedAwaitingPayment => Err(TransitionError::terminal(
                ENTITY,
                contract_id,
                status,
                ContractStatus::Expired,
            )),
            status @ ContractStatus::Rejected => Err(TransitionError::invalid(
                ENTITY,
                contract_id,
                status,
                ContractStatus::Expired,
            )),
        }
    }

    fn deactivate_all(&mut self, at: Timestamp) {
        for contract in self.contracts.iter_mut().filter(|c| c.is_active) {
            contract.is_active = false;
            contract.updated_at = at;
        }
    }
}
