//! # ContractLedger
//!
//! Contract creation, responses and revisions. All versions of one
//! transaction's contracts are a single `ContractChain` record, so every
//! operation here is: load chain, mutate, write back under the version
//! that was read. Two concurrent revisions of the same rejected contract
//! race on that precondition; the loser gets `Conflict` and the chain
//! never holds two active versions.
//!
//! The transaction status follows the contract (accepted, rejected,
//! negotiation reopened) as a best-effort cascade; a lost cascade is
//! re-derived from the chain by the repair pass.

use escrow_core::{Actor, Amount, ContractId, PartyRole, TransactionId, UserId, UserRole};
use escrow_ledger::{Filter, Versioned};
use escrow_state::{
    Contract, ContractChain, ContractResponse, NewContract, Outcome, Transaction, TransactionEvent,
};

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::notify::EventKind;

/// Input for [`ContractLedger::create_contract`].
#[derive(Debug, Clone)]
pub struct CreateContract {
    /// Governing transaction.
    pub transaction_id: TransactionId,
    /// Author; must be a party to the transaction.
    pub creator_id: UserId,
    /// The side the author claims to be on.
    pub role: PartyRole,
    /// Counterparty to address, or `None` for a draft.
    pub recipient_id: Option<UserId>,
    /// Contract body.
    pub content: String,
    /// Proposed price; defaults to the transaction amount.
    pub amount: Option<Amount>,
    /// A rejected contract this one revises.
    pub parent_id: Option<ContractId>,
}

/// Contract negotiation service.
#[derive(Debug, Clone)]
pub struct ContractLedger {
    ctx: EngineContext,
}

impl ContractLedger {
    /// Bind to a context.
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Create a contract for a transaction still in negotiation.
    ///
    /// With `parent_id` this is a revision of that contract (see
    /// [`ContractLedger::create_revision`]); a revision keeps the parent's
    /// recipient, so `recipient_id` may be omitted or must name it. Otherwise a new chain root is
    /// started at revision 1, which is refused while the current active
    /// contract is still open or accepted.
    pub fn create_contract(&self, req: CreateContract) -> Result<ContractId, EngineError> {
        let tx = self.ctx.load_transaction(req.transaction_id)?.record;
        let creator_role = self.ctx.party_of(&tx, req.creator_id, "create contract")?;
        if creator_role != req.role {
            return Err(EngineError::not_authorized(
                req.creator_id,
                format!("create contract as {}", req.role),
                tx.id,
            ));
        }
        if let Some(parent_id) = req.parent_id {
            let parent = self.contract(parent_id)?;
            if req.recipient_id.is_some() && req.recipient_id != parent.recipient_id {
                return Err(EngineError::Validation(escrow_core::ValidationError::Inconsistent(
                    format!("a revision of {parent_id} goes to the same recipient"),
                )));
            }
            let amount = req.amount.unwrap_or(tx.amount);
            return self.create_revision(parent_id, req.creator_id, &req.content, amount);
        }
        if let Some(recipient) = req.recipient_id {
            self.check_recipient(&tx, req.creator_id, recipient)?;
        }
        if !tx.status.is_negotiating() {
            return Err(EngineError::invalid("transaction", tx.id, tx.status, "new contract"));
        }

        let now = self.ctx.now();
        let input = NewContract {
            creator_id: req.creator_id,
            recipient_id: req.recipient_id,
            content: req.content,
            amount: req.amount.unwrap_or(tx.amount),
        };
        let contract_id = match self.ctx.ledger.try_load::<ContractChain>(*tx.id.as_uuid())? {
            Some(mut entry) => {
                let id = entry.record.create(input, now)?;
                self.ctx.ledger.update(&mut entry)?;
                id
            }
            None => {
                let mut chain = ContractChain::new(tx.id);
                let id = chain.create(input, now)?;
                self.ctx.ledger.insert(chain)?;
                id
            }
        };
        tracing::info!(transaction_id = %tx.id, contract_id = %contract_id, "contract created");

        self.reopen_negotiation(tx.id, creator_role);
        if let Some(recipient) = req.recipient_id {
            self.ctx.notify(
                EventKind::ContractCreated,
                tx.id,
                Some(contract_id),
                None,
                req.creator_id,
                &[recipient],
            );
        }
        Ok(contract_id)
    }

    /// Recipient accepts or rejects the active contract.
    ///
    /// Accepting sets the transaction amount to the contract amount and
    /// moves the transaction to `contract_accepted`; rejecting moves it to
    /// `contract_rejected`. Repeating the same answer is a no-op.
    pub fn respond(
        &self,
        contract_id: ContractId,
        responder: UserId,
        response: ContractResponse,
        message: Option<String>,
    ) -> Result<(), EngineError> {
        let mut entry = self.load_chain_of(contract_id)?;
        let outcome =
            entry
                .record
                .respond(contract_id, responder, response, message, self.ctx.now())?;
        if outcome == Outcome::Unchanged {
            tracing::debug!(contract_id = %contract_id, "contract response already recorded");
            return Ok(());
        }
        self.ctx.ledger.update(&mut entry)?;
        let contract = find(&entry.record, contract_id)?;
        tracing::info!(
            contract_id = %contract_id,
            status = %contract.status,
            "contract response recorded"
        );

        let tx_id = entry.record.transaction_id;
        let event = match response {
            ContractResponse::Accept => TransactionEvent::AcceptContract {
                amount: contract.amount,
            },
            ContractResponse::Reject => TransactionEvent::RejectContract,
        };
        let actor = self.actor_for(tx_id, responder);
        let cascaded = actor.and_then(|actor| self.ctx.advance_by_id(tx_id, actor, &event));
        self.ctx.cascade("transaction follows contract response", tx_id, cascaded);

        let kind = match response {
            ContractResponse::Accept => EventKind::ContractAccepted,
            ContractResponse::Reject => EventKind::ContractRejected,
        };
        self.ctx.notify(
            kind,
            tx_id,
            Some(contract_id),
            None,
            responder,
            &[contract.creator_id],
        );
        Ok(())
    }

    /// Creator revises a rejected contract.
    ///
    /// The new version is inserted active, with `revision_number` one past
    /// the chain's maximum and `parent_contract_id` set to the chain root;
    /// every other version is deactivated in the same write. The
    /// transaction returns to `created`.
    pub fn create_revision(
        &self,
        original_id: ContractId,
        caller: UserId,
        new_content: &str,
        new_amount: Amount,
    ) -> Result<ContractId, EngineError> {
        let mut entry = self.load_chain_of(original_id)?;
        let tx_id = entry.record.transaction_id;
        let tx = self.ctx.load_transaction(tx_id)?.record;
        let role = self.ctx.party_of(&tx, caller, "revise contract")?;
        if !tx.status.is_negotiating() {
            return Err(EngineError::invalid("transaction", tx_id, tx.status, "contract revision"));
        }
        let id = entry
            .record
            .revise(original_id, caller, new_content, new_amount, self.ctx.now())?;
        self.ctx.ledger.update(&mut entry)?;
        let revision = find(&entry.record, id)?;
        tracing::info!(
            transaction_id = %tx_id,
            contract_id = %id,
            revision = revision.revision_number,
            chain_root = %revision.chain_root_id,
            "contract revised"
        );

        self.reopen_negotiation(tx_id, role);
        if let Some(recipient) = revision.recipient_id {
            self.ctx
                .notify(EventKind::ContractRevised, tx_id, Some(id), None, caller, &[recipient]);
        }
        Ok(id)
    }

    /// Creator addresses a draft to the counterparty.
    pub fn submit_draft(
        &self,
        contract_id: ContractId,
        caller: UserId,
        recipient: UserId,
    ) -> Result<(), EngineError> {
        let mut entry = self.load_chain_of(contract_id)?;
        let tx = self.ctx.load_transaction(entry.record.transaction_id)?.record;
        self.check_recipient(&tx, caller, recipient)?;
        let outcome = entry
            .record
            .submit(contract_id, caller, recipient, self.ctx.now())?;
        if outcome == Outcome::Applied {
            self.ctx.ledger.update(&mut entry)?;
            tracing::info!(contract_id = %contract_id, "draft submitted");
            self.ctx.notify(
                EventKind::ContractSubmitted,
                tx.id,
                Some(contract_id),
                None,
                caller,
                &[recipient],
            );
        }
        Ok(())
    }

    /// Withdraw an unanswered contract. Allowed for its creator and for
    /// admins (an external expiry scheduler acts as an admin).
    pub fn expire(&self, contract_id: ContractId, caller: UserId) -> Result<(), EngineError> {
        let role = self.ctx.require_user(caller)?;
        let mut entry = self.load_chain_of(contract_id)?;
        let contract = find(&entry.record, contract_id)?;
        if contract.creator_id != caller && role != UserRole::Admin {
            return Err(EngineError::not_authorized(caller, "expire", contract_id));
        }
        let creator = contract.creator_id;
        let recipient = contract.recipient_id;
        if entry.record.expire(contract_id, self.ctx.now())? == Outcome::Applied {
            self.ctx.ledger.update(&mut entry)?;
            tracing::info!(contract_id = %contract_id, "contract expired");
            let recipients: Vec<UserId> = [Some(creator), recipient]
                .into_iter()
                .flatten()
                .filter(|u| *u != caller)
                .collect();
            self.ctx.notify(
                EventKind::ContractExpired,
                entry.record.transaction_id,
                Some(contract_id),
                None,
                caller,
                &recipients,
            );
        }
        Ok(())
    }

    /// One contract version.
    pub fn contract(&self, contract_id: ContractId) -> Result<Contract, EngineError> {
        let entry = self.load_chain_of(contract_id)?;
        find(&entry.record, contract_id)
    }

    /// Every contract version of a transaction, by chain then revision.
    pub fn contracts_for(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Contract>, EngineError> {
        let chain = self
            .ctx
            .ledger
            .try_load::<ContractChain>(*transaction_id.as_uuid())?;
        let Some(entry) = chain else {
            return Ok(Vec::new());
        };
        let mut contracts = entry.record.contracts;
        contracts.sort_by_key(|c| (c.created_at, c.revision_number));
        Ok(contracts)
    }

    /// The version currently governing a transaction.
    pub fn active_contract(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Contract>, EngineError> {
        Ok(self
            .ctx
            .ledger
            .try_load::<ContractChain>(*transaction_id.as_uuid())?
            .and_then(|entry| entry.record.active().cloned()))
    }

    pub(crate) fn load_chain_of(
        &self,
        contract_id: ContractId,
    ) -> Result<Versioned<ContractChain>, EngineError> {
        self.ctx
            .ledger
            .find::<ContractChain>(&Filter::element_eq(
                "contracts",
                "id",
                contract_id.as_uuid().to_string(),
            ))?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("contract", contract_id))
    }

    fn check_recipient(
        &self,
        tx: &Transaction,
        creator: UserId,
        recipient: UserId,
    ) -> Result<(), EngineError> {
        self.ctx.require_user(recipient)?;
        match tx.party_role(recipient) {
            Some(_) if recipient != creator => Ok(()),
            _ => Err(EngineError::Validation(escrow_core::ValidationError::Inconsistent(
                format!("recipient {recipient} must be the counterparty on {}", tx.id),
            ))),
        }
    }

    fn actor_for(&self, tx_id: TransactionId, user: UserId) -> Result<Actor, EngineError> {
        let tx = self.ctx.load_transaction(tx_id)?.record;
        self.ctx.party_of(&tx, user, "negotiate").map(Actor::from)
    }

    fn reopen_negotiation(&self, tx_id: TransactionId, role: PartyRole) {
        let result = self
            .ctx
            .advance_by_id(tx_id, Actor::from(role), &TransactionEvent::ReopenNegotiation);
        self.ctx.cascade("reopen negotiation", tx_id, result);
    }
}

fn find(chain: &ContractChain, id: ContractId) -> Result<Contract, EngineError> {
    chain
        .get(id)
        .cloned()
        .ok_or_else(|| EngineError::not_found("contract", id))
}
