//! # Disputes and Proposals
//!
//! A dispute is `Open` until a proposal is accepted or a staff decision
//! on the escalated transaction closes it. The dispute record carries its
//! own resolution (which proposal, which split), so the dispute write is
//! the single commit point for "this dispute was settled this way"; the
//! proposal status and transaction status are derived from it.

use serde::{Deserialize, Serialize};

use escrow_core::{
    Amount, DisputeId, ProposalId, Timestamp, TransactionId, UserId, ValidationError,
};

use crate::error::TransitionError;
use crate::resolution::{compute_split, ProposalType, ResolutionBreakdown};
use crate::Outcome;

/// Status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Accepting proposals.
    Open,
    /// Settled.
    Resolved,
}

impl DisputeStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dispute was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    /// The accepted proposal; `None` when a staff decision settled it.
    pub accepted_proposal_id: Option<ProposalId>,
    /// The resulting split.
    pub breakdown: ResolutionBreakdown,
    /// Who settled it.
    pub decided_by: UserId,
}

/// A dispute raised against a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Identifier.
    pub id: DisputeId,
    /// Disputed transaction.
    pub transaction_id: TransactionId,
    /// Party that raised it.
    pub initiator_id: UserId,
    /// Short reason.
    pub reason: String,
    /// Free-text detail.
    pub description: Option<String>,
    /// Status.
    pub status: DisputeStatus,
    /// Set on resolution.
    pub resolution: Option<DisputeResolution>,
    /// Free-text notes on the resolution.
    pub resolution_notes: Option<String>,
    /// Set once the dispute went to staff review; proposals are frozen.
    #[serde(default)]
    pub escalated_at: Option<Timestamp>,
    /// When it was opened.
    pub opened_at: Timestamp,
    /// When it was resolved.
    pub resolved_at: Option<Timestamp>,
}

impl Dispute {
    /// Open a dispute.
    pub fn open(
        transaction_id: TransactionId,
        initiator_id: UserId,
        reason: &str,
        description: Option<String>,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: DisputeId::new(),
            transaction_id,
            initiator_id,
            reason: escrow_core::error::require_text("reason", reason)?,
            description: non_blank(description),
            status: DisputeStatus::Open,
            resolution: None,
            resolution_notes: None,
            escalated_at: None,
            opened_at: at,
            resolved_at: None,
        })
    }

    /// Whether the dispute still accepts proposals.
    pub fn is_open(&self) -> bool {
        self.status == DisputeStatus::Open
    }

    /// Whether proposal activity is frozen pending staff review.
    pub fn is_escalated(&self) -> bool {
        self.escalated_at.is_some()
    }

    /// Hand the dispute to staff. Escalating twice is a no-op; a resolved
    /// dispute cannot be escalated.
    pub fn escalate(&mut self, at: Timestamp) -> Result<Outcome, TransitionError> {
        if self.status == DisputeStatus::Resolved {
            return Err(TransitionError::AlreadyTerminal {
                entity: "dispute",
                id: self.id.to_string(),
                state: self.status.to_string(),
                requested: "escalated".to_string(),
            });
        }
        if self.escalated_at.is_some() {
            return Ok(Outcome::Unchanged);
        }
        self.escalated_at = Some(at);
        Ok(Outcome::Applied)
    }

    /// Close the dispute with `resolution`.
    ///
    /// Re-applying the identical resolution is a no-op; any other
    /// resolution of an already resolved dispute is `AlreadyDecided`.
    pub fn resolve(
        &mut self,
        resolution: DisputeResolution,
        notes: Option<String>,
        at: Timestamp,
    ) -> Result<Outcome, TransitionError> {
        match self.status {
            DisputeStatus::Resolved => {
                let same = self.resolution.is_some_and(|existing| {
                    existing.accepted_proposal_id == resolution.accepted_proposal_id
                        && existing.breakdown == resolution.breakdown
                });
                if same {
                    return Ok(Outcome::Unchanged);
                }
                Err(TransitionError::AlreadyDecided {
                    entity: "dispute",
                    id: self.id.to_string(),
                    status: self.status.to_string(),
                })
            }
            DisputeStatus::Open => {
                self.status = DisputeStatus::Resolved;
                self.resolution = Some(resolution);
                self.resolution_notes = non_blank(notes);
                self.resolved_at = Some(at);
                Ok(Outcome::Applied)
            }
        }
    }
}

// ─── Proposals ──────────────────────────────────────────────────────

/// Status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Awaiting the other party.
    Pending,
    /// Accepted; settles the dispute.
    Accepted,
    /// Turned down or superseded.
    Rejected,
}

impl ProposalStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The other party's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalResponse {
    /// Settle on these terms.
    Accept,
    /// Keep negotiating.
    Reject,
}

impl ProposalResponse {
    fn target(&self) -> ProposalStatus {
        match self {
            Self::Accept => ProposalStatus::Accepted,
            Self::Reject => ProposalStatus::Rejected,
        }
    }
}

/// A party's suggested resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeProposal {
    /// Identifier.
    pub id: ProposalId,
    /// Dispute it belongs to.
    pub dispute_id: DisputeId,
    /// The disputed transaction.
    pub transaction_id: TransactionId,
    /// Party that proposed it.
    pub proposer_id: UserId,
    /// Kind of resolution.
    pub proposal_type: ProposalType,
    /// Required for partial types.
    pub amount: Option<Amount>,
    /// Free-text rationale.
    pub description: Option<String>,
    /// Status.
    pub status: ProposalStatus,
    /// Who answered it.
    pub responder_id: Option<UserId>,
    /// When it was answered.
    pub responded_at: Option<Timestamp>,
    /// When it was made.
    pub created_at: Timestamp,
}

impl DisputeProposal {
    /// Build a proposal, validating the amount against the escrow total.
    pub fn new(
        dispute: &Dispute,
        proposer_id: UserId,
        proposal_type: ProposalType,
        amount: Option<Amount>,
        description: Option<String>,
        total: Amount,
        at: Timestamp,
    ) -> Result<Self, ValidationError> {
        compute_split(proposal_type, amount, total)?;
        Ok(Self {
            id: ProposalId::new(),
            dispute_id: dispute.id,
            transaction_id: dispute.transaction_id,
            proposer_id,
            proposal_type,
            amount,
            description: non_blank(description),
            status: ProposalStatus::Pending,
            responder_id: None,
            responded_at: None,
            created_at: at,
        })
    }

    /// The split this proposal yields against `total`.
    pub fn breakdown(&self, total: Amount) -> Result<ResolutionBreakdown, ValidationError> {
        compute_split(self.proposal_type, self.amount, total)
    }

    /// Record an answer. Repeating the same answer is a no-op.
    pub fn respond(
        &mut self,
        responder: UserId,
        response: ProposalResponse,
        at: Timestamp,
    ) -> Result<Outcome, TransitionError> {
        if responder == self.proposer_id {
            return Err(TransitionError::not_permitted(responder, "answer own proposal", self.id));
        }
        let target = response.target();
        match self.status {
            status if status == target => Ok(Outcome::Unchanged),
            ProposalStatus::Pending => {
                self.status = target;
                self.responder_id = Some(responder);
                self.responded_at = Some(at);
                Ok(Outcome::Applied)
            }
            status @ (ProposalStatus::Accepted | ProposalStatus::Rejected) => {
                Err(TransitionError::AlreadyDecided {
                    entity: "proposal",
                    id: self.id.to_string(),
                    status: status.to_string(),
                })
            }
        }
    }

    /// Mark accepted as the materialization of a recorded dispute
    /// resolution. No-op if already accepted.
    pub fn mark_accepted(&mut self, responder: UserId, at: Timestamp) -> Outcome {
        if self.status == ProposalStatus::Accepted {
            return Outcome::Unchanged;
        }
        self.status = ProposalStatus::Accepted;
        self.responder_id = Some(responder);
        self.responded_at = Some(at);
        Outcome::Applied
    }

    /// Close a still-pending proposal because another one settled the dispute.
    pub fn supersede(&mut self, at: Timestamp) -> Outcome {
        if self.status != ProposalStatus::Pending {
            return Outcome::Unchanged;
        }
        self.status = ProposalStatus::Rejected;
        self.responded_at = Some(at);
        Outcome::Applied
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn dispute() -> Dispute {
        Dispute::open(TransactionId::new(), UserId::new(), "Work not delivered", None, at(0))
            .unwrap()
    }

    fn proposal(
        d: &Dispute,
        proposer: UserId,
        kind: ProposalType,
        amount: Option<u64>,
        total: u64,
    ) -> Result<DisputeProposal, ValidationError> {
        let amount = amount.map(Amount::new);
        DisputeProposal::new(d, proposer, kind, amount, None, Amount::new(total), at(1))
    }

    #[test]
    fn open_requires_reason() {
        assert!(Dispute::open(TransactionId::new(), UserId::new(), "  ", None, at(0)).is_err());
        let d = Dispute::open(TransactionId::new(), UserId::new(), "late", Some("  ".into()), at(0))
            .unwrap();
        assert!(d.description.is_none());
        assert!(d.is_open());
    }

    #[test]
    fn partial_proposal_amount_validated_against_total() {
        let d = dispute();
        let proposer = UserId::new();
        let kind = ProposalType::ReleasePartial;
        assert!(proposal(&d, proposer, kind, Some(9_000), 9_000).is_err());
        assert!(proposal(&d, proposer, kind, None, 9_000).is_err());
        let p = proposal(&d, proposer, kind, Some(6_000), 9_000).unwrap();
        assert_eq!(p.breakdown(Amount::new(9_000)).unwrap().buyer_refund, Amount::new(3_000));
    }

    #[test]
    fn proposer_cannot_answer_own_proposal() {
        let d = dispute();
        let proposer = UserId::new();
        let mut p = proposal(&d, proposer, ProposalType::RefundFull, None, 10).unwrap();
        let err = p.respond(proposer, ProposalResponse::Accept, at(2)).unwrap_err();
        assert!(matches!(err, TransitionError::NotPermitted { .. }));
    }

    #[test]
    fn respond_is_idempotent_then_decided() {
        let d = dispute();
        let mut p = proposal(&d, UserId::new(), ProposalType::RefundFull, None, 10).unwrap();
        let other = UserId::new();
        assert_eq!(p.respond(other, ProposalResponse::Reject, at(2)).unwrap(), Outcome::Applied);
        assert_eq!(p.respond(other, ProposalResponse::Reject, at(3)).unwrap(), Outcome::Unchanged);
        let err = p.respond(other, ProposalResponse::Accept, at(4)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyDecided { .. }));
    }

    #[test]
    fn resolve_once() {
        let mut d = dispute();
        let resolution = DisputeResolution {
            accepted_proposal_id: Some(ProposalId::new()),
            breakdown: ResolutionBreakdown::release_full(Amount::new(10)),
            decided_by: UserId::new(),
        };
        assert_eq!(d.resolve(resolution, None, at(1)).unwrap(), Outcome::Applied);
        assert_eq!(d.resolve(resolution, None, at(2)).unwrap(), Outcome::Unchanged);
        assert_eq!(d.resolved_at, Some(at(1)));

        let other = DisputeResolution {
            accepted_proposal_id: Some(ProposalId::new()),
            ..resolution
        };
        let err = d.resolve(other, None, at(3)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyDecided { .. }));
    }

    #[test]
    fn escalate_once_and_never_after_resolution() {
        let mut d = dispute();
        assert!(!d.is_escalated());
        assert_eq!(d.escalate(at(1)).unwrap(), Outcome::Applied);
        assert_eq!(d.escalate(at(2)).unwrap(), Outcome::Unchanged);
        assert_eq!(d.escalated_at, Some(at(1)));

        let mut settled = dispute();
        settled
            .resolve(
                DisputeResolution {
                    accepted_proposal_id: None,
                    breakdown: ResolutionBreakdown::refund_full(Amount::new(10)),
                    decided_by: UserId::new(),
                },
                Some("refunded by staff".into()),
                at(1),
            )
            .unwrap();
        let err = settled.escalate(at(2)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
    }

    #[test]
    fn supersede_only_touches_pending() {
        let d = dispute();
        let mut p = proposal(&d, UserId::new(), ProposalType::ReleaseFull, None, 10).unwrap();
        assert_eq!(p.supersede(at(2)), Outcome::Applied);
        assert_eq!(p.status, ProposalStatus::Rejected);
        assert_eq!(p.supersede(at(3)), Outcome::Unchanged);
        assert_eq!(p.mark_accepted(UserId::new(), at(4)), Outcome::Applied);
    }
}
