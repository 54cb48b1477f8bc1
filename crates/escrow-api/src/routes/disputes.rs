//! # Disputes
//!
//! Disputes are opened from the transaction routes. This router serves
//! the dispute itself, its proposals, and escalation to staff review.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use escrow_core::{Amount, DisputeId};
use escrow_state::{Dispute, DisputeProposal, EscrowQueueItem, ProposalType};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::transactions::load_visible;
use crate::state::AppState;

/// Propose a resolution.
#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub proposal_type: ProposalType,
    /// Required for the partial types, rejected for the full ones.
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Build the disputes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/disputes/:id", get(get_dispute))
        .route(
            "/v1/disputes/:id/proposals",
            get(list_proposals).post(propose),
        )
        .route("/v1/disputes/:id/escalate", post(escalate))
}

fn load_dispute(
    state: &AppState,
    caller: &CallerIdentity,
    id: DisputeId,
) -> Result<Dispute, AppError> {
    let dispute = state.engine.disputes().dispute(id)?;
    load_visible(state, caller, dispute.transaction_id)?;
    Ok(dispute)
}

/// GET /v1/disputes/:id
async fn get_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Dispute>, AppError> {
    load_dispute(&state, &caller, DisputeId::from(id)).map(Json)
}

/// GET /v1/disputes/:id/proposals: Oldest first.
async fn list_proposals(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DisputeProposal>>, AppError> {
    let dispute = load_dispute(&state, &caller, DisputeId::from(id))?;
    Ok(Json(state.engine.disputes().proposals_for(dispute.id)?))
}

/// POST /v1/disputes/:id/proposals
async fn propose(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ProposeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DisputeProposal>), AppError> {
    let req = extract_json(body)?;
    let disputes = state.engine.disputes();
    let proposal = disputes.propose(
        DisputeId::from(id),
        caller.user_id,
        req.proposal_type,
        req.amount,
        req.description,
    )?;
    Ok((StatusCode::CREATED, Json(disputes.proposal(proposal)?)))
}

/// POST /v1/disputes/:id/escalate: Hand the case to staff. Returns the
/// queue item reviewing it.
async fn escalate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<EscrowQueueItem>, AppError> {
    let item = state
        .engine
        .disputes()
        .escalate(DisputeId::from(id), caller.user_id)?;
    Ok(Json(state.engine.queue().item(item)?))
}
