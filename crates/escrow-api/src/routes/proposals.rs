//! # Proposals
//!
//! Read a proposal and let the other party answer it. Accepting settles
//! the dispute and closes the transaction.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use escrow_core::ProposalId;
use escrow_state::{DisputeProposal, ProposalResponse};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::transactions::load_visible;
use crate::state::AppState;

/// Accept or reject a proposal.
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: ProposalResponse,
}

/// Build the proposals router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/proposals/:id", get(get_proposal))
        .route("/v1/proposals/:id/respond", post(respond))
}

/// GET /v1/proposals/:id
async fn get_proposal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<DisputeProposal>, AppError> {
    let proposal = state.engine.disputes().proposal(ProposalId::from(id))?;
    load_visible(&state, &caller, proposal.transaction_id)?;
    Ok(Json(proposal))
}

/// POST /v1/proposals/:id/respond
async fn respond(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<DisputeProposal>, AppError> {
    let req = extract_json(body)?;
    let id = ProposalId::from(id);
    let disputes = state.engine.disputes();
    disputes.respond(id, caller.user_id, req.response)?;
    Ok(Json(disputes.proposal(id)?))
}
