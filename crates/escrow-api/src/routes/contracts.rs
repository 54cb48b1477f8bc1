//! # Contracts
//!
//! Offers, answers and revisions. A new contract on a transaction whose
//! previous offer was rejected reopens negotiation; a revision supersedes
//! the version it revises.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use escrow_core::{Amount, ContractId, PartyRole, TransactionId, UserId};
use escrow_engine::CreateContract;
use escrow_state::{Contract, ContractResponse};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, require_non_blank, Validate};
use crate::routes::transactions::load_visible;
use crate::state::AppState;

/// Create a contract, or a revision when `parent_id` is set.
#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    pub transaction_id: TransactionId,
    /// The side the caller writes as.
    pub role: PartyRole,
    /// Omit to start a draft.
    #[serde(default)]
    pub recipient_id: Option<UserId>,
    pub content: String,
    /// Defaults to the transaction amount.
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub parent_id: Option<ContractId>,
}

impl Validate for CreateContractRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("content", &self.content)
    }
}

/// Accept or reject a contract.
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: ContractResponse,
    #[serde(default)]
    pub message: Option<String>,
}

/// Revise a contract.
#[derive(Debug, Deserialize)]
pub struct ReviseRequest {
    pub content: String,
    pub amount: Amount,
}

impl Validate for ReviseRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("content", &self.content)
    }
}

/// Send a draft to its recipient.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub recipient_id: UserId,
}

/// Build the contracts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/contracts", post(create_contract))
        .route("/v1/contracts/:id", get(get_contract))
        .route("/v1/contracts/:id/respond", post(respond))
        .route("/v1/contracts/:id/revisions", post(revise))
        .route("/v1/contracts/:id/submit", post(submit))
        .route("/v1/contracts/:id/expire", post(expire))
}

/// Read a contract the caller is allowed to see.
fn load_contract(
    state: &AppState,
    caller: &CallerIdentity,
    id: ContractId,
) -> Result<Contract, AppError> {
    let contract = state.engine.contracts().contract(id)?;
    load_visible(state, caller, contract.transaction_id)?;
    Ok(contract)
}

/// POST /v1/contracts
async fn create_contract(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateContractRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Contract>), AppError> {
    let req = extract_validated_json(body)?;
    let contracts = state.engine.contracts();
    let id = contracts.create_contract(CreateContract {
        transaction_id: req.transaction_id,
        creator_id: caller.user_id,
        role: req.role,
        recipient_id: req.recipient_id,
        content: req.content,
        amount: req.amount,
        parent_id: req.parent_id,
    })?;
    Ok((StatusCode::CREATED, Json(contracts.contract(id)?)))
}

/// GET /v1/contracts/:id
async fn get_contract(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Contract>, AppError> {
    load_contract(&state, &caller, ContractId::from(id)).map(Json)
}

/// POST /v1/contracts/:id/respond: The recipient answers.
async fn respond(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<Contract>, AppError> {
    let req = extract_json(body)?;
    let id = ContractId::from(id);
    let contracts = state.engine.contracts();
    contracts.respond(id, caller.user_id, req.response, req.message)?;
    Ok(Json(contracts.contract(id)?))
}

/// POST /v1/contracts/:id/revisions: New version of the chain.
async fn revise(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ReviseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Contract>), AppError> {
    let req = extract_validated_json(body)?;
    let contracts = state.engine.contracts();
    let revision =
        contracts.create_revision(ContractId::from(id), caller.user_id, &req.content, req.amount)?;
    Ok((StatusCode::CREATED, Json(contracts.contract(revision)?)))
}

/// POST /v1/contracts/:id/submit: Draft goes out for an answer.
async fn submit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<Contract>, AppError> {
    let req = extract_json(body)?;
    let id = ContractId::from(id);
    let contracts = state.engine.contracts();
    contracts.submit_draft(id, caller.user_id, req.recipient_id)?;
    Ok(Json(contracts.contract(id)?))
}

/// POST /v1/contracts/:id/expire: Creator or admin withdraws an offer.
async fn expire(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Contract>, AppError> {
    let id = ContractId::from(id);
    let contracts = state.engine.contracts();
    contracts.expire(id, caller.user_id)?;
    Ok(Json(contracts.contract(id)?))
}
