//! # Escrow Release Queue
//!
//! Staff review of held funds. Listing is staff-only; a party may queue
//! its own transaction and read the item that reviews it. Admins approve
//! or reject, moderators and support may only hold.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use escrow_core::{QueueItemId, TransactionId};
use escrow_state::{EscrowQueueItem, Priority, QueueDecision, QueueStatus};

use crate::auth::{require_staff, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, require_non_blank, Validate};
use crate::routes::transactions::load_visible;
use crate::state::AppState;

/// `?status=` filter. Absent lists every open item.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<QueueStatus>,
}

/// Queue a transaction for review.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub transaction_id: TransactionId,
    pub reason: String,
    #[serde(default)]
    pub priority: Priority,
}

impl Validate for EnqueueRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("reason", &self.reason)
    }
}

/// A staff decision.
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: QueueDecision,
    pub notes: String,
}

/// Build the queue router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/escrow-queue", get(list_items).post(enqueue))
        .route("/v1/escrow-queue/:id", get(get_item))
        .route("/v1/escrow-queue/:id/decision", post(decide))
}

/// GET /v1/escrow-queue?status=: Review order.
async fn list_items(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<EscrowQueueItem>>, AppError> {
    require_staff(&caller)?;
    let Query(query) = query.map_err(|err| AppError::BadRequest(err.body_text()))?;
    Ok(Json(state.engine.queue().list(query.status)?))
}

/// POST /v1/escrow-queue
async fn enqueue(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EscrowQueueItem>), AppError> {
    let req = extract_validated_json(body)?;
    let queue = state.engine.queue();
    let id = queue.enqueue(req.transaction_id, caller.user_id, &req.reason, req.priority)?;
    Ok((StatusCode::CREATED, Json(queue.item(id)?)))
}

/// GET /v1/escrow-queue/:id
async fn get_item(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<EscrowQueueItem>, AppError> {
    let item = state.engine.queue().item(QueueItemId::from(id))?;
    load_visible(&state, &caller, item.transaction_id)?;
    Ok(Json(item))
}

/// POST /v1/escrow-queue/:id/decision
async fn decide(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<EscrowQueueItem>, AppError> {
    let req = extract_json(body)?;
    let item = state.engine.queue().decide(
        QueueItemId::from(id),
        caller.user_id,
        req.decision,
        &req.notes,
    )?;
    Ok(Json(item))
}
