//! # Transactions
//!
//! Creation, party payment actions, and the per-transaction views of
//! contracts, disputes and queue items. `GET /v1/transactions/:id` serves
//! the repaired state.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use escrow_core::{Amount, TransactionId, UserId};
use escrow_engine::{NewTransaction, RepairReport};
use escrow_state::{Contract, Dispute, EscrowQueueItem, Transaction};

use crate::auth::{require_staff, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, require_non_blank, Validate};
use crate::routes::ensure_can_view;
use crate::state::AppState;

/// Open a transaction between a buyer and a seller.
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub title: String,
    /// Escrow total in the smallest currency unit.
    pub amount: Amount,
}

impl Validate for CreateTransactionRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("title", &self.title)?;
        if self.amount.is_zero() {
            return Err("amount must be positive".to_string());
        }
        if self.buyer_id == self.seller_id {
            return Err("buyer and seller must be different users".to_string());
        }
        Ok(())
    }
}

/// Open a dispute.
#[derive(Debug, Deserialize)]
pub struct OpenDisputeRequest {
    pub reason: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Build the transactions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/transactions", post(create_transaction).get(list_transactions))
        .route("/v1/transactions/:id", get(get_transaction))
        .route("/v1/transactions/:id/payment", post(record_payment))
        .route("/v1/transactions/:id/work-completed", post(mark_work_completed))
        .route("/v1/transactions/:id/release", post(release_payment))
        .route("/v1/transactions/:id/contracts", get(list_contracts))
        .route(
            "/v1/transactions/:id/disputes",
            get(list_disputes).post(open_dispute),
        )
        .route("/v1/transactions/:id/queue-items", get(list_queue_items))
        .route("/v1/transactions/:id/repair", post(repair))
}

/// POST /v1/transactions: Open a transaction. The caller must be the
/// buyer or the seller; the counterparty is added to the directory.
async fn create_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let req = extract_validated_json(body)?;
    state.directory.ensure(req.buyer_id);
    state.directory.ensure(req.seller_id);
    let tx = state.engine.transactions().create(
        NewTransaction {
            buyer_id: req.buyer_id,
            seller_id: req.seller_id,
            title: req.title,
            amount: req.amount,
        },
        caller.user_id,
    )?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// GET /v1/transactions: The caller's transactions, oldest first.
async fn list_transactions(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.engine.transactions().list_for_user(caller.user_id)?))
}

/// Repaired read plus the party-or-staff check.
pub(crate) fn load_visible(
    state: &AppState,
    caller: &CallerIdentity,
    id: TransactionId,
) -> Result<Transaction, AppError> {
    let tx = state.engine.transaction(id)?;
    ensure_can_view(caller, &tx)?;
    Ok(tx)
}

/// GET /v1/transactions/:id
async fn get_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    load_visible(&state, &caller, TransactionId::from(id)).map(Json)
}

/// POST /v1/transactions/:id/payment: Buyer pays into escrow.
async fn record_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .engine
        .transactions()
        .record_payment(TransactionId::from(id), caller.user_id)?;
    Ok(Json(tx))
}

/// POST /v1/transactions/:id/work-completed: Seller delivers.
async fn mark_work_completed(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .engine
        .transactions()
        .mark_work_completed(TransactionId::from(id), caller.user_id)?;
    Ok(Json(tx))
}

/// POST /v1/transactions/:id/release: Buyer releases escrow.
async fn release_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .engine
        .transactions()
        .release_payment(TransactionId::from(id), caller.user_id)?;
    Ok(Json(tx))
}

/// GET /v1/transactions/:id/contracts: Every contract version.
async fn list_contracts(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Contract>>, AppError> {
    let tx = load_visible(&state, &caller, TransactionId::from(id))?;
    Ok(Json(state.engine.contracts().contracts_for(tx.id)?))
}

/// GET /v1/transactions/:id/disputes
async fn list_disputes(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Dispute>>, AppError> {
    let tx = load_visible(&state, &caller, TransactionId::from(id))?;
    Ok(Json(state.engine.disputes().disputes_for(tx.id)?))
}

/// POST /v1/transactions/:id/disputes: Open a dispute, or return the
/// one already open.
async fn open_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<OpenDisputeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Dispute>), AppError> {
    let req = extract_json(body)?;
    let disputes = state.engine.disputes();
    let dispute_id = disputes.open_dispute(
        TransactionId::from(id),
        caller.user_id,
        &req.reason,
        req.description,
    )?;
    Ok((StatusCode::CREATED, Json(disputes.dispute(dispute_id)?)))
}

/// GET /v1/transactions/:id/queue-items
async fn list_queue_items(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EscrowQueueItem>>, AppError> {
    let tx = load_visible(&state, &caller, TransactionId::from(id))?;
    Ok(Json(state.engine.queue().items_for(tx.id)?))
}

/// POST /v1/transactions/:id/repair: Staff-triggered cascade repair.
async fn repair(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RepairReport>, AppError> {
    require_staff(&caller)?;
    let report = state.engine.reconciler().repair(TransactionId::from(id))?;
    if !report.is_clean() {
        tracing::info!(
            transaction_id = %report.transaction_id,
            steps = ?report.applied,
            "manual repair applied"
        );
    }
    Ok(Json(report))
}
