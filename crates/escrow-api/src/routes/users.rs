//! # Users
//!
//! The caller's own identity, and admin management of directory roles.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use escrow_core::{UserId, UserRole};

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

/// A directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub user_id: UserId,
    pub role: UserRole,
}

/// Change a user's role.
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", get(list_users))
        .route("/v1/users/me", get(whoami))
        .route("/v1/users/:id/role", put(set_role))
}

/// GET /v1/users/me
async fn whoami(caller: CallerIdentity) -> Json<UserView> {
    Json(UserView {
        user_id: caller.user_id,
        role: caller.role,
    })
}

/// GET /v1/users: Admin only.
async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<UserView>>, AppError> {
    require_role(&caller, UserRole::Admin)?;
    let users = state
        .directory
        .list()
        .into_iter()
        .map(|(user_id, role)| UserView { user_id, role })
        .collect();
    Ok(Json(users))
}

/// PUT /v1/users/:id/role: Admin only. Creates the user if unknown.
async fn set_role(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<Json<UserView>, AppError> {
    require_role(&caller, UserRole::Admin)?;
    let req = extract_json(body)?;
    let user_id = UserId::from(id);
    if user_id == caller.user_id && req.role != UserRole::Admin {
        return Err(AppError::Validation("admins cannot demote themselves".into()));
    }
    state.directory.register(user_id, req.role);
    tracing::info!(
        user_id = %user_id,
        role = %req.role,
        changed_by = %caller.user_id,
        "role changed"
    );
    Ok(Json(UserView {
        user_id,
        role: req.role,
    }))
}
