//! # escrow-api: Axum API for the Escrow Marketplace
//!
//! HTTP surface over [`escrow_engine`]. Handlers translate requests into
//! engine calls and engine errors into status codes; every lifecycle rule
//! lives in the engine.
//!
//! ## API Surface
//!
//! | Prefix                 | Module                     | Domain               |
//! |------------------------|----------------------------|----------------------|
//! | `/v1/transactions/*`   | [`routes::transactions`]   | Transactions         |
//! | `/v1/contracts/*`      | [`routes::contracts`]      | Contract negotiation |
//! | `/v1/disputes/*`       | [`routes::disputes`]       | Disputes             |
//! | `/v1/proposals/*`      | [`routes::proposals`]      | Proposals            |
//! | `/v1/escrow-queue/*`   | [`routes::queue`]          | Staff release queue  |
//! | `/v1/users/*`          | [`routes::users`]          | Directory            |
//! | `/v1/metrics`          | this module                | Request counters     |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## Error Mapping
//!
//! | Engine error                         | Status |
//! |--------------------------------------|--------|
//! | `Validation`                         | 422    |
//! | `NotAuthorized`                      | 403    |
//! | `NotFound`                           | 404    |
//! | `InvalidTransition`, `AlreadyDecided`, `AlreadyTerminal`, `Escalated`, `Conflict` | 409 |
//! | `Store`                              | 500    |

pub mod auth;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Json, Router};

use crate::auth::{require_staff, AuthConfig, CallerIdentity};
use crate::error::AppError;
use crate::middleware::metrics::{ApiMetrics, MetricsSnapshot};
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    app_with_metrics(state, ApiMetrics::new())
}

/// [`app`] with caller-owned counters.
pub fn app_with_metrics(state: AppState, metrics: ApiMetrics) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
        directory: state.directory.clone(),
    };

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::transactions::router())
        .merge(routes::contracts::router())
        .merge(routes::disputes::router())
        .merge(routes::proposals::router())
        .merge(routes::queue::router())
        .merge(routes::users::router())
        .route("/v1/metrics", get(metrics_snapshot))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(auth_config))
        .layer(Extension(metrics))
        .with_state(state);

    // Unauthenticated health checks.
    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness check: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: the store is in-process, so ready once serving.
async fn readiness() -> &'static str {
    "ready"
}

/// GET /v1/metrics: Staff only.
async fn metrics_snapshot(
    caller: CallerIdentity,
    Extension(metrics): Extension<ApiMetrics>,
) -> Result<Json<MetricsSnapshot>, AppError> {
    require_staff(&caller)?;
    Ok(Json(metrics.snapshot()))
}
