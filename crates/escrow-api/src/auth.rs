//! # Authentication
//!
//! Bearer token middleware that establishes who is calling.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {user_id}:{secret}
//! ```
//!
//! `user_id` is the caller's UUID. `secret` is compared in constant time
//! against `AUTH_TOKEN`; when no token is configured the secret part is
//! optional and not checked (development mode). A caller the directory
//! has not seen yet is registered as a plain user, so buyers and sellers
//! need no provisioning step. Staff roles come from the directory.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use escrow_core::{UserId, UserRole};
use escrow_engine::StaticDirectory;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Who is calling.
    pub user_id: UserId,
    /// Their directory role at the time of the request.
    pub role: UserRole,
}

impl CallerIdentity {
    /// Whether the caller is staff (admin, moderator or support).
    pub fn is_staff(&self) -> bool {
        self.role.can_hold_release()
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Return 403 unless the caller holds `role`.
pub fn require_role(caller: &CallerIdentity, role: UserRole) -> Result<(), AppError> {
    if caller.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            role.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Return 403 unless the caller is staff.
pub fn require_staff(caller: &CallerIdentity) -> Result<(), AppError> {
    if caller.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "staff role required, caller has '{}'",
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
    pub directory: StaticDirectory,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{user_id}:{secret}` and check the secret against `expected`.
pub fn parse_bearer_token(provided: &str, expected: Option<&str>) -> Result<UserId, String> {
    let (user, secret) = match provided.split_once(':') {
        Some((user, secret)) => (user, Some(secret)),
        None => (provided, None),
    };
    if let Some(expected) = expected {
        match secret {
            Some(secret) if constant_time_token_eq(secret, expected) => {}
            _ => return Err("invalid bearer token".into()),
        }
    }
    user.parse::<Uuid>()
        .map(UserId::from)
        .map_err(|e| format!("invalid user id: {e}"))
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Authenticate the bearer token and inject the caller's identity.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(config) = request.extensions().get::<AuthConfig>().cloned() else {
        return AppError::Internal("auth configuration missing".into()).into_response();
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token,
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match parse_bearer_token(provided, config.token.as_deref()) {
        Ok(user_id) => {
            let role = config.directory.ensure(user_id);
            request
                .extensions_mut()
                .insert(CallerIdentity { user_id, role });
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(token: Option<&str>, directory: StaticDirectory) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.role.as_str().to_string() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig {
                token: token.map(str::to_string),
                directory,
            }))
    }

    async fn call(app: Router, authorization: Option<String>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header("authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_resolves_directory_role() {
        let directory = StaticDirectory::new();
        let admin = Uuid::new_v4();
        directory.register(UserId::from(admin), UserRole::Admin);
        let app = test_app(Some("s3cret"), directory);
        let (status, body) = call(app, Some(format!("Bearer {admin}:s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn unknown_caller_is_registered_as_user() {
        let directory = StaticDirectory::new();
        let app = test_app(Some("s3cret"), directory.clone());
        let user = Uuid::new_v4();
        let (status, body) = call(app, Some(format!("Bearer {user}:s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user");
        assert_eq!(directory.list(), vec![(UserId::from(user), UserRole::User)]);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let app = test_app(Some("s3cret"), StaticDirectory::new());
        let user = Uuid::new_v4();
        let (status, body) = call(app, Some(format!("Bearer {user}:guess"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn missing_header_and_other_schemes_are_rejected() {
        let app = test_app(None, StaticDirectory::new());
        assert_eq!(call(app.clone(), None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            call(app, Some("Basic dXNlcjpwYXNz".into())).await.0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn secret_optional_when_auth_disabled() {
        let app = test_app(None, StaticDirectory::new());
        let user = Uuid::new_v4();
        assert_eq!(call(app, Some(format!("Bearer {user}"))).await.0, StatusCode::OK);
    }

    #[test]
    fn malformed_user_id_is_rejected() {
        assert!(parse_bearer_token("not-a-uuid:s3cret", Some("s3cret")).is_err());
        assert!(parse_bearer_token("not-a-uuid", None).is_err());
    }
}
