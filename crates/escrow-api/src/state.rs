//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! AppState holds the engine and the user directory it consults. Entity
//! state lives in the engine's ledger store; handlers never cache it.

use std::sync::Arc;

use escrow_core::{UserId, UserRole};
use escrow_engine::{EngineConfig, EngineContext, EscrowEngine, StaticDirectory};
use thiserror::Error;
use uuid::Uuid;

/// Environment variable holding the listen port.
pub const PORT_VAR: &str = "PORT";
/// Environment variable holding the shared bearer secret.
pub const AUTH_TOKEN_VAR: &str = "AUTH_TOKEN";
/// Environment variable holding comma-separated admin user ids.
pub const ADMIN_IDS_VAR: &str = "ESCROW_ADMIN_IDS";

/// Invalid server configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppConfigError {
    /// `PORT` is not a valid port number.
    #[error("PORT must be a port number, got {0:?}")]
    InvalidPort(String),
    /// An entry in `ESCROW_ADMIN_IDS` is not a UUID.
    #[error("ESCROW_ADMIN_IDS entry {0:?} is not a UUID")]
    InvalidAdminId(String),
}

/// Server configuration.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AppConfig {
    /// Listen port.
    pub port: u16,
    /// Shared bearer secret. `None` disables the secret check.
    pub auth_token: Option<String>,
    /// Users seeded into the directory as admins.
    pub admin_ids: Vec<UserId>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("admin_ids", &self.admin_ids)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            admin_ids: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, AppConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppConfigError> {
        let port = match lookup(PORT_VAR) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AppConfigError::InvalidPort(raw.clone()))?,
            None => 8080,
        };
        let auth_token = lookup(AUTH_TOKEN_VAR).filter(|t| !t.is_empty());
        let admin_ids = lookup(ADMIN_IDS_VAR)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Uuid>()
                    .map(UserId::from)
                    .map_err(|_| AppConfigError::InvalidAdminId(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            port,
            auth_token,
            admin_ids,
        })
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Lifecycle services.
    pub engine: Arc<EscrowEngine>,
    /// Caller roles; also the engine's `AdminAuth`.
    pub directory: StaticDirectory,
    /// Server configuration.
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), EngineConfig::default())
    }

    /// In-memory state with the given configuration. Configured admins are
    /// seeded into the directory.
    pub fn with_config(config: AppConfig, engine_config: EngineConfig) -> Self {
        let directory = StaticDirectory::new();
        for admin in &config.admin_ids {
            directory.register(*admin, UserRole::Admin);
        }
        let ctx = EngineContext::in_memory(directory.clone()).with_config(engine_config);
        Self::from_context(ctx, directory, config)
    }

    /// State over an existing engine context. `directory` must be the
    /// context's `AdminAuth`.
    pub fn from_context(ctx: EngineContext, directory: StaticDirectory, config: AppConfig) -> Self {
        Self {
            engine: Arc::new(EscrowEngine::new(ctx)),
            directory,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
