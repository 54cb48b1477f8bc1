//! # Engine Configuration
//!
//! Loaded from the environment with typed errors; an unparseable value is
//! an error, never a silent default.
//!
//! | Variable                     | Default | Meaning                                     |
//! |------------------------------|---------|---------------------------------------------|
//! | `ESCROW_PLATFORM_FEE_BPS`    | `250`   | Fee withheld on queue items, basis points   |
//! | `ESCROW_ESCALATION_PRIORITY` | `high`  | Queue priority for escalated disputes       |

use thiserror::Error;

use escrow_state::Priority;

/// Env var holding the platform fee in basis points.
pub const FEE_BPS_VAR: &str = "ESCROW_PLATFORM_FEE_BPS";
/// Env var holding the escalation queue priority.
pub const ESCALATION_PRIORITY_VAR: &str = "ESCROW_ESCALATION_PRIORITY";

/// Configuration could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Fee was not an integer in `0..=10000`.
    #[error("ESCROW_PLATFORM_FEE_BPS must be an integer between 0 and 10000, got {0:?}")]
    InvalidFeeBps(String),

    /// Priority was not one of urgent/high/normal/low.
    #[error("ESCROW_ESCALATION_PRIORITY must be one of urgent, high, normal, low; got {0:?}")]
    InvalidPriority(String),
}

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Fee withheld from queue item totals, in basis points.
    pub platform_fee_bps: u32,
    /// Priority of queue items created by escalation.
    pub escalation_priority: Priority,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 250,
            escalation_priority: Priority::High,
        }
    }
}

impl EngineConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(FEE_BPS_VAR) {
            config.platform_fee_bps = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|bps| *bps <= 10_000)
                .ok_or(ConfigError::InvalidFeeBps(raw))?;
        }
        if let Some(raw) = lookup(ESCALATION_PRIORITY_VAR) {
            config.escalation_priority = raw
                .parse::<Priority>()
                .map_err(|_| ConfigError::InvalidPriority(raw))?;
        }
        Ok(config)
    }
}
