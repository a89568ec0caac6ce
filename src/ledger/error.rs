//! Error taxonomy for the ledger sync core
//!
//! Every failure a caller can act on gets its own variant; transport and
//! storage failures pass through so diagnostics keep the original cause.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The refresh credential was rejected. A human must re-authorize;
    /// callers must not retry automatically.
    #[error("reauthorization required: refresh credential rejected for realm {realm_id}")]
    ReauthorizationRequired { realm_id: String },

    /// Any non-2xx from the remote accounting system, surfaced verbatim.
    #[error("remote api error {status}: {body}")]
    RemoteApi { status: u16, body: String },

    /// No active commission mapping configured for the broker.
    #[error("no active commission mapping for broker '{broker}'")]
    PolicyMissing { broker: String },

    /// The remote entity exists but is inactive and could not be
    /// reactivated. Requires manual intervention in the remote system.
    #[error("entity '{name}' is inactive and reactivation failed: {reason}")]
    ReactivationFailed { name: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    /// Stable machine-readable tag for API responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::ReauthorizationRequired { .. } => "reauthorization_required",
            LedgerError::RemoteApi { .. } => "remote_api_error",
            LedgerError::PolicyMissing { .. } => "policy_missing",
            LedgerError::ReactivationFailed { .. } => "reactivation_failed",
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Transport(_) => "transport_error",
            LedgerError::Storage(_) => "storage_error",
            LedgerError::Other(_) => "internal_error",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
