//! Error taxonomy for boundaries that are allowed to fail visibly.
//!
//! Agent-local failures never reach here — each capability trait absorbs
//! its own failure into a typed degraded output (see [`crate::agent`]).
//! `CoreError` exists only for the two propagation boundaries the design
//! allows: malformed request envelopes and genuine internal faults.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    ClientInvalid(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ClientInvalid(_) => "client_invalid",
            CoreError::Internal(_) => "internal_error",
        }
    }
}
