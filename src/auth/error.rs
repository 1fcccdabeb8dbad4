//! Error types for the auth module.

use crate::error::ApiError;

/// Errors raised by the credential store and the session manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Nothing is stored under the key.
    #[error("Credential not found: {0}")]
    NotFound(String),

    /// The stored value could not be decoded.
    #[error("Invalid credential data: {0}")]
    InvalidData(String),

    /// The backing store rejected a write.
    #[error("Credential store write failed: {0}")]
    StoreWriteFailure(String),

    /// The access token is stored but past its expiry.
    #[error("Access token expired")]
    Expired,

    /// Refused to save an empty token.
    #[error("Invalid token")]
    InvalidToken,

    /// The backend itself could not be reached.
    #[error("Credential backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by sign-in and logout.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Display name must be at least {min} characters")]
    InvalidDisplayName { min: usize },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Why a shared refresh did not produce new tokens.
///
/// Cloneable so one outcome can be handed to every caller waiting on the
/// same refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("Logout in progress")]
    LoggingOut,

    #[error("No refresh token available: {0}")]
    MissingRefreshToken(String),

    #[error("Refresh rejected: {0}")]
    Rejected(String),

    #[error("Failed to persist refreshed tokens: {0}")]
    Store(String),

    #[error("Refresh task aborted")]
    Aborted,
}
