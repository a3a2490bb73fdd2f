//! Error types for wallet and remote-authority interaction.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by (or about) the external wallet.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("No compatible wallet available: {0}")]
    Unavailable(String),

    #[error("User rejected the wallet request")]
    UserRejected,

    #[error("Wallet returned an invalid account: {0}")]
    InvalidAccount(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Relayed call failed: {0}")]
    CallFailed(String),
}

/// Failures talking to the remote authority.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("Authority unreachable: {0}")]
    Unreachable(String),

    #[error("Authority declined: {0}")]
    Rejected(String),

    #[error("Malformed authority response: {0}")]
    Malformed(String),

    #[error("Authority did not answer within {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by a challenge/response exchange.
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}
