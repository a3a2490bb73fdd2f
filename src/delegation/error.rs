//! Error types for delegation chain construction.

use thiserror::Error;

/// Reasons a delegation or chain is rejected.
#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("Delegation targets key {actual}, expected session key {expected}")]
    KeyMismatch { expected: String, actual: String },

    #[error("Delegation expired at {expiration} ns, now {now} ns")]
    Expired { expiration: u64, now: u64 },

    #[error("Invalid delegation signature: {reason}")]
    SignatureInvalid { reason: String },

    #[error("Unsupported public key type for delegation signer")]
    UnsupportedKeyType,

    #[error("No verifier registered for {0:?} keys")]
    VerifierMissing(crate::delegation::KeyType),

    #[error("Delegation chain is empty")]
    EmptyChain,

    #[error("Malformed delegation chain: {0}")]
    Malformed(String),
}
