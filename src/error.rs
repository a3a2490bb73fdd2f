//! Crate-wide login error taxonomy.
//!
//! Components report their own error types; the provider surfaces all of
//! them as [`AuthError`] and recovers none automatically.

use crate::certificate::CertificateError;
use crate::challenge::{AuthorityError, ChallengeError, WalletError, WalletFamily};
use crate::delegation::DelegationError;
use crate::session::StorageError;
use crate::session_key::KeyError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("User rejected the request")]
    UserRejected,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Authority unreachable: {0}")]
    AuthorityUnreachable(String),

    #[error("Authority declined: {0}")]
    AuthorityRejected(String),

    #[error("Malformed authority response: {0}")]
    AuthorityMalformed(String),

    #[error("Authority timed out after {0:?}")]
    AuthorityTimeout(Duration),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid delegation: {0}")]
    InvalidDelegation(#[from] DelegationError),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Content map mismatch in {0}")]
    ContentMapMismatch(String),

    #[error("Request id mismatch: {0}")]
    RequestIdMismatch(String),

    #[error("Certificate expired: {0}")]
    CertificateExpired(String),

    #[error("Certificate signature invalid: {0}")]
    CertificateSignatureInvalid(String),

    #[error("Certificate tree hash mismatch: {0}")]
    CertificateTreeHashMismatch(String),

    #[error("Reply missing: {0}")]
    ReplyMissing(String),

    #[error("Call rejected with code {code}: {message}")]
    CallRejected { code: u64, message: String },

    #[error("Unexpected request status: {0}")]
    UnexpectedStatus(String),

    #[error("Could not decode reply: {0}")]
    ReplyDecode(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    #[error("Session key error: {0}")]
    SessionKey(#[from] KeyError),

    #[error("A login is already in progress")]
    AlreadyInProgress,

    #[error("Login cancelled")]
    Cancelled,

    #[error("No wallet configured for {0}")]
    UnsupportedFamily(WalletFamily),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<WalletError> for AuthError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::Unavailable(reason) => AuthError::WalletUnavailable(reason),
            WalletError::InvalidAccount(reason) => AuthError::WalletUnavailable(reason),
            WalletError::UserRejected => AuthError::UserRejected,
            WalletError::SigningFailed(reason) => AuthError::SigningFailed(reason),
            WalletError::CallFailed(reason) => AuthError::SigningFailed(reason),
        }
    }
}

impl From<AuthorityError> for AuthError {
    fn from(e: AuthorityError) -> Self {
        match e {
            AuthorityError::Unreachable(reason) => AuthError::AuthorityUnreachable(reason),
            AuthorityError::Rejected(reason) => AuthError::AuthorityRejected(reason),
            AuthorityError::Malformed(reason) => AuthError::AuthorityMalformed(reason),
            AuthorityError::Timeout(limit) => AuthError::AuthorityTimeout(limit),
        }
    }
}

impl From<ChallengeError> for AuthError {
    fn from(e: ChallengeError) -> Self {
        match e {
            ChallengeError::Wallet(e) => e.into(),
            ChallengeError::Authority(e) => e.into(),
            ChallengeError::AuthenticationFailed(reason) => AuthError::AuthenticationFailed(reason),
        }
    }
}

impl From<CertificateError> for AuthError {
    fn from(e: CertificateError) -> Self {
        let reason = e.to_string();
        match e {
            CertificateError::MalformedEnvelope(reason) => AuthError::MalformedEnvelope(reason),
            CertificateError::ContentMapMismatch { field } => {
                AuthError::ContentMapMismatch(field.to_string())
            }
            CertificateError::RequestIdMismatch { request_id } => {
                AuthError::RequestIdMismatch(request_id)
            }
            CertificateError::Expired { .. }
            | CertificateError::TimeInFuture { .. }
            | CertificateError::MissingTime => AuthError::CertificateExpired(reason),
            CertificateError::TreeHashMismatch { computed_root } => {
                AuthError::CertificateTreeHashMismatch(computed_root)
            }
            CertificateError::Malformed(_)
            | CertificateError::SignatureInvalid(_)
            | CertificateError::DelegationInvalid(_)
            | CertificateError::CanisterNotInRange { .. } => {
                AuthError::CertificateSignatureInvalid(reason)
            }
            CertificateError::InvalidRootKey(reason) => AuthError::Configuration(reason),
            CertificateError::ReplyMissing(reason) => AuthError::ReplyMissing(reason),
            CertificateError::CallRejected { code, message } => {
                AuthError::CallRejected { code, message }
            }
            CertificateError::UnexpectedStatus(status) => AuthError::UnexpectedStatus(status),
            CertificateError::ReplyDecode(reason) => AuthError::ReplyDecode(reason),
        }
    }
}
