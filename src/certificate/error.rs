//! Error types for envelope decoding and certificate verification.

use thiserror::Error;

/// Errors that can occur while verifying a relayed call.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Content map does not match the issued call: {field} differs")]
    ContentMapMismatch { field: &'static str },

    #[error("Request id {request_id} not present in certificate")]
    RequestIdMismatch { request_id: String },

    #[error("Malformed certificate: {0}")]
    Malformed(String),

    #[error("Certificate is stale: issued at {time} ns, now {now} ns, max age {max_age_ns} ns")]
    Expired { time: u64, now: u64, max_age_ns: u64 },

    #[error("Certificate time {time} ns is too far ahead of local time {now} ns")]
    TimeInFuture { time: u64, now: u64 },

    #[error("Certificate carries no time, freshness cannot be established")]
    MissingTime,

    #[error("Invalid certificate signature: {0}")]
    SignatureInvalid(String),

    #[error("Certificate tree does not hash to the signed root {computed_root}")]
    TreeHashMismatch { computed_root: String },

    #[error("Invalid subnet delegation: {0}")]
    DelegationInvalid(String),

    #[error("Canister {canister_id} is outside the delegated subnet's ranges")]
    CanisterNotInRange { canister_id: String },

    #[error("Invalid root key: {0}")]
    InvalidRootKey(String),

    #[error("Reply missing: {0}")]
    ReplyMissing(String),

    #[error("Call rejected with code {code}: {message}")]
    CallRejected { code: u64, message: String },

    #[error("Unexpected request status: {0}")]
    UnexpectedStatus(String),

    #[error("Failed to decode reply: {0}")]
    ReplyDecode(String),
}
