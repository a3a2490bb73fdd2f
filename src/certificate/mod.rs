//! Light-client verification of relayed calls.
//!
//! When a wallet signer submits a call on the user's behalf and relays the
//! result back, nothing it says can be trusted. This module checks the
//! relayed content map against the issued call, recomputes the request id and
//! proves the reply from a signed certificate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────────────┐   ┌───────────┐
//! │ decode_      │──▶│ request_   │──▶│ CertificateVerifier│──▶│ lookup_   │
//! │ envelope     │   │ id_of      │   │ (BLS collaborator) │   │ reply     │
//! └──────────────┘   └────────────┘   └───────────────────┘   └───────────┘
//!        │
//!        ▼
//!  match_envelope (cheap check first)
//! ```
//!
//! Verification is synchronous and performs no I/O.

pub mod cbor;
#[allow(clippy::module_inception)]
pub mod certificate;
pub mod envelope;
pub mod error;
pub mod reply;
pub mod tree;

pub use certificate::{
    bls_key_to_der, encode_canister_ranges, extract_bls_key, BlsVerification, BlsVerifier,
    Certificate, CertificateDelegation, CertificateVerifier, VerifiedCertificate,
};
pub use envelope::{decode_envelope, match_envelope, request_id_of, CallRequestFields, ExpectedCall};
pub use error::CertificateError;
pub use reply::{lookup_reply, verify_and_decode, verify_call_response, RelayedCallResponse};
pub use tree::{HashTree, LookupResult};
