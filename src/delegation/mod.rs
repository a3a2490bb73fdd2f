//! Delegation chains.
//!
//! A delegation chain lets a short-lived session key act on behalf of a
//! long-lived identity whose private key never leaves the external wallet or
//! the remote authority.
//!
//! ```text
//! long-lived key ──signs──▶ Delegation { pubkey: session key, expiration, targets }
//!                                      │
//!                                      ▼
//!                         session key signs requests
//! ```

pub mod builder;
pub mod error;
pub mod types;
pub mod verifier;

pub use builder::DelegationChainBuilder;
pub use error::DelegationError;
pub use types::{Delegation, DelegationChain, SignedDelegation};
pub use verifier::{DelegationVerifier, EcdsaP256Verifier, KeyType, SignatureVerifier};
