//! Delegated external-wallet authentication.
//!
//! A user signs in with an external wallet (EVM, Arweave or an IC-native
//! signer). The result is a short-lived session key plus a delegation chain
//! that lets it act for the user's long-lived identity. For signers that
//! relay raw canister calls, the relayed result is only trusted after its
//! certificate has been verified against a pinned root key.
//!
//! ```text
//! SiwxProvider ──▶ ChallengeClient ──▶ remote authority
//!      │                 │
//!      │                 └──(relaying signers)──▶ certificate verification
//!      ▼
//! DelegationChainBuilder ──▶ SessionStore ──▶ KeyValueStorage
//! ```

pub mod certificate;
pub mod challenge;
pub mod config;
pub mod delegation;
pub mod error;
pub mod principal;
pub mod provider;
pub mod request_id;
pub mod session;
pub mod session_key;
pub mod time;

pub use config::SiwxConfig;
pub use error::AuthError;
pub use principal::Principal;
pub use provider::{LoginState, SiwxProvider};
pub use request_id::RequestId;
pub use session::{Identity, SessionStore};
pub use session_key::SessionKeyPair;
