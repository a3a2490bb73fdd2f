//! Challenge/response login with external wallets.
//!
//! ```text
//! ┌────────┐ connect ┌─────────────┐ prepare_message ┌───────────┐
//! │ wallet │────────▶│ Challenge   │────────────────▶│ remote    │
//! │        │◀─sign───│ Client      │──authenticate──▶│ authority │
//! └────────┘         └─────────────┘◀─session, key───└───────────┘
//! ```
//!
//! Families plug in through [`WalletFamilyAdapter`]; the exchange itself is
//! the same for all of them.

pub mod authority;
pub mod client;
pub mod error;
pub mod family;
pub mod wallet;

pub use authority::{AuthenticatedSession, PreparedMessage, RemoteAuthority};
pub use client::ChallengeClient;
pub use error::{AuthorityError, ChallengeError, WalletError};
pub use family::{adapter_for, ArweaveAdapter, EvmAdapter, IcSignerAdapter, WalletFamilyAdapter};
pub use wallet::{CanisterCall, ExternalWallet, WalletAccount, WalletFamily};
