//! The external wallet capability exposed by the host environment.

use crate::certificate::RelayedCallResponse;
use crate::challenge::error::WalletError;
use crate::principal::Principal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallet families a login can be performed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletFamily {
    /// Ethereum-style wallets signing with secp256k1 (`personal_sign`).
    Evm,
    /// Arweave wallets signing with their RSA owner key.
    Arweave,
    /// IC-native signers (Oisy) that relay canister calls instead of signing.
    IcSigner,
}

impl fmt::Display for WalletFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletFamily::Evm => write!(f, "evm"),
            WalletFamily::Arweave => write!(f, "arweave"),
            WalletFamily::IcSigner => write!(f, "ic_signer"),
        }
    }
}

/// Account descriptor returned by [`ExternalWallet`] on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub family: WalletFamily,
    /// Family-specific address: hex for EVM, base64url for Arweave,
    /// principal text for IC signers.
    pub address: String,
    /// Owner public key, when the wallet exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
}

/// A canister call the wallet is asked to submit and relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanisterCall {
    pub canister_id: Principal,
    pub method: String,
    pub arg: Vec<u8>,
    pub sender: Principal,
}

/// Opaque wallet handle. Implementations own the popup/iframe transport.
#[async_trait]
pub trait ExternalWallet: Send + Sync {
    fn family(&self) -> WalletFamily;

    async fn get_address(&self) -> Result<String, WalletError>;

    async fn get_public_key(&self) -> Result<Option<Vec<u8>>, WalletError>;

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, WalletError>;

    /// Submit `call` and relay back the certificate and content map.
    ///
    /// Only relaying signers implement this.
    async fn call(&self, call: &CanisterCall) -> Result<RelayedCallResponse, WalletError> {
        Err(WalletError::CallFailed(format!(
            "{} wallets cannot relay {}",
            self.family(),
            call.method
        )))
    }
}
