//! Per-family account validation and signature encoding.
//!
//! Wallet families only differ in what their accounts look like and how their
//! signatures are shaped. Everything after the signature is shared.

use crate::challenge::error::WalletError;
use crate::challenge::wallet::{WalletAccount, WalletFamily};
use crate::principal::Principal;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Length of an EVM `r || s || v` signature.
const EVM_SIGNATURE_LEN: usize = 65;
const EVM_ADDRESS_LEN: usize = 20;

pub trait WalletFamilyAdapter: Send + Sync {
    fn family(&self) -> WalletFamily;

    /// Reject account descriptors that cannot belong to this family.
    fn validate_account(&self, account: &WalletAccount) -> Result<(), WalletError>;

    /// Shape a raw wallet signature the way the authority expects it.
    fn encode_signature(&self, signature: Vec<u8>) -> Result<Vec<u8>, WalletError>;

    /// Whether logins go through message signing (false for relaying signers).
    fn signs_messages(&self) -> bool {
        true
    }
}

pub fn adapter_for(family: WalletFamily) -> Box<dyn WalletFamilyAdapter> {
    match family {
        WalletFamily::Evm => Box::new(EvmAdapter),
        WalletFamily::Arweave => Box::new(ArweaveAdapter),
        WalletFamily::IcSigner => Box::new(IcSignerAdapter),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvmAdapter;

impl WalletFamilyAdapter for EvmAdapter {
    fn family(&self) -> WalletFamily {
        WalletFamily::Evm
    }

    fn validate_account(&self, account: &WalletAccount) -> Result<(), WalletError> {
        let hex_part = account
            .address
            .strip_prefix("0x")
            .ok_or_else(|| WalletError::InvalidAccount("EVM address lacks 0x prefix".to_string()))?;
        match hex::decode(hex_part) {
            Ok(bytes) if bytes.len() == EVM_ADDRESS_LEN => Ok(()),
            _ => Err(WalletError::InvalidAccount(format!(
                "{} is not a 20-byte hex address",
                account.address
            ))),
        }
    }

    fn encode_signature(&self, mut signature: Vec<u8>) -> Result<Vec<u8>, WalletError> {
        if signature.len() != EVM_SIGNATURE_LEN {
            return Err(WalletError::SigningFailed(format!(
                "expected {} signature bytes, got {}",
                EVM_SIGNATURE_LEN,
                signature.len()
            )));
        }
        // Some wallets report the recovery id as 0/1 instead of 27/28
        match signature[64] {
            0 | 1 => signature[64] += 27,
            27 | 28 => {}
            v => {
                return Err(WalletError::SigningFailed(format!(
                    "invalid recovery id {}",
                    v
                )))
            }
        }
        Ok(signature)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArweaveAdapter;

impl ArweaveAdapter {
    /// Arweave addresses are `base64url(sha256(owner))`.
    pub fn address_of(owner: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(owner))
    }
}

impl WalletFamilyAdapter for ArweaveAdapter {
    fn family(&self) -> WalletFamily {
        WalletFamily::Arweave
    }

    fn validate_account(&self, account: &WalletAccount) -> Result<(), WalletError> {
        let owner = account
            .public_key
            .as_deref()
            .filter(|owner| !owner.is_empty())
            .ok_or_else(|| WalletError::InvalidAccount("Arweave wallet exposed no owner key".to_string()))?;
        if Self::address_of(owner) != account.address {
            return Err(WalletError::InvalidAccount(format!(
                "address {} does not match owner key",
                account.address
            )));
        }
        Ok(())
    }

    fn encode_signature(&self, signature: Vec<u8>) -> Result<Vec<u8>, WalletError> {
        if signature.is_empty() {
            return Err(WalletError::SigningFailed("empty signature".to_string()));
        }
        Ok(signature)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IcSignerAdapter;

impl WalletFamilyAdapter for IcSignerAdapter {
    fn family(&self) -> WalletFamily {
        WalletFamily::IcSigner
    }

    fn validate_account(&self, account: &WalletAccount) -> Result<(), WalletError> {
        let principal = Principal::from_text(&account.address)
            .map_err(|e| WalletError::InvalidAccount(e.to_string()))?;
        if principal.is_anonymous() {
            return Err(WalletError::InvalidAccount(
                "signer returned the anonymous principal".to_string(),
            ));
        }
        if let Some(public_key) = &account.public_key {
            if Principal::self_authenticating(public_key) != principal {
                return Err(WalletError::InvalidAccount(format!(
                    "principal {} is not derived from the signer's key",
                    principal
                )));
            }
        }
        Ok(())
    }

    fn encode_signature(&self, _signature: Vec<u8>) -> Result<Vec<u8>, WalletError> {
        Err(WalletError::SigningFailed(
            "IC signers relay calls instead of signing messages".to_string(),
        ))
    }

    fn signs_messages(&self) -> bool {
        false
    }
}
