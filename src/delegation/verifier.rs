//! Signature verification for delegation signers.
//!
//! The delegating identity may be any key type the remote authority issues
//! delegations from. ECDSA P-256 is verified here; everything else (BLS,
//! canister signatures, Ed25519) is handed to an external [`SignatureVerifier`]
//! registered for that key type.

use crate::delegation::error::DelegationError;
use log::{debug, warn};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use std::collections::HashMap;
use std::sync::Arc;

// DER-encoded algorithm identifiers, matched inside SubjectPublicKeyInfo.
const OID_EC_PUBLIC_KEY: &[u8] = &[0x06, 0x07, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_SECP256K1: &[u8] = &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x0A];
const OID_ED25519: &[u8] = &[0x06, 0x03, 0x2B, 0x65, 0x70];
const OID_BLS12_381: &[u8] = &[
    0x06, 0x0D, 0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xDC, 0x7C, 0x05, 0x03, 0x01, 0x02, 0x01,
];
const OID_CANISTER_SIGNATURE: &[u8] = &[
    0x06, 0x0A, 0x2B, 0x06, 0x01, 0x04, 0x01, 0x83, 0xB8, 0x43, 0x01, 0x02,
];

/// Identity key types a delegation can be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    EcdsaP256,
    EcdsaSecp256k1,
    Ed25519,
    Bls12381,
    CanisterSignature,
}

impl KeyType {
    /// Detect the key type from the algorithm identifier of a DER public key.
    pub fn detect(public_key_der: &[u8]) -> Option<KeyType> {
        let algorithm = algorithm_identifier(public_key_der)?;
        let contains = |oid: &[u8]| algorithm.windows(oid.len()).any(|w| w == oid);

        if contains(OID_CANISTER_SIGNATURE) {
            Some(KeyType::CanisterSignature)
        } else if contains(OID_BLS12_381) {
            Some(KeyType::Bls12381)
        } else if contains(OID_ED25519) {
            Some(KeyType::Ed25519)
        } else if contains(OID_EC_PUBLIC_KEY) && contains(OID_PRIME256V1) {
            Some(KeyType::EcdsaP256)
        } else if contains(OID_EC_PUBLIC_KEY) && contains(OID_SECP256K1) {
            Some(KeyType::EcdsaSecp256k1)
        } else {
            None
        }
    }
}

/// The AlgorithmIdentifier SEQUENCE of a SubjectPublicKeyInfo.
fn algorithm_identifier(der: &[u8]) -> Option<&[u8]> {
    let (outer, _) = der_sequence(der)?;
    let (algorithm, _) = der_sequence(outer)?;
    Some(algorithm)
}

/// Split a leading DER SEQUENCE into its contents and the remaining bytes.
fn der_sequence(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&tag, rest) = input.split_first()?;
    if tag != 0x30 {
        return None;
    }
    let (&first, rest) = rest.split_first()?;
    let (len, rest) = match first {
        0x00..=0x7F => (usize::from(first), rest),
        0x81 => {
            let (&len, rest) = rest.split_first()?;
            (usize::from(len), rest)
        }
        0x82 => {
            let bytes = rest.get(..2)?;
            (usize::from(bytes[0]) << 8 | usize::from(bytes[1]), &rest[2..])
        }
        _ => return None,
    };
    (rest.len() >= len).then(|| rest.split_at(len))
}

/// External signature verification collaborator.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` by `public_key_der` over `message`.
    fn verify(&self, public_key_der: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String>;
}

/// In-crate ECDSA P-256 (SHA-256) verification.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaP256Verifier;

impl SignatureVerifier for EcdsaP256Verifier {
    fn verify(&self, public_key_der: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String> {
        let verifying_key = VerifyingKey::from_public_key_der(public_key_der)
            .map_err(|e| format!("Invalid P-256 public key: {}", e))?;
        let sig = Signature::from_slice(signature)
            .map_err(|e| format!("Invalid ES256 signature format: {}", e))?;
        verifying_key
            .verify(message, &sig)
            .map_err(|_| "Signature does not match public key".to_string())
    }
}

/// Routes delegation signatures to the verifier for the signer's key type.
#[derive(Clone)]
pub struct DelegationVerifier {
    verifiers: HashMap<KeyType, Arc<dyn SignatureVerifier>>,
}

impl DelegationVerifier {
    /// Verifier with only the built-in ECDSA P-256 support.
    pub fn new() -> Self {
        let mut verifiers: HashMap<KeyType, Arc<dyn SignatureVerifier>> = HashMap::new();
        verifiers.insert(KeyType::EcdsaP256, Arc::new(EcdsaP256Verifier));
        Self { verifiers }
    }

    /// Register (or replace) the verifier for a key type.
    pub fn with_verifier(mut self, key_type: KeyType, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifiers.insert(key_type, verifier);
        self
    }

    /// Verify a signature by `signer_der` over `message`.
    pub fn verify(
        &self,
        signer_der: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), DelegationError> {
        let key_type = KeyType::detect(signer_der).ok_or(DelegationError::UnsupportedKeyType)?;
        let verifier = self
            .verifiers
            .get(&key_type)
            .ok_or(DelegationError::VerifierMissing(key_type))?;

        debug!("Verifying {:?} delegation signature", key_type);
        verifier
            .verify(signer_der, message, signature)
            .map_err(|reason| {
                warn!("{:?} delegation signature rejected: {}", key_type, reason);
                DelegationError::SignatureInvalid { reason }
            })
    }
}

impl Default for DelegationVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DelegationVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationVerifier")
            .field("key_types", &self.verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}
