//! Ephemeral session keys with automatic zeroization.
//!
//! A fresh P-256 keypair is generated for every login attempt. The secret
//! scalar lives inside [`secrecy::Secret`] and is wiped when the keypair is
//! dropped, which is what happens to the key of any attempt that fails or is
//! cancelled.

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use std::fmt;

/// Error type for session key operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    #[error("Invalid key size: expected {expected}, got {got}")]
    InvalidKeySize { expected: usize, got: usize },

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Cryptographic operation failed: {0}")]
    CryptoError(String),
}

/// Attempts at drawing a valid scalar before giving up. A random 32-byte
/// string is out of range with probability ~2^-32.
const MAX_SCALAR_ATTEMPTS: usize = 8;

/// Ephemeral ECDSA P-256 keypair owned by a single login attempt or session.
pub struct SessionKeyPair {
    secret: Secret<[u8; 32]>,
    public_key_der: Vec<u8>,
}

impl SessionKeyPair {
    /// Generate a fresh keypair from the OS entropy source.
    pub fn generate() -> Result<Self, KeyError> {
        for _ in 0..MAX_SCALAR_ATTEMPTS {
            let mut candidate = [0u8; 32];
            OsRng
                .try_fill_bytes(&mut candidate)
                .map_err(|e| KeyError::Entropy(e.to_string()))?;
            let keypair = Self::from_secret_bytes(&candidate);
            candidate.iter_mut().for_each(|b| *b = 0);
            match keypair {
                Ok(keypair) => return Ok(keypair),
                Err(KeyError::InvalidFormat(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(KeyError::Entropy(
            "could not draw a valid P-256 scalar".to_string(),
        ))
    }

    /// Restore a keypair from its 32-byte secret scalar.
    ///
    /// # Security
    /// The input bytes are copied and the original should be zeroized by the caller.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidKeySize {
                expected: 32,
                got: bytes.len(),
            });
        }

        let signing_key =
            SigningKey::from_slice(bytes).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        let public_key_der = signing_key
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| KeyError::CryptoError(e.to_string()))?
            .as_bytes()
            .to_vec();

        let mut key_array = [0u8; 32];
        key_array.copy_from_slice(bytes);

        Ok(Self {
            secret: Secret::new(key_array),
            public_key_der,
        })
    }

    /// DER-encoded SubjectPublicKeyInfo of the session public key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Sign `message` (SHA-256 ECDSA), returning the 64-byte `r || s` form.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        let signing_key = self.signing_key()?;
        let signature: Signature = signing_key
            .try_sign(message)
            .map_err(|e| KeyError::CryptoError(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    /// Raw secret scalar, exposed only for persisting an active session.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.secret.expose_secret()
    }

    fn signing_key(&self) -> Result<SigningKey, KeyError> {
        SigningKey::from_slice(self.secret.expose_secret())
            .map_err(|e| KeyError::CryptoError(e.to_string()))
    }
}

impl fmt::Debug for SessionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyPair")
            .field("public_key_der", &hex::encode(&self.public_key_der))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
