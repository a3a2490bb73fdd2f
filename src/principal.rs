//! Principals: the identifiers callers and canisters are known by.
//!
//! The textual form is `base32(crc32(bytes) || bytes)` in lowercase without
//! padding, grouped in fives with dashes, e.g. `rrkah-fqaaa-aaaaa-aaaaq-cai`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use std::fmt;
use std::str::FromStr;

/// Suffix byte marking a principal derived from a public key.
const SELF_AUTHENTICATING_SUFFIX: u8 = 0x02;

/// Single-byte principal used for unauthenticated calls.
const ANONYMOUS_TAG: u8 = 0x04;

/// Maximum principal length in bytes.
pub const MAX_PRINCIPAL_LEN: usize = 29;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrincipalError {
    #[error("Principal longer than {MAX_PRINCIPAL_LEN} bytes")]
    TooLong,

    #[error("Invalid principal text: {0}")]
    InvalidText(String),

    #[error("Principal checksum mismatch")]
    ChecksumMismatch,
}

/// An opaque principal identifier (at most 29 bytes).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal(#[serde(with = "serde_bytes")] Vec<u8>);

impl Principal {
    /// Wrap raw principal bytes, rejecting over-long values.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        (bytes.len() <= MAX_PRINCIPAL_LEN).then(|| Self(bytes.to_vec()))
    }

    /// Principal of a DER-encoded public key: `sha224(der) || 0x02`.
    pub fn self_authenticating(public_key_der: &[u8]) -> Self {
        let mut bytes = Sha224::digest(public_key_der).to_vec();
        bytes.push(SELF_AUTHENTICATING_SUFFIX);
        Self(bytes)
    }

    pub fn anonymous() -> Self {
        Self(vec![ANONYMOUS_TAG])
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == [ANONYMOUS_TAG]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> String {
        let mut payload = crc32fast::hash(&self.0).to_be_bytes().to_vec();
        payload.extend_from_slice(&self.0);
        let encoded = base32_encode(&payload);

        let mut text = String::with_capacity(encoded.len() + encoded.len() / 5);
        for (i, c) in encoded.chars().enumerate() {
            if i > 0 && i % 5 == 0 {
                text.push('-');
            }
            text.push(c);
        }
        text
    }

    pub fn from_text(text: &str) -> Result<Self, PrincipalError> {
        let compact: String = text
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let payload = base32_decode(&compact)
            .ok_or_else(|| PrincipalError::InvalidText(text.to_string()))?;
        if payload.len() < 4 {
            return Err(PrincipalError::InvalidText(text.to_string()));
        }

        let (checksum, bytes) = payload.split_at(4);
        if bytes.len() > MAX_PRINCIPAL_LEN {
            return Err(PrincipalError::TooLong);
        }
        if checksum != crc32fast::hash(bytes).to_be_bytes() {
            return Err(PrincipalError::ChecksumMismatch);
        }

        let principal = Self(bytes.to_vec());
        // Only the canonical grouping is accepted
        if principal.to_text() != text.to_ascii_lowercase() {
            return Err(PrincipalError::InvalidText(text.to_string()));
        }
        Ok(principal)
    }
}

impl FromStr for Principal {
    type Err = PrincipalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.to_text())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in text.bytes() {
        let value = BASE32_ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_authenticating_layout() {
        let principal = Principal::self_authenticating(b"some der key");
        assert_eq!(principal.as_slice().len(), 29);
        assert_eq!(principal.as_slice()[28], 0x02);
        assert!(!principal.is_anonymous());
    }

    #[test]
    fn test_from_slice_rejects_long_input() {
        assert!(Principal::from_slice(&[0u8; 30]).is_none());
        assert!(Principal::from_slice(&[0u8; 10]).is_some());
        assert!(Principal::anonymous().is_anonymous());
    }

    #[test]
    fn test_known_text_forms() {
        assert_eq!(Principal::anonymous().to_text(), "2vxsx-fae");
        assert_eq!(Principal::from_slice(&[]).unwrap().to_text(), "aaaaa-aa");
        let canister = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]).unwrap();
        assert_eq!(canister.to_text(), "rrkah-fqaaa-aaaaa-aaaaq-cai");
        assert_eq!(Principal::from_text("rrkah-fqaaa-aaaaa-aaaaq-cai").unwrap(), canister);
    }

    #[test]
    fn test_from_text_rejects_bad_checksum_and_grouping() {
        assert_eq!(
            Principal::from_text("rrkah-fqaaa-aaaaa-aaaaq-caa"),
            Err(PrincipalError::ChecksumMismatch)
        );
        assert!(Principal::from_text("rrkahfqaaa-aaaaa-aaaaq-cai").is_err());
        assert!(Principal::from_text("not!base32").is_err());
    }

    #[test]
    fn test_text_roundtrip_self_authenticating() {
        let principal = Principal::self_authenticating(b"wallet");
        assert_eq!(Principal::from_text(&principal.to_text()).unwrap(), principal);
    }
}
