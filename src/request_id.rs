//! Representation-independent hashing.
//!
//! A structured value is hashed field by field so that two encodings of the
//! same request (CBOR, JSON, field order) always produce the same 32 bytes:
//!
//! ```text
//! hash(map) = SHA256( sort( SHA256(name) || hash(value) for each field ) joined )
//! ```
//!
//! Blobs and text hash their raw bytes, naturals hash their unsigned LEB128
//! encoding and arrays hash the concatenation of their element hashes.

use sha2::{Digest, Sha256};
use std::fmt;

/// Domain separator prepended to a request id before it is signed.
pub const IC_REQUEST_DOMAIN_SEPARATOR: &[u8] = b"\x0Aic-request";

/// Domain separator prepended to a delegation hash before it is signed.
pub const IC_REQUEST_AUTH_DELEGATION_DOMAIN_SEPARATOR: &[u8] = b"\x1Aic-request-auth-delegation";

/// Deterministic 32-byte identifier of a request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId([u8; 32]);

impl RequestId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The bytes a sender actually signs: `"\x0Aic-request" || id`.
    pub fn signable(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(IC_REQUEST_DOMAIN_SEPARATOR.len() + 32);
        message.extend_from_slice(IC_REQUEST_DOMAIN_SEPARATOR);
        message.extend_from_slice(&self.0);
        message
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", hex::encode(self.0))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A value that can take part in a representation-independent hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashValue {
    Bytes(Vec<u8>),
    Text(String),
    Nat(u64),
    Array(Vec<HashValue>),
    Map(Vec<(String, HashValue)>),
}

impl HashValue {
    pub fn hash(&self) -> [u8; 32] {
        match self {
            HashValue::Bytes(bytes) => Sha256::digest(bytes).into(),
            HashValue::Text(text) => Sha256::digest(text.as_bytes()).into(),
            HashValue::Nat(n) => Sha256::digest(leb128_encode(*n)).into(),
            HashValue::Array(items) => {
                let mut hasher = Sha256::new();
                for item in items {
                    hasher.update(item.hash());
                }
                hasher.finalize().into()
            }
            HashValue::Map(fields) => hash_of_map(fields.iter().map(|(k, v)| (k.as_str(), v))),
        }
    }
}

/// Hash a field map. Insertion order never affects the result.
pub fn hash_of_map<'a, I>(fields: I) -> [u8; 32]
where
    I: IntoIterator<Item = (&'a str, &'a HashValue)>,
{
    let mut pairs: Vec<[u8; 64]> = fields
        .into_iter()
        .map(|(name, value)| {
            let mut pair = [0u8; 64];
            pair[..32].copy_from_slice(&Sha256::digest(name.as_bytes()));
            pair[32..].copy_from_slice(&value.hash());
            pair
        })
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for pair in &pairs {
        hasher.update(pair);
    }
    hasher.finalize().into()
}

/// Unsigned LEB128 encoding.
pub fn leb128_encode(mut n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Decode an unsigned LEB128 value that must span the whole input.
pub fn leb128_decode(bytes: &[u8]) -> Option<u64> {
    let mut result: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let shift = 7 * i as u32;
        if shift >= 64 {
            return None;
        }
        let chunk = u64::from(byte & 0x7f);
        if shift > 0 && chunk >> (64 - shift) != 0 {
            return None;
        }
        result |= chunk << shift;
        if byte & 0x80 == 0 {
            return (i + 1 == bytes.len()).then_some(result);
        }
    }
    None
}
