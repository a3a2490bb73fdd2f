//! Delegations, signed delegations and delegation chains.

use crate::delegation::error::DelegationError;
use crate::principal::Principal;
use crate::request_id::{hash_of_map, HashValue, IC_REQUEST_AUTH_DELEGATION_DOMAIN_SEPARATOR};
use serde::{Deserialize, Serialize};

/// "Key `delegated_public_key` may act as the signer until `expiration`,
/// restricted to `targets` if present."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// DER-encoded public key receiving the delegation.
    #[serde(rename = "pubkey", with = "hex_serde::bytes")]
    pub delegated_public_key: Vec<u8>,

    /// Expiration in nanoseconds since the UNIX epoch.
    #[serde(with = "hex_serde::nat")]
    pub expiration: u64,

    /// Canister ids the delegation is scoped to.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_serde::principals"
    )]
    pub targets: Option<Vec<Principal>>,
}

impl Delegation {
    /// Representation-independent hash of the delegation fields.
    pub fn hash(&self) -> [u8; 32] {
        let mut fields = vec![
            ("pubkey", HashValue::Bytes(self.delegated_public_key.clone())),
            ("expiration", HashValue::Nat(self.expiration)),
        ];
        if let Some(targets) = &self.targets {
            fields.push((
                "targets",
                HashValue::Array(
                    targets
                        .iter()
                        .map(|p| HashValue::Bytes(p.as_slice().to_vec()))
                        .collect(),
                ),
            ));
        }
        hash_of_map(fields.iter().map(|(k, v)| (*k, v)))
    }

    /// Canonical bytes signed by the delegating key.
    pub fn signable(&self) -> Vec<u8> {
        let mut message = IC_REQUEST_AUTH_DELEGATION_DOMAIN_SEPARATOR.to_vec();
        message.extend_from_slice(&self.hash());
        message
    }

    pub fn is_expired(&self, now_ns: u64) -> bool {
        self.expiration <= now_ns
    }
}

/// A delegation plus the delegating key's signature over [`Delegation::signable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDelegation {
    pub delegation: Delegation,
    #[serde(with = "hex_serde::bytes")]
    pub signature: Vec<u8>,
}

/// Ordered proof linking a session key back to a long-lived identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationChain {
    /// DER-encoded long-lived public key the chain is rooted at.
    #[serde(with = "hex_serde::bytes")]
    public_key: Vec<u8>,

    delegations: Vec<SignedDelegation>,
}

impl DelegationChain {
    pub fn new(
        public_key: Vec<u8>,
        delegations: Vec<SignedDelegation>,
    ) -> Result<Self, DelegationError> {
        if delegations.is_empty() {
            return Err(DelegationError::EmptyChain);
        }
        Ok(Self {
            public_key,
            delegations,
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn delegations(&self) -> &[SignedDelegation] {
        &self.delegations
    }

    /// Key the final delegation was granted to.
    pub fn terminal_public_key(&self) -> &[u8] {
        // non-empty by construction
        self.delegations
            .last()
            .map(|d| d.delegation.delegated_public_key.as_slice())
            .unwrap_or_default()
    }

    /// Earliest expiration across all entries.
    pub fn expiration(&self) -> u64 {
        self.delegations
            .iter()
            .map(|d| d.delegation.expiration)
            .min()
            .unwrap_or(0)
    }

    pub fn is_expired(&self, now_ns: u64) -> bool {
        self.expiration() <= now_ns
    }

    /// Principal the chain lets the session key act as.
    pub fn sender(&self) -> Principal {
        Principal::self_authenticating(&self.public_key)
    }

    /// Structural validity at `now_ns` for the given session key: every entry
    /// unexpired and the terminal key equal to `session_public_key`.
    pub fn validate(&self, now_ns: u64, session_public_key: &[u8]) -> Result<(), DelegationError> {
        if self.delegations.is_empty() {
            return Err(DelegationError::EmptyChain);
        }
        if self.terminal_public_key() != session_public_key {
            return Err(DelegationError::KeyMismatch {
                expected: hex::encode(session_public_key),
                actual: hex::encode(self.terminal_public_key()),
            });
        }
        if let Some(expired) = self
            .delegations
            .iter()
            .find(|d| d.delegation.is_expired(now_ns))
        {
            return Err(DelegationError::Expired {
                expiration: expired.delegation.expiration,
                now: now_ns,
            });
        }
        Ok(())
    }

    /// Signing key of each entry paired with the entry: the root key for the
    /// first hop, then the previous hop's delegated key.
    pub fn links(&self) -> impl Iterator<Item = (&[u8], &SignedDelegation)> {
        let signers = std::iter::once(self.public_key.as_slice()).chain(
            self.delegations
                .iter()
                .map(|d| d.delegation.delegated_public_key.as_slice()),
        );
        signers.zip(self.delegations.iter())
    }

    pub fn to_json(&self) -> Result<String, DelegationError> {
        serde_json::to_string(self).map_err(|e| DelegationError::Malformed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, DelegationError> {
        let chain: Self =
            serde_json::from_str(json).map_err(|e| DelegationError::Malformed(e.to_string()))?;
        if chain.delegations.is_empty() {
            return Err(DelegationError::EmptyChain);
        }
        Ok(chain)
    }
}

/// Hex encodings used by the persisted JSON form.
mod hex_serde {
    pub mod bytes {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&hex::encode(bytes))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(|e| serde::de::Error::custom(format!("invalid hex: {}", e)))
        }
    }

    /// u64 as a hex string, so JSON consumers without 64-bit integers keep precision.
    pub mod nat {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&format!("{:x}", value))
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            u64::from_str_radix(&s, 16)
                .map_err(|e| serde::de::Error::custom(format!("invalid expiration: {}", e)))
        }
    }

    pub mod principals {
        use crate::principal::Principal;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<Vec<Principal>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(targets) => serializer.collect_seq(targets.iter().map(|p| hex::encode(p.as_slice()))),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<Principal>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let Some(encoded) = Option::<Vec<String>>::deserialize(deserializer)? else {
                return Ok(None);
            };
            encoded
                .iter()
                .map(|s| {
                    let bytes = hex::decode(s)
                        .map_err(|e| serde::de::Error::custom(format!("invalid hex: {}", e)))?;
                    Principal::from_slice(&bytes)
                        .ok_or_else(|| serde::de::Error::custom("principal too long"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
    }
}
