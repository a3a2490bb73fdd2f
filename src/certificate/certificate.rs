//! Certificate decoding and verification.
//!
//! A certificate is a hash tree plus a BLS signature over its root hash,
//! optionally accompanied by a subnet delegation: a second certificate,
//! signed by the root key, that vouches for the subnet key which signed the
//! first one.
//!
//! ```text
//! root key ──signs──▶ delegation certificate ──contains──▶ subnet key
//!                                                          │
//!                                                          ▼
//!                                   certificate ◀──signs── subnet key
//! ```

use crate::certificate::cbor;
use crate::certificate::error::CertificateError;
use crate::certificate::tree::{HashTree, LookupResult};
use crate::principal::Principal;
use crate::request_id::leb128_decode;
use crate::time::{duration_ns, Clock};
use ciborium::value::Value;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Domain separator for the signed state root.
const IC_STATE_ROOT_DOMAIN_SEPARATOR: &[u8] = b"\x0Dic-state-root";

/// DER prefix of a BLS12-381 G2 public key; the 96-byte raw key follows it.
const BLS_DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c,
    0x05, 0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c,
    0x05, 0x03, 0x02, 0x01, 0x03, 0x61, 0x00,
];
const BLS_KEY_LEN: usize = 96;

/// Allowed clock skew for certificates timestamped in the future.
const MAX_FUTURE_SKEW: Duration = Duration::from_secs(5 * 60);

/// Outcome reported by the BLS collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlsVerification {
    /// The signature verifies over the message.
    Valid,
    /// Well-formed signature and key, but not over this message.
    Invalid,
    /// The signature or key could not be parsed.
    Malformed(String),
}

/// External BLS12-381 signature verification (G1 signatures, G2 keys).
pub trait BlsVerifier: Send + Sync {
    fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> BlsVerification;
}

/// Subnet key endorsement carried by a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDelegation {
    pub subnet_id: Vec<u8>,
    /// CBOR-encoded certificate signed by the root key.
    pub certificate: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub tree: HashTree,
    pub signature: Vec<u8>,
    pub delegation: Option<CertificateDelegation>,
}

impl Certificate {
    /// Decode a CBOR certificate.
    pub fn decode(bytes: &[u8]) -> Result<Self, CertificateError> {
        let malformed = |reason: String| CertificateError::Malformed(reason);

        let Value::Map(entries) = cbor::decode(bytes).map_err(malformed)? else {
            return Err(malformed("certificate is not a CBOR map".to_string()));
        };

        let tree = cbor::map_get(&entries, "tree")
            .ok_or_else(|| malformed("missing tree".to_string()))
            .and_then(|v| HashTree::from_cbor(v).map_err(malformed))?;
        let signature = cbor::map_get(&entries, "signature")
            .and_then(cbor::as_bytes)
            .ok_or_else(|| malformed("missing or non-bytes signature".to_string()))?
            .to_vec();

        let delegation = match cbor::map_get(&entries, "delegation") {
            None => None,
            Some(Value::Map(d)) => {
                let subnet_id = cbor::map_get(d, "subnet_id")
                    .and_then(cbor::as_bytes)
                    .ok_or_else(|| malformed("delegation missing subnet_id".to_string()))?;
                let certificate = cbor::map_get(d, "certificate")
                    .and_then(cbor::as_bytes)
                    .ok_or_else(|| malformed("delegation missing certificate".to_string()))?;
                Some(CertificateDelegation {
                    subnet_id: subnet_id.to_vec(),
                    certificate: certificate.to_vec(),
                })
            }
            Some(_) => return Err(malformed("delegation is not a map".to_string())),
        };

        Ok(Self {
            tree,
            signature,
            delegation,
        })
    }

    /// Encode as a self-describing CBOR certificate.
    pub fn encode(&self) -> Result<Vec<u8>, CertificateError> {
        let mut entries = vec![
            (cbor::text_key("tree"), self.tree.to_cbor()),
            (cbor::text_key("signature"), Value::Bytes(self.signature.clone())),
        ];
        if let Some(delegation) = &self.delegation {
            entries.push((
                cbor::text_key("delegation"),
                Value::Map(vec![
                    (cbor::text_key("subnet_id"), Value::Bytes(delegation.subnet_id.clone())),
                    (cbor::text_key("certificate"), Value::Bytes(delegation.certificate.clone())),
                ]),
            ));
        }
        cbor::encode(Value::Map(entries)).map_err(CertificateError::Malformed)
    }

    /// Message the BLS signature covers.
    pub fn signable(&self) -> Vec<u8> {
        let mut message = IC_STATE_ROOT_DOMAIN_SEPARATOR.to_vec();
        message.extend_from_slice(&self.tree.digest());
        message
    }

    pub fn lookup_path<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        self.tree.lookup_path(path)
    }

    /// Certified time in nanoseconds, if the tree carries one.
    pub fn time(&self) -> Result<Option<u64>, CertificateError> {
        match self.lookup_path(&["time"]) {
            LookupResult::Found(bytes) => leb128_decode(bytes)
                .map(Some)
                .ok_or_else(|| CertificateError::Malformed("time is not LEB128".to_string())),
            LookupResult::Absent | LookupResult::Unknown => Ok(None),
            LookupResult::Error => Err(CertificateError::Malformed(
                "time is not a leaf".to_string(),
            )),
        }
    }
}

/// A certificate whose signature, delegation and freshness were checked.
#[derive(Debug, Clone)]
pub struct VerifiedCertificate {
    certificate: Certificate,
    time: Option<u64>,
}

impl VerifiedCertificate {
    pub fn lookup_path<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        self.certificate.lookup_path(path)
    }

    pub fn time(&self) -> Option<u64> {
        self.time
    }

    pub fn root_hash(&self) -> [u8; 32] {
        self.certificate.tree.digest()
    }
}

/// Extract the raw 96-byte BLS key from its DER encoding.
pub fn extract_bls_key(der: &[u8]) -> Result<&[u8], CertificateError> {
    if der.len() != BLS_DER_PREFIX.len() + BLS_KEY_LEN {
        return Err(CertificateError::InvalidRootKey(format!(
            "expected {} DER bytes, got {}",
            BLS_DER_PREFIX.len() + BLS_KEY_LEN,
            der.len()
        )));
    }
    let (prefix, key) = der.split_at(BLS_DER_PREFIX.len());
    if prefix != BLS_DER_PREFIX {
        return Err(CertificateError::InvalidRootKey(
            "not a BLS12-381 public key".to_string(),
        ));
    }
    Ok(key)
}

/// Wrap a raw 96-byte BLS key in its DER encoding.
pub fn bls_key_to_der(raw: &[u8]) -> Vec<u8> {
    let mut der = BLS_DER_PREFIX.to_vec();
    der.extend_from_slice(raw);
    der
}

/// Verifies certificates against a pinned root key.
#[derive(Clone)]
pub struct CertificateVerifier {
    root_key_der: Vec<u8>,
    bls: Arc<dyn BlsVerifier>,
    clock: Arc<dyn Clock>,
    require_time: bool,
}

impl CertificateVerifier {
    pub fn new(root_key_der: Vec<u8>, bls: Arc<dyn BlsVerifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root_key_der,
            bls,
            clock,
            require_time: true,
        }
    }

    /// Whether certificates without a `time` leaf are rejected (default: true).
    pub fn require_time(mut self, require_time: bool) -> Self {
        self.require_time = require_time;
        self
    }

    /// Verify authenticity and freshness of a certificate about `canister_id`.
    ///
    /// 1. Resolve the signing key (root key, or subnet key via delegation)
    /// 2. Re-derive the root hash and check the BLS signature over it
    /// 3. Check the certified time against `max_age`
    pub fn verify_certificate(
        &self,
        certificate: Certificate,
        canister_id: &Principal,
        max_age: Duration,
    ) -> Result<VerifiedCertificate, CertificateError> {
        let signing_key = self.signing_key(&certificate, canister_id)?;
        self.verify_signature(&certificate, &signing_key)?;
        let time = self.check_time(&certificate, max_age)?;

        debug!(
            "Certificate verified, root {}",
            hex::encode(&certificate.tree.digest()[..8])
        );
        Ok(VerifiedCertificate { certificate, time })
    }

    /// Decode and verify in one step.
    pub fn verify_bytes(
        &self,
        bytes: &[u8],
        canister_id: &Principal,
        max_age: Duration,
    ) -> Result<VerifiedCertificate, CertificateError> {
        self.verify_certificate(Certificate::decode(bytes)?, canister_id, max_age)
    }

    fn verify_signature(
        &self,
        certificate: &Certificate,
        public_key: &[u8],
    ) -> Result<(), CertificateError> {
        match self
            .bls
            .verify(&certificate.signature, &certificate.signable(), public_key)
        {
            BlsVerification::Valid => Ok(()),
            BlsVerification::Invalid => {
                let computed_root = hex::encode(certificate.tree.digest());
                warn!("Certificate signature does not cover root {}", computed_root);
                Err(CertificateError::TreeHashMismatch { computed_root })
            }
            BlsVerification::Malformed(reason) => {
                warn!("Malformed certificate signature: {}", reason);
                Err(CertificateError::SignatureInvalid(reason))
            }
        }
    }

    fn check_time(
        &self,
        certificate: &Certificate,
        max_age: Duration,
    ) -> Result<Option<u64>, CertificateError> {
        let Some(time) = certificate.time()? else {
            if self.require_time {
                warn!("Certificate has no time leaf");
                return Err(CertificateError::MissingTime);
            }
            return Ok(None);
        };

        let now = self.clock.now_ns();
        let max_age_ns = duration_ns(max_age);
        if now.saturating_sub(time) > max_age_ns {
            warn!("Certificate time {} older than {:?}", time, max_age);
            return Err(CertificateError::Expired {
                time,
                now,
                max_age_ns,
            });
        }
        if time.saturating_sub(now) > duration_ns(MAX_FUTURE_SKEW) {
            warn!("Certificate time {} ahead of local clock {}", time, now);
            return Err(CertificateError::TimeInFuture { time, now });
        }
        Ok(Some(time))
    }

    /// Raw BLS key that must have signed `certificate`.
    fn signing_key(
        &self,
        certificate: &Certificate,
        canister_id: &Principal,
    ) -> Result<Vec<u8>, CertificateError> {
        let root_key = extract_bls_key(&self.root_key_der)?;
        let Some(delegation) = &certificate.delegation else {
            return Ok(root_key.to_vec());
        };

        let invalid = |reason: &str| CertificateError::DelegationInvalid(reason.to_string());
        let subnet = Certificate::decode(&delegation.certificate)?;
        if subnet.delegation.is_some() {
            return Err(invalid("nested subnet delegations are not allowed"));
        }

        // Subnet delegations are long-lived, so only authenticity is checked here.
        match self
            .bls
            .verify(&subnet.signature, &subnet.signable(), root_key)
        {
            BlsVerification::Valid => {}
            BlsVerification::Invalid => {
                return Err(invalid("delegation certificate not signed by root key"))
            }
            BlsVerification::Malformed(reason) => {
                return Err(CertificateError::DelegationInvalid(reason))
            }
        }

        let subnet_id = delegation.subnet_id.as_slice();
        let ranges_path: [&[u8]; 3] = [b"subnet", subnet_id, b"canister_ranges"];
        let ranges = match subnet.lookup_path(&ranges_path) {
            LookupResult::Found(bytes) => decode_canister_ranges(bytes)?,
            _ => return Err(invalid("delegation certificate lacks canister ranges")),
        };
        let in_range = ranges.iter().any(|(low, high)| {
            canister_id.as_slice() >= low.as_slice() && canister_id.as_slice() <= high.as_slice()
        });
        if !in_range {
            return Err(CertificateError::CanisterNotInRange {
                canister_id: canister_id.to_string(),
            });
        }

        let key_path: [&[u8]; 3] = [b"subnet", subnet_id, b"public_key"];
        match subnet.lookup_path(&key_path) {
            LookupResult::Found(der) => {
                debug!("Using subnet {} key", hex::encode(subnet_id));
                Ok(extract_bls_key(der)
                    .map_err(|e| CertificateError::DelegationInvalid(e.to_string()))?
                    .to_vec())
            }
            _ => Err(invalid("delegation certificate lacks subnet public key")),
        }
    }
}

impl std::fmt::Debug for CertificateVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateVerifier")
            .field("root_key_der", &hex::encode(&self.root_key_der))
            .field("require_time", &self.require_time)
            .finish()
    }
}

/// Decode a CBOR list of inclusive `[low, high]` principal ranges.
fn decode_canister_ranges(bytes: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CertificateError> {
    let invalid = || CertificateError::DelegationInvalid("malformed canister ranges".to_string());
    let Value::Array(ranges) = cbor::decode(bytes).map_err(|_| invalid())? else {
        return Err(invalid());
    };
    ranges
        .iter()
        .map(|range| match range {
            Value::Array(bounds) if bounds.len() == 2 => {
                let low = cbor::as_bytes(&bounds[0]).ok_or_else(invalid)?;
                let high = cbor::as_bytes(&bounds[1]).ok_or_else(invalid)?;
                Ok((low.to_vec(), high.to_vec()))
            }
            _ => Err(invalid()),
        })
        .collect()
}

/// Encode inclusive principal ranges the way subnet certificates carry them.
pub fn encode_canister_ranges(ranges: &[(Principal, Principal)]) -> Result<Vec<u8>, CertificateError> {
    let value = Value::Array(
        ranges
            .iter()
            .map(|(low, high)| {
                Value::Array(vec![
                    Value::Bytes(low.as_slice().to_vec()),
                    Value::Bytes(high.as_slice().to_vec()),
                ])
            })
            .collect(),
    );
    cbor::encode(value).map_err(CertificateError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_id::leb128_encode;
    use crate::time::FixedClock;
    use sha2::{Digest, Sha256};

    const NOW: u64 = 1_700_000_000_000_000_000;
    const MAX_AGE: Duration = Duration::from_secs(300);

    /// Accepts `sha256(public_key || message)` as the signature.
    struct HashBls;

    impl BlsVerifier for HashBls {
        fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> BlsVerification {
            if signature.len() != 32 {
                return BlsVerification::Malformed(format!("{} byte signature", signature.len()));
            }
            if signature == hash_sign(public_key, message).as_slice() {
                BlsVerification::Valid
            } else {
                BlsVerification::Invalid
            }
        }
    }

    fn hash_sign(public_key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(public_key);
        hasher.update(message);
        hasher.finalize().to_vec()
    }

    fn root_key() -> Vec<u8> {
        vec![0x11; BLS_KEY_LEN]
    }

    fn canister() -> Principal {
        Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 5, 1, 1]).unwrap()
    }

    fn verifier() -> CertificateVerifier {
        CertificateVerifier::new(
            bls_key_to_der(&root_key()),
            Arc::new(HashBls),
            Arc::new(FixedClock::new(NOW)),
        )
    }

    fn signed(tree: HashTree, key: &[u8], delegation: Option<CertificateDelegation>) -> Certificate {
        let mut certificate = Certificate {
            tree,
            signature: Vec::new(),
            delegation,
        };
        certificate.signature = hash_sign(key, &certificate.signable());
        certificate
    }

    fn timed_tree(time: u64) -> HashTree {
        HashTree::fork(
            HashTree::labeled("request_status", HashTree::leaf(b"replied".to_vec())),
            HashTree::labeled("time", HashTree::leaf(leb128_encode(time))),
        )
    }

    fn subnet_delegation(subnet_key: &[u8], low: &[u8], high: &[u8]) -> CertificateDelegation {
        let subnet_id = vec![0xAA; 29];
        let ranges = encode_canister_ranges(&[(
            Principal::from_slice(low).unwrap(),
            Principal::from_slice(high).unwrap(),
        )])
        .unwrap();
        let tree = HashTree::fork(
            HashTree::labeled(
                "subnet",
                HashTree::labeled(
                    subnet_id.clone(),
                    HashTree::fork(
                        HashTree::labeled("canister_ranges", HashTree::leaf(ranges)),
                        HashTree::labeled("public_key", HashTree::leaf(bls_key_to_der(subnet_key))),
                    ),
                ),
            ),
            HashTree::labeled("time", HashTree::leaf(leb128_encode(NOW - 86_400_000_000_000))),
        );
        CertificateDelegation {
            subnet_id,
            certificate: signed(tree, &root_key(), None).encode().unwrap(),
        }
    }

    #[test]
    fn test_valid_root_signed_certificate() {
        let certificate = signed(timed_tree(NOW - 1_000), &root_key(), None);
        let bytes = certificate.encode().unwrap();

        let verified = verifier().verify_bytes(&bytes, &canister(), MAX_AGE).unwrap();
        assert_eq!(verified.time(), Some(NOW - 1_000));
        assert_eq!(verified.root_hash(), certificate.tree.digest());
        assert_eq!(
            verified.lookup_path(&["request_status"]),
            LookupResult::Found(b"replied")
        );
    }

    #[test]
    fn test_tampered_leaf_is_tree_hash_mismatch() {
        let mut certificate = signed(timed_tree(NOW), &root_key(), None);
        certificate.tree = HashTree::fork(
            HashTree::labeled("request_status", HashTree::leaf(b"replieD".to_vec())),
            HashTree::labeled("time", HashTree::leaf(leb128_encode(NOW))),
        );
        assert!(matches!(
            verifier().verify_certificate(certificate, &canister(), MAX_AGE),
            Err(CertificateError::TreeHashMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_signature() {
        let mut certificate = signed(timed_tree(NOW), &root_key(), None);
        certificate.signature = vec![0u8; 48 + 1];
        assert!(matches!(
            verifier().verify_certificate(certificate, &canister(), MAX_AGE),
            Err(CertificateError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn test_freshness_bounds() {
        let stale = signed(timed_tree(NOW - 301_000_000_000), &root_key(), None);
        assert!(matches!(
            verifier().verify_certificate(stale, &canister(), MAX_AGE),
            Err(CertificateError::Expired { .. })
        ));

        let future = signed(timed_tree(NOW + 301_000_000_000), &root_key(), None);
        assert!(matches!(
            verifier().verify_certificate(future, &canister(), MAX_AGE),
            Err(CertificateError::TimeInFuture { .. })
        ));
    }

    #[test]
    fn test_missing_time_policy() {
        let tree = HashTree::labeled("request_status", HashTree::leaf(b"replied".to_vec()));
        let certificate = signed(tree, &root_key(), None);

        assert!(matches!(
            verifier().verify_certificate(certificate.clone(), &canister(), MAX_AGE),
            Err(CertificateError::MissingTime)
        ));
        let lenient = verifier().require_time(false);
        assert_eq!(
            lenient
                .verify_certificate(certificate, &canister(), MAX_AGE)
                .unwrap()
                .time(),
            None
        );
    }

    #[test]
    fn test_subnet_delegation_accepted_in_range() {
        let subnet_key = vec![0x22; BLS_KEY_LEN];
        let delegation = subnet_delegation(&subnet_key, &[0, 0, 0, 0, 0, 0, 0, 0, 1, 1], &[0, 0, 0, 0, 0, 0, 0, 9, 1, 1]);
        let certificate = signed(timed_tree(NOW), &subnet_key, Some(delegation));
        assert!(verifier()
            .verify_certificate(certificate, &canister(), MAX_AGE)
            .is_ok());
    }

    #[test]
    fn test_subnet_delegation_out_of_range() {
        let subnet_key = vec![0x22; BLS_KEY_LEN];
        let delegation = subnet_delegation(&subnet_key, &[0, 0, 0, 0, 0, 0, 0, 6, 1, 1], &[0, 0, 0, 0, 0, 0, 0, 9, 1, 1]);
        let certificate = signed(timed_tree(NOW), &subnet_key, Some(delegation));
        assert!(matches!(
            verifier().verify_certificate(certificate, &canister(), MAX_AGE),
            Err(CertificateError::CanisterNotInRange { .. })
        ));
    }

    #[test]
    fn test_subnet_certificate_must_be_root_signed() {
        let subnet_key = vec![0x22; BLS_KEY_LEN];
        let mut delegation = subnet_delegation(&subnet_key, &[0; 10], &[0xFF; 10]);
        let mut subnet = Certificate::decode(&delegation.certificate).unwrap();
        subnet.signature = hash_sign(&subnet_key, &subnet.signable());
        delegation.certificate = subnet.encode().unwrap();

        let certificate = signed(timed_tree(NOW), &subnet_key, Some(delegation));
        assert!(matches!(
            verifier().verify_certificate(certificate, &canister(), MAX_AGE),
            Err(CertificateError::DelegationInvalid(_))
        ));
    }

    #[test]
    fn test_nested_delegation_rejected() {
        let subnet_key = vec![0x22; BLS_KEY_LEN];
        let inner = subnet_delegation(&subnet_key, &[0; 10], &[0xFF; 10]);
        let mut outer = subnet_delegation(&subnet_key, &[0; 10], &[0xFF; 10]);
        let mut subnet = Certificate::decode(&outer.certificate).unwrap();
        subnet.delegation = Some(inner);
        subnet.signature = hash_sign(&root_key(), &subnet.signable());
        outer.certificate = subnet.encode().unwrap();

        let certificate = signed(timed_tree(NOW), &subnet_key, Some(outer));
        assert!(matches!(
            verifier().verify_certificate(certificate, &canister(), MAX_AGE),
            Err(CertificateError::DelegationInvalid(_))
        ));
    }

    #[test]
    fn test_root_key_der_shape() {
        let der = bls_key_to_der(&root_key());
        assert_eq!(der.len(), 133);
        assert_eq!(extract_bls_key(&der).unwrap(), root_key().as_slice());
        assert!(extract_bls_key(&der[1..]).is_err());

        let mut wrong_oid = der.clone();
        wrong_oid[10] ^= 0xFF;
        assert!(matches!(
            extract_bls_key(&wrong_oid),
            Err(CertificateError::InvalidRootKey(_))
        ));
    }

    #[test]
    fn test_certificate_cbor_roundtrip_with_delegation() {
        let subnet_key = vec![0x22; BLS_KEY_LEN];
        let delegation = subnet_delegation(&subnet_key, &[0; 10], &[0xFF; 10]);
        let certificate = signed(timed_tree(NOW), &subnet_key, Some(delegation));
        let decoded = Certificate::decode(&certificate.encode().unwrap()).unwrap();
        assert_eq!(decoded, certificate);
        assert_eq!(decoded.time().unwrap(), Some(NOW));
    }
}
