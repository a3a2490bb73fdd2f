#![allow(dead_code)]

use async_trait::async_trait;
use ciborium::value::Value;
use sha2::{Digest, Sha256};
use siwx::certificate::cbor;
use siwx::certificate::{
    bls_key_to_der, BlsVerification, BlsVerifier, CallRequestFields, Certificate, HashTree,
    RelayedCallResponse,
};
use siwx::challenge::{
    AuthenticatedSession, AuthorityError, CanisterCall, ExternalWallet, PreparedMessage,
    RemoteAuthority, WalletAccount, WalletError, WalletFamily,
};
use siwx::delegation::{Delegation, DelegationChainBuilder, DelegationVerifier, SignedDelegation};
use siwx::provider::{encode_login_reply, CborCallCodec, LoginReply};
use siwx::request_id::leb128_encode;
use siwx::session::{KeyValueStorage, MemoryStorage, SessionStore, StorageError};
use siwx::time::FixedClock;
use siwx::{Principal, SessionKeyPair, SiwxConfig, SiwxProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const NOW: u64 = 1_700_000_000_000_000_000;
pub const HOUR_NS: u64 = 3_600_000_000_000;
pub const LOGIN_CANISTER: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";
pub const OISY_SESSION: &str = "oisy-session";

/// Accepts `sha256(public_key || message)` as a BLS signature.
pub struct HashBls;

impl BlsVerifier for HashBls {
    fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> BlsVerification {
        if signature.len() != 32 {
            return BlsVerification::Malformed("bad signature length".to_string());
        }
        if signature == hash_sign(public_key, message).as_slice() {
            BlsVerification::Valid
        } else {
            BlsVerification::Invalid
        }
    }
}

pub fn hash_sign(public_key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    hasher.update(message);
    hasher.finalize().to_vec()
}

pub fn root_key() -> Vec<u8> {
    vec![0x11; 96]
}

pub fn sign_certificate(tree: HashTree) -> Certificate {
    let mut certificate = Certificate {
        tree,
        signature: Vec::new(),
        delegation: None,
    };
    certificate.signature = hash_sign(&root_key(), &certificate.signable());
    certificate
}

/// How the fake authority misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityMode {
    Honest,
    /// Delegates to a key other than the session key.
    WrongKey,
    /// Issues an already expired delegation.
    Expired,
    /// Declines every signature.
    RejectSignatures,
    /// Never answers within the timeout.
    Slow,
}

pub struct FakeAuthority {
    identity: SessionKeyPair,
    mode: Mutex<AuthorityMode>,
    sessions: Mutex<HashMap<String, Vec<u8>>>,
    counter: Mutex<u32>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            identity: SessionKeyPair::generate().unwrap(),
            mode: Mutex::new(AuthorityMode::Honest),
            sessions: Mutex::new(HashMap::new()),
            counter: Mutex::new(0),
        }
    }

    pub fn set_mode(&self, mode: AuthorityMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn mode(&self) -> AuthorityMode {
        *self.mode.lock().unwrap()
    }

    pub fn identity_der(&self) -> Vec<u8> {
        self.identity.public_key_der().to_vec()
    }

    pub fn register_session(&self, session_id: &str, session_public_key: Vec<u8>) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), session_public_key);
    }
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn prepare_message(
        &self,
        account: &WalletAccount,
    ) -> Result<PreparedMessage, AuthorityError> {
        if self.mode() == AuthorityMode::Slow {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(PreparedMessage {
            message: format!("example.org wants you to sign in with {}", account.address)
                .into_bytes(),
            message_id: "challenge-1".to_string(),
        })
    }

    async fn authenticate(
        &self,
        signature: &[u8],
        message_id: &str,
        session_public_key: &[u8],
    ) -> Result<AuthenticatedSession, AuthorityError> {
        if self.mode() == AuthorityMode::RejectSignatures {
            return Err(AuthorityError::Rejected("signature does not match".to_string()));
        }
        if signature.is_empty() || message_id != "challenge-1" {
            return Err(AuthorityError::Malformed("unknown challenge".to_string()));
        }
        let session_id = {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            format!("session-{}", *counter)
        };
        self.register_session(&session_id, session_public_key.to_vec());
        Ok(AuthenticatedSession {
            session_id,
            long_lived_public_key: self.identity_der(),
        })
    }

    async fn get_delegation(&self, session_id: &str) -> Result<SignedDelegation, AuthorityError> {
        let session_public_key = self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| AuthorityError::Rejected(format!("unknown session {}", session_id)))?;

        let delegation = Delegation {
            delegated_public_key: match self.mode() {
                AuthorityMode::WrongKey => SessionKeyPair::generate().unwrap().public_key_der().to_vec(),
                _ => session_public_key,
            },
            expiration: match self.mode() {
                AuthorityMode::Expired => NOW - 1,
                _ => NOW + HOUR_NS,
            },
            targets: None,
        };
        let signature = self
            .identity
            .sign(&delegation.signable())
            .map_err(|e| AuthorityError::Malformed(e.to_string()))?;
        Ok(SignedDelegation {
            delegation,
            signature,
        })
    }
}

/// An EVM wallet that signs anything, or blocks forever when told to.
pub struct FakeEvmWallet {
    pub hang: AtomicBool,
}

impl FakeEvmWallet {
    pub fn new() -> Self {
        Self {
            hang: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ExternalWallet for FakeEvmWallet {
    fn family(&self) -> WalletFamily {
        WalletFamily::Evm
    }

    async fn get_address(&self) -> Result<String, WalletError> {
        Ok(format!("0x{}", "5a".repeat(20)))
    }

    async fn get_public_key(&self) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(None)
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut signature = Sha256::digest(message).to_vec();
        signature.extend_from_slice(&[0u8; 32]);
        signature.push(27);
        Ok(signature)
    }
}

/// How the relaying signer answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Replied,
    Rejected,
    /// Relays the content map of a different method and a garbage certificate.
    SubstitutedMethod,
    /// Certifies the reply but tampers with it afterwards.
    TamperedReply,
}

pub struct FakeIcSigner {
    public_key: Vec<u8>,
    authority: Arc<FakeAuthority>,
    mode: RelayMode,
}

impl FakeIcSigner {
    pub fn new(authority: Arc<FakeAuthority>, mode: RelayMode) -> Self {
        Self {
            public_key: b"oisy signer der key".to_vec(),
            authority,
            mode,
        }
    }
}

#[async_trait]
impl ExternalWallet for FakeIcSigner {
    fn family(&self) -> WalletFamily {
        WalletFamily::IcSigner
    }

    async fn get_address(&self) -> Result<String, WalletError> {
        Ok(Principal::self_authenticating(&self.public_key).to_text())
    }

    async fn get_public_key(&self) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(Some(self.public_key.clone()))
    }

    async fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, WalletError> {
        Err(WalletError::SigningFailed("not supported".to_string()))
    }

    async fn call(&self, call: &CanisterCall) -> Result<RelayedCallResponse, WalletError> {
        let Value::Map(entries) = cbor::decode(&call.arg).map_err(WalletError::CallFailed)? else {
            return Err(WalletError::CallFailed("argument is not a map".to_string()));
        };
        let session_key = cbor::map_get(&entries, "session_key")
            .and_then(cbor::as_bytes)
            .ok_or_else(|| WalletError::CallFailed("no session key".to_string()))?;
        self.authority
            .register_session(OISY_SESSION, session_key.to_vec());

        let fields = CallRequestFields {
            request_type: "call".to_string(),
            canister_id: call.canister_id.clone(),
            method_name: match self.mode {
                RelayMode::SubstitutedMethod => "transfer".to_string(),
                _ => call.method.clone(),
            },
            arg: call.arg.clone(),
            sender: call.sender.clone(),
            ingress_expiry: NOW + 240_000_000_000,
            nonce: Some(vec![0x42; 8]),
        };
        let content_map = fields.to_cbor().map_err(|e| WalletError::CallFailed(e.to_string()))?;

        if self.mode == RelayMode::SubstitutedMethod {
            return Ok(RelayedCallResponse {
                certificate: vec![0xff],
                content_map,
            });
        }

        let reply = encode_login_reply(&LoginReply {
            session_id: OISY_SESSION.to_string(),
            long_lived_public_key: self.authority.identity_der(),
        })
        .map_err(WalletError::CallFailed)?;
        let status = match self.mode {
            RelayMode::Rejected => HashTree::fork(
                HashTree::fork(
                    HashTree::labeled("reject_code", HashTree::leaf(leb128_encode(4))),
                    HashTree::labeled("reject_message", HashTree::leaf(b"login disabled".to_vec())),
                ),
                HashTree::labeled("status", HashTree::leaf(b"rejected".to_vec())),
            ),
            _ => HashTree::fork(
                HashTree::labeled("reply", HashTree::leaf(reply.clone())),
                HashTree::labeled("status", HashTree::leaf(b"replied".to_vec())),
            ),
        };
        let request_id = fields.request_id();
        let tree = HashTree::fork(
            HashTree::labeled(
                "request_status",
                HashTree::labeled(request_id.as_bytes().to_vec(), status),
            ),
            HashTree::labeled("time", HashTree::leaf(leb128_encode(NOW - 1_000_000_000))),
        );

        let mut certificate = sign_certificate(tree);
        if self.mode == RelayMode::TamperedReply {
            let mut tampered = reply;
            tampered[4] ^= 0x01;
            certificate.tree = HashTree::fork(
                HashTree::labeled(
                    "request_status",
                    HashTree::labeled(
                        request_id.as_bytes().to_vec(),
                        HashTree::fork(
                            HashTree::labeled("reply", HashTree::leaf(tampered)),
                            HashTree::labeled("status", HashTree::leaf(b"replied".to_vec())),
                        ),
                    ),
                ),
                HashTree::labeled("time", HashTree::leaf(leb128_encode(NOW - 1_000_000_000))),
            );
        }

        Ok(RelayedCallResponse {
            certificate: certificate
                .encode()
                .map_err(|e| WalletError::CallFailed(e.to_string()))?,
            content_map,
        })
    }
}

/// Storage whose reads or delegation writes can be made to fail, and whose
/// delegation writes can be held until released.
#[derive(Clone, Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_reads: Arc<AtomicBool>,
    pub fail_delegation_writes: Arc<AtomicBool>,
    pub hold_delegation_writes: Arc<AtomicBool>,
    /// Signalled when a held write is waiting.
    pub held: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[async_trait]
impl KeyValueStorage for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("connection reset".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if key.ends_with("delegation") {
            if self.fail_delegation_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("disk full".to_string()));
            }
            if self.hold_delegation_writes.load(Ordering::SeqCst) {
                self.held.notify_one();
                self.release.notified().await;
            }
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }
}

pub fn config() -> SiwxConfig {
    SiwxConfig {
        authority_timeout_secs: 1,
        root_key: Some(hex::encode(bls_key_to_der(&root_key()))),
        oisy_login_canister: Some(LOGIN_CANISTER.to_string()),
        ..SiwxConfig::default()
    }
}

pub struct Harness {
    pub provider: Arc<SiwxProvider>,
    pub storage: FlakyStorage,
    pub authority: Arc<FakeAuthority>,
    pub evm: Arc<FakeEvmWallet>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new(relay_mode: RelayMode) -> Self {
        Self::with_storage(FlakyStorage::default(), relay_mode)
    }

    pub fn with_storage(storage: FlakyStorage, relay_mode: RelayMode) -> Self {
        let config = config();
        let clock = Arc::new(FixedClock::new(NOW));
        let authority = Arc::new(FakeAuthority::new());
        let evm = Arc::new(FakeEvmWallet::new());
        let store = Arc::new(SessionStore::new(
            Arc::new(storage.clone()),
            clock.clone(),
            config.storage_prefix.clone(),
        ));
        let builder = DelegationChainBuilder::new(Arc::new(DelegationVerifier::new()), clock.clone());

        let provider = SiwxProvider::new(config, store, authority.clone(), builder)
            .with_wallet(evm.clone())
            .with_wallet(Arc::new(FakeIcSigner::new(authority.clone(), relay_mode)))
            .with_relay_verification(Arc::new(HashBls), clock.clone(), Arc::new(CborCallCodec))
            .unwrap();

        Self {
            provider: Arc::new(provider),
            storage,
            authority,
            evm,
            clock,
        }
    }

    /// A second provider over the same storage, as after a process restart.
    pub fn restarted(&self) -> SiwxProvider {
        let store = Arc::new(SessionStore::new(
            Arc::new(self.storage.clone()),
            self.clock.clone(),
            config().storage_prefix,
        ));
        let builder =
            DelegationChainBuilder::new(Arc::new(DelegationVerifier::new()), self.clock.clone());
        SiwxProvider::new(config(), store, self.authority.clone(), builder)
    }
}
