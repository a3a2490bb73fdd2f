//! Uniform `login()` entrypoint over all wallet families.
//!
//! ```text
//!                      ┌──────────────────┐
//!  login(family) ─────▶│   SiwxProvider   │── LoginState ──▶ watch subscribers
//!                      └────────┬─────────┘
//!            signing families   │   relaying signers
//!          ┌────────────────────┴──────────────────────┐
//!          ▼                                           ▼
//!  prepare → sign → authenticate          call → verify certificate
//!          └────────────────────┬──────────────────────┘
//!                               ▼
//!              get_delegation → build chain → commit
//! ```
//!
//! Only one attempt runs at a time and a failed attempt never touches the
//! committed session. Cancellation is honoured up to the commit; the commit
//! itself runs to completion on its own task.

pub mod codec;
pub mod state;

pub use codec::{encode_login_reply, CallCodec, CborCallCodec, LoginReply};
pub use state::LoginState;

use crate::certificate::{verify_and_decode, BlsVerifier, CertificateVerifier, ExpectedCall};
use crate::challenge::{
    CanisterCall, ChallengeClient, ExternalWallet, RemoteAuthority, WalletAccount, WalletFamily,
};
use crate::config::SiwxConfig;
use crate::delegation::{DelegationChain, DelegationChainBuilder};
use crate::error::AuthError;
use crate::principal::Principal;
use crate::session::{Identity, SessionStore, StorageError};
use crate::session_key::SessionKeyPair;
use crate::time::Clock;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::futures::Notified;
use tokio::sync::{watch, Notify};

/// Relayed-call verification for IC-signer logins.
#[derive(Clone)]
struct RelayVerification {
    verifier: CertificateVerifier,
    codec: Arc<dyn CallCodec>,
    canister_id: Principal,
}

/// Holds the in-progress flag for one attempt and releases it when the
/// attempt ends or is dropped.
///
/// The cancel listener is registered before the flag is raised, so any
/// `cancel()` that observes the attempt in progress reaches it.
struct AttemptGuard<'a> {
    flag: &'a AtomicBool,
    cancelled: Pin<Box<Notified<'a>>>,
}

impl<'a> AttemptGuard<'a> {
    fn acquire(flag: &'a AtomicBool, cancel: &'a Notify) -> Option<Self> {
        let mut cancelled = Box::pin(cancel.notified());
        cancelled.as_mut().enable();
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, cancelled })
    }

    async fn cancelled(&mut self) {
        self.cancelled.as_mut().await
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SiwxProvider {
    config: SiwxConfig,
    store: Arc<SessionStore>,
    authority: Arc<dyn RemoteAuthority>,
    builder: DelegationChainBuilder,
    wallets: HashMap<WalletFamily, Arc<dyn ExternalWallet>>,
    relay: Option<RelayVerification>,
    in_progress: AtomicBool,
    cancel: Notify,
    state: watch::Sender<LoginState>,
}

impl SiwxProvider {
    pub fn new(
        config: SiwxConfig,
        store: Arc<SessionStore>,
        authority: Arc<dyn RemoteAuthority>,
        builder: DelegationChainBuilder,
    ) -> Self {
        let (state, _) = watch::channel(LoginState::Idle);
        Self {
            config,
            store,
            authority,
            builder,
            wallets: HashMap::new(),
            relay: None,
            in_progress: AtomicBool::new(false),
            cancel: Notify::new(),
            state,
        }
    }

    /// Register the wallet handle used for its family.
    pub fn with_wallet(mut self, wallet: Arc<dyn ExternalWallet>) -> Self {
        self.wallets.insert(wallet.family(), wallet);
        self
    }

    /// Enable IC-signer logins, verified against the configured root key.
    pub fn with_relay_verification(
        mut self,
        bls: Arc<dyn BlsVerifier>,
        clock: Arc<dyn Clock>,
        codec: Arc<dyn CallCodec>,
    ) -> Result<Self, AuthError> {
        let root_key = self
            .config
            .root_key_der()?
            .ok_or_else(|| AuthError::Configuration("no root key configured".to_string()))?;
        let canister_id = self.config.oisy_canister()?.ok_or_else(|| {
            AuthError::Configuration("no login canister configured".to_string())
        })?;
        let verifier = CertificateVerifier::new(root_key, bls, clock)
            .require_time(self.config.require_certificate_time);
        self.relay = Some(RelayVerification {
            verifier,
            codec,
            canister_id,
        });
        Ok(self)
    }

    /// Restore a persisted session, if any.
    pub async fn initialize(&self) -> Identity {
        self.store.restore().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store.is_authenticated().await
    }

    pub async fn identity(&self) -> Identity {
        self.store.identity().await
    }

    pub fn subscribe(&self) -> watch::Receiver<LoginState> {
        self.state.subscribe()
    }

    pub fn is_login_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Abandon the in-flight attempt, which then resolves to `Cancelled`.
    ///
    /// Has no effect once the attempt has started committing its session.
    pub fn cancel(&self) {
        if self.is_login_in_progress() {
            info!("Cancelling login attempt");
            self.cancel.notify_waiters();
        }
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.store.clear().await?;
        self.publish(LoginState::Idle);
        Ok(())
    }

    /// Log in with the wallet registered for `family`.
    ///
    /// On success the new session is committed and returned. On failure the
    /// previous session, if any, is left as it was.
    pub async fn login(&self, family: WalletFamily) -> Result<Identity, AuthError> {
        let mut attempt = AttemptGuard::acquire(&self.in_progress, &self.cancel).ok_or_else(|| {
            warn!("Rejecting {} login: another attempt is in progress", family);
            AuthError::AlreadyInProgress
        })?;

        let prepared = tokio::select! {
            prepared = self.attempt(family) => prepared,
            _ = attempt.cancelled() => Err(AuthError::Cancelled),
        };
        let result = match prepared {
            Ok((session_key, chain)) => self.commit(session_key, chain).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(identity) => {
                info!("{} login succeeded for {}", family, identity.sender());
                self.publish(LoginState::Success);
            }
            Err(e) => {
                warn!("{} login failed: {}", family, e);
                self.publish(LoginState::Error(e.to_string()));
            }
        }
        result
    }

    /// Everything up to a verified delegation chain for a fresh session key.
    async fn attempt(
        &self,
        family: WalletFamily,
    ) -> Result<(Arc<SessionKeyPair>, DelegationChain), AuthError> {
        let wallet = self
            .wallets
            .get(&family)
            .cloned()
            .ok_or(AuthError::UnsupportedFamily(family))?;

        self.publish(LoginState::Connecting);
        let client = ChallengeClient::new(
            wallet,
            self.authority.clone(),
            self.config.authority_timeout(),
        );
        let account = client.connect().await?;

        // Dropped, and zeroized, on any early return below.
        let session_key = Arc::new(SessionKeyPair::generate()?);
        debug!("Generated session key for {}", account.address);

        let (session_id, long_lived_public_key) = if client.signs_messages() {
            self.sign_in(&client, &account, &session_key).await?
        } else {
            self.relay_sign_in(&client, &account, &session_key).await?
        };

        self.publish(LoginState::Delegating);
        let signed = client.get_delegation(&session_id).await?;
        let chain = self
            .builder
            .build(&session_key, signed, &long_lived_public_key)?;
        Ok((session_key, chain))
    }

    /// Persist the session on a separate task, so that dropping the login
    /// future cannot interrupt the two-entry write halfway.
    async fn commit(
        &self,
        session_key: Arc<SessionKeyPair>,
        chain: DelegationChain,
    ) -> Result<Identity, AuthError> {
        let store = self.store.clone();
        let committed = tokio::spawn(async move { store.commit(session_key, chain).await })
            .await
            .map_err(|e| StorageError::Backend(format!("commit task failed: {}", e)))?;
        Ok(committed?)
    }

    /// Message signing path: returns the session id and long-lived key.
    async fn sign_in(
        &self,
        client: &ChallengeClient,
        account: &WalletAccount,
        session_key: &SessionKeyPair,
    ) -> Result<(String, Vec<u8>), AuthError> {
        self.publish(LoginState::Preparing);
        let prepared = client.prepare_message(account).await?;

        self.publish(LoginState::Signing);
        let signature = client.sign(&prepared.message).await?;

        self.publish(LoginState::Authenticating);
        let session = client
            .authenticate(&signature, &prepared.message_id, session_key.public_key_der())
            .await?;
        Ok((session.session_id, session.long_lived_public_key))
    }

    /// Relayed-call path: the certified reply of the login call stands in for
    /// the authority's authentication.
    async fn relay_sign_in(
        &self,
        client: &ChallengeClient,
        account: &WalletAccount,
        session_key: &SessionKeyPair,
    ) -> Result<(String, Vec<u8>), AuthError> {
        let relay = self.relay.as_ref().ok_or_else(|| {
            AuthError::Configuration("relayed logins need certificate verification".to_string())
        })?;
        let sender = Principal::from_text(&account.address)
            .map_err(|e| AuthError::WalletUnavailable(e.to_string()))?;
        let arg = relay
            .codec
            .encode_login_arg(session_key.public_key_der())
            .map_err(AuthError::Configuration)?;

        self.publish(LoginState::Calling);
        let call = CanisterCall {
            canister_id: relay.canister_id.clone(),
            method: self.config.oisy_login_method.clone(),
            arg,
            sender,
        };
        let response = client.relay_call(&call).await?;

        self.publish(LoginState::Verifying);
        let expected = ExpectedCall {
            sender: call.sender,
            canister_id: call.canister_id,
            method_name: call.method,
            arg: call.arg,
        };
        let reply = verify_and_decode(
            &relay.verifier,
            &expected,
            &response,
            self.config.certificate_max_age(),
            |bytes| relay.codec.decode_login_reply(bytes),
        )?;
        Ok((reply.session_id, reply.long_lived_public_key))
    }

    fn publish(&self, state: LoginState) {
        debug!("Login state: {}", state);
        self.state.send_replace(state);
    }
}

impl std::fmt::Debug for SiwxProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiwxProvider")
            .field("families", &self.wallets.keys().collect::<Vec<_>>())
            .field("relay", &self.relay.is_some())
            .field("in_progress", &self.is_login_in_progress())
            .finish()
    }
}
