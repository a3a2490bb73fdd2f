//! Challenge/response exchange between a wallet and the remote authority.

use crate::certificate::RelayedCallResponse;
use crate::challenge::authority::{with_timeout, AuthenticatedSession, PreparedMessage, RemoteAuthority};
use crate::challenge::error::{AuthorityError, ChallengeError, WalletError};
use crate::challenge::family::{adapter_for, WalletFamilyAdapter};
use crate::challenge::wallet::{CanisterCall, ExternalWallet, WalletAccount, WalletFamily};
use crate::delegation::SignedDelegation;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Drives one wallet family through connect, prepare, sign and authenticate.
///
/// Wallet interaction is never timed out since users may take arbitrarily
/// long to approve. Every authority call is bounded by `authority_timeout`.
pub struct ChallengeClient {
    wallet: Arc<dyn ExternalWallet>,
    authority: Arc<dyn RemoteAuthority>,
    adapter: Box<dyn WalletFamilyAdapter>,
    authority_timeout: Duration,
}

impl ChallengeClient {
    pub fn new(
        wallet: Arc<dyn ExternalWallet>,
        authority: Arc<dyn RemoteAuthority>,
        authority_timeout: Duration,
    ) -> Self {
        let adapter = adapter_for(wallet.family());
        Self {
            wallet,
            authority,
            adapter,
            authority_timeout,
        }
    }

    pub fn family(&self) -> WalletFamily {
        self.adapter.family()
    }

    pub fn signs_messages(&self) -> bool {
        self.adapter.signs_messages()
    }

    /// Ask the wallet for its account and check it fits the family.
    pub async fn connect(&self) -> Result<WalletAccount, ChallengeError> {
        let address = self.wallet.get_address().await?;
        let public_key = self.wallet.get_public_key().await?;
        let account = WalletAccount {
            family: self.family(),
            address,
            public_key,
        };
        self.adapter.validate_account(&account)?;
        info!("Connected {} wallet {}", account.family, account.address);
        Ok(account)
    }

    pub async fn prepare_message(
        &self,
        account: &WalletAccount,
    ) -> Result<PreparedMessage, ChallengeError> {
        let prepared = with_timeout(
            self.authority_timeout,
            self.authority.prepare_message(account),
        )
        .await?;
        if prepared.message.is_empty() || prepared.message_id.is_empty() {
            return Err(AuthorityError::Malformed("empty message or message id".to_string()).into());
        }
        debug!(
            "Authority prepared {} byte message {}",
            prepared.message.len(),
            prepared.message_id
        );
        Ok(prepared)
    }

    /// Have the wallet sign `message`. Anything but an explicit rejection is a
    /// signing failure.
    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ChallengeError> {
        let signature = match self.wallet.sign(message).await {
            Ok(signature) => signature,
            Err(WalletError::UserRejected) => return Err(WalletError::UserRejected.into()),
            Err(WalletError::Unavailable(reason)) => {
                return Err(WalletError::Unavailable(reason).into())
            }
            Err(e) => return Err(WalletError::SigningFailed(e.to_string()).into()),
        };
        Ok(self.adapter.encode_signature(signature)?)
    }

    pub async fn authenticate(
        &self,
        signature: &[u8],
        message_id: &str,
        session_public_key: &[u8],
    ) -> Result<AuthenticatedSession, ChallengeError> {
        let result = with_timeout(
            self.authority_timeout,
            self.authority
                .authenticate(signature, message_id, session_public_key),
        )
        .await;

        let session = match result {
            Ok(session) => session,
            Err(AuthorityError::Rejected(reason)) => {
                warn!("Authority rejected signature for {}: {}", message_id, reason);
                return Err(ChallengeError::AuthenticationFailed(reason));
            }
            Err(e) => return Err(e.into()),
        };
        if session.session_id.is_empty() || session.long_lived_public_key.is_empty() {
            return Err(
                AuthorityError::Malformed("empty session id or long-lived key".to_string()).into(),
            );
        }
        info!("Authenticated session {}", session.session_id);
        Ok(session)
    }

    pub async fn get_delegation(&self, session_id: &str) -> Result<SignedDelegation, ChallengeError> {
        let delegation = with_timeout(
            self.authority_timeout,
            self.authority.get_delegation(session_id),
        )
        .await?;
        debug!(
            "Received delegation for session {} expiring at {}",
            session_id, delegation.delegation.expiration
        );
        Ok(delegation)
    }

    /// Have a relaying signer submit `call` and hand back its raw result.
    pub async fn relay_call(&self, call: &CanisterCall) -> Result<RelayedCallResponse, ChallengeError> {
        debug!("Relaying {} on {} via wallet", call.method, call.canister_id);
        Ok(self.wallet.call(call).await?)
    }
}

impl std::fmt::Debug for ChallengeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeClient")
            .field("family", &self.family())
            .field("authority_timeout", &self.authority_timeout)
            .finish()
    }
}
