//! The remote authority that issues challenges and delegations.

use crate::challenge::error::AuthorityError;
use crate::challenge::wallet::WalletAccount;
use crate::delegation::SignedDelegation;
use async_trait::async_trait;
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Message the wallet must sign, plus its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub message: Vec<u8>,
    pub message_id: String,
}

/// Result of a successful signature check by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub session_id: String,
    /// DER-encoded long-lived public key of the user.
    pub long_lived_public_key: Vec<u8>,
}

/// RPC surface of the remote authority. Wire encoding is up to the implementor.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn prepare_message(
        &self,
        account: &WalletAccount,
    ) -> Result<PreparedMessage, AuthorityError>;

    async fn authenticate(
        &self,
        signature: &[u8],
        message_id: &str,
        session_public_key: &[u8],
    ) -> Result<AuthenticatedSession, AuthorityError>;

    async fn get_delegation(&self, session_id: &str) -> Result<SignedDelegation, AuthorityError>;
}

/// Run an authority call under `limit`, mapping elapsed time to
/// [`AuthorityError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AuthorityError>
where
    F: Future<Output = Result<T, AuthorityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Authority call exceeded {:?}", limit);
            Err(AuthorityError::Timeout(limit))
        }
    }
}
