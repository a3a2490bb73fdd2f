//! The current session: in-memory identity plus its persisted form.
//!
//! All mutation goes through [`SessionStore::apply`] and the persistence
//! operations, which serialize on a single writer lock so a login commit and
//! a logout can never interleave their two-entry writes.

use crate::delegation::DelegationChain;
use crate::session::identity::Identity;
use crate::session::storage::{KeyValueStorage, StorageError};
use crate::session_key::SessionKeyPair;
use crate::time::Clock;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const IDENTITY_ENTRY: &str = "identity";
const DELEGATION_ENTRY: &str = "delegation";

/// State transitions of the session.
#[derive(Debug, Clone)]
pub enum SessionAction {
    Restored(Identity),
    LoggedIn(Identity),
    LoggedOut,
}

fn reduce(_current: &Identity, action: SessionAction) -> Identity {
    match action {
        SessionAction::Restored(identity) | SessionAction::LoggedIn(identity) => identity,
        SessionAction::LoggedOut => Identity::Anonymous,
    }
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    prefix: String,
    state: RwLock<Identity>,
    writer: Mutex<()>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            clock,
            prefix: prefix.into(),
            state: RwLock::new(Identity::Anonymous),
            writer: Mutex::new(()),
        }
    }

    pub fn identity_key(&self) -> String {
        format!("{}{}", self.prefix, IDENTITY_ENTRY)
    }

    pub fn delegation_key(&self) -> String {
        format!("{}{}", self.prefix, DELEGATION_ENTRY)
    }

    /// Apply `action` to the in-memory state and return the new identity.
    pub async fn apply(&self, action: SessionAction) -> Identity {
        let mut state = self.state.write().await;
        *state = reduce(&state, action);
        state.clone()
    }

    pub async fn identity(&self) -> Identity {
        self.state.read().await.clone()
    }

    /// True only for a delegated identity whose chain has not expired.
    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.read().await;
        match state.delegation_chain() {
            Some(chain) => !chain.is_expired(self.clock.now_ns()),
            None => false,
        }
    }

    /// Load a persisted session, if a complete and valid one exists.
    ///
    /// Partial, expired or mismatched entries are cleared. A storage read
    /// failure leaves the store logged out without touching the entries.
    pub async fn restore(&self) -> Identity {
        let _writer = self.writer.lock().await;

        let entries = match self.read_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not read persisted session, continuing logged out: {}", e);
                return self.apply(SessionAction::LoggedOut).await;
            }
        };

        let identity = match entries {
            (None, None) => {
                debug!("No persisted session");
                return self.apply(SessionAction::LoggedOut).await;
            }
            (Some(key), Some(chain)) => self.decode_session(&key, &chain),
            _ => Err("only one of the session entries is present".to_string()),
        };

        match identity {
            Ok(identity) => {
                info!("Restored session for {}", identity.sender());
                self.apply(SessionAction::Restored(identity)).await
            }
            Err(reason) => {
                warn!("Discarding persisted session: {}", reason);
                if let Err(e) = self.delete_entries().await {
                    error!("Failed to clear persisted session: {}", e);
                }
                self.apply(SessionAction::LoggedOut).await
            }
        }
    }

    /// Persist a new session and make it current.
    ///
    /// Either both entries are written and the state changes, or the previous
    /// entries are put back and the state is left as it was.
    pub async fn commit(
        &self,
        session_key: Arc<SessionKeyPair>,
        chain: DelegationChain,
    ) -> Result<Identity, StorageError> {
        let _writer = self.writer.lock().await;

        let chain_json = chain.to_json().map_err(|e| StorageError::Corrupt {
            key: self.delegation_key(),
            reason: e.to_string(),
        })?;
        let previous = self.read_entries().await?;

        if let Err(e) = self.write_entries(session_key.secret_bytes(), chain_json.as_bytes()).await {
            warn!("Session commit failed, rolling back: {}", e);
            if let Err(rollback) = self.put_back(previous).await {
                error!("Rollback of persisted session failed: {}", rollback);
            }
            return Err(e);
        }

        let identity = Identity::delegated(session_key, chain);
        info!("Committed session for {}", identity.sender());
        Ok(self.apply(SessionAction::LoggedIn(identity)).await)
    }

    /// Log out: drop the in-memory session and delete both entries.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock().await;
        self.apply(SessionAction::LoggedOut).await;
        self.delete_entries().await?;
        info!("Session cleared");
        Ok(())
    }

    fn decode_session(&self, key: &[u8], chain: &[u8]) -> Result<Identity, String> {
        let session_key =
            SessionKeyPair::from_secret_bytes(key).map_err(|e| format!("session key: {}", e))?;
        let chain = std::str::from_utf8(chain)
            .map_err(|e| e.to_string())
            .and_then(|json| DelegationChain::from_json(json).map_err(|e| e.to_string()))
            .map_err(|e| format!("delegation chain: {}", e))?;
        chain
            .validate(self.clock.now_ns(), session_key.public_key_der())
            .map_err(|e| e.to_string())?;
        Ok(Identity::delegated(Arc::new(session_key), chain))
    }

    async fn read_entries(&self) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), StorageError> {
        let key = self.storage.get(&self.identity_key()).await?;
        let chain = self.storage.get(&self.delegation_key()).await?;
        Ok((key, chain))
    }

    async fn write_entries(&self, key: &[u8], chain: &[u8]) -> Result<(), StorageError> {
        self.storage.set(&self.identity_key(), key).await?;
        self.storage.set(&self.delegation_key(), chain).await
    }

    async fn delete_entries(&self) -> Result<(), StorageError> {
        self.storage.delete(&self.identity_key()).await?;
        self.storage.delete(&self.delegation_key()).await
    }

    async fn put_back(&self, previous: (Option<Vec<u8>>, Option<Vec<u8>>)) -> Result<(), StorageError> {
        for (entry, value) in [(self.identity_key(), previous.0), (self.delegation_key(), previous.1)] {
            match value {
                Some(bytes) => self.storage.set(&entry, &bytes).await?,
                None => self.storage.delete(&entry).await?,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
