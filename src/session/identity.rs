//! The logical actor behind outgoing requests.

use crate::delegation::{DelegationChain, SignedDelegation};
use crate::principal::Principal;
use crate::request_id::RequestId;
use crate::session_key::{KeyError, SessionKeyPair};
use std::sync::Arc;

/// Authentication fields attached to a signed request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    /// DER-encoded long-lived public key (`sender_pubkey`).
    pub public_key: Vec<u8>,
    /// Session-key signature over the domain-separated request id (`sender_sig`).
    pub signature: Vec<u8>,
    /// Chain authorizing the session key (`sender_delegation`).
    pub delegations: Vec<SignedDelegation>,
}

/// Session key plus the chain that lets it act for the long-lived identity.
#[derive(Debug, Clone)]
pub struct DelegatedIdentity {
    session_key: Arc<SessionKeyPair>,
    chain: DelegationChain,
}

#[derive(Debug, Clone, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Delegated(DelegatedIdentity),
}

impl Identity {
    pub fn delegated(session_key: Arc<SessionKeyPair>, chain: DelegationChain) -> Self {
        Identity::Delegated(DelegatedIdentity { session_key, chain })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    /// Principal requests are sent as: the long-lived key's self-authenticating
    /// principal, never the session key's.
    pub fn sender(&self) -> Principal {
        match self {
            Identity::Anonymous => Principal::anonymous(),
            Identity::Delegated(identity) => identity.chain.sender(),
        }
    }

    pub fn delegation_chain(&self) -> Option<&DelegationChain> {
        match self {
            Identity::Anonymous => None,
            Identity::Delegated(identity) => Some(&identity.chain),
        }
    }

    pub fn session_key(&self) -> Option<&SessionKeyPair> {
        match self {
            Identity::Anonymous => None,
            Identity::Delegated(identity) => Some(&identity.session_key),
        }
    }

    /// Sign `request_id` as the long-lived principal. Anonymous requests carry
    /// no signature.
    pub fn sign_request(&self, request_id: &RequestId) -> Result<Option<RequestSignature>, KeyError> {
        let Identity::Delegated(identity) = self else {
            return Ok(None);
        };
        let signature = identity.session_key.sign(&request_id.signable())?;
        Ok(Some(RequestSignature {
            public_key: identity.chain.public_key().to_vec(),
            signature,
            delegations: identity.chain.delegations().to_vec(),
        }))
    }
}
