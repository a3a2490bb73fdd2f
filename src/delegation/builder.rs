//! Turns a signed delegation from the remote authority into a verified chain.

use crate::delegation::error::DelegationError;
use crate::delegation::types::{DelegationChain, SignedDelegation};
use crate::delegation::verifier::DelegationVerifier;
use crate::session_key::SessionKeyPair;
use crate::time::Clock;
use log::{info, warn};
use std::sync::Arc;

/// Builds single-hop chains `long-lived key -> session key`.
#[derive(Clone)]
pub struct DelegationChainBuilder {
    verifier: Arc<DelegationVerifier>,
    clock: Arc<dyn Clock>,
}

impl DelegationChainBuilder {
    pub fn new(verifier: Arc<DelegationVerifier>, clock: Arc<dyn Clock>) -> Self {
        Self { verifier, clock }
    }

    /// Validate `signed_delegation` and wrap it into a chain rooted at
    /// `long_lived_public_key`.
    ///
    /// Checks, in order:
    /// 1. The delegation was issued to this session's public key
    /// 2. The delegation has not already expired
    /// 3. The signature verifies against the long-lived key
    ///
    /// A failed build means the session keypair must be discarded.
    pub fn build(
        &self,
        session_keypair: &SessionKeyPair,
        signed_delegation: SignedDelegation,
        long_lived_public_key: &[u8],
    ) -> Result<DelegationChain, DelegationError> {
        let delegation = &signed_delegation.delegation;

        // 1. Issued to this session
        if delegation.delegated_public_key != session_keypair.public_key_der() {
            warn!("Delegation was issued to a different session key");
            return Err(DelegationError::KeyMismatch {
                expected: hex::encode(session_keypair.public_key_der()),
                actual: hex::encode(&delegation.delegated_public_key),
            });
        }

        // 2. Not expired
        let now = self.clock.now_ns();
        if delegation.is_expired(now) {
            warn!(
                "Delegation expired at {} (now: {})",
                delegation.expiration, now
            );
            return Err(DelegationError::Expired {
                expiration: delegation.expiration,
                now,
            });
        }

        // 3. Signed by the long-lived identity
        self.verifier.verify(
            long_lived_public_key,
            &delegation.signable(),
            &signed_delegation.signature,
        )?;

        let chain = DelegationChain::new(long_lived_public_key.to_vec(), vec![signed_delegation])?;
        info!(
            "Built delegation chain for {} expiring at {}",
            chain.sender(),
            chain.expiration()
        );
        Ok(chain)
    }

    /// Re-verify every hop of an existing chain against `session_public_key`.
    pub fn verify_chain(
        &self,
        chain: &DelegationChain,
        session_public_key: &[u8],
    ) -> Result<(), DelegationError> {
        chain.validate(self.clock.now_ns(), session_public_key)?;
        for (signer, signed) in chain.links() {
            self.verifier
                .verify(signer, &signed.delegation.signable(), &signed.signature)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DelegationChainBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationChainBuilder")
            .field("verifier", &self.verifier)
            .field("now_ns", &self.clock.now_ns())
            .finish()
    }
}
