//! Signer gate.
//!
//! Every cryptographic operation goes through [`SignerGate`], which asks the
//! lock-state provider before delegating to the signing capability. The
//! lock state is re-read on every call; it can change between a check and
//! the next use.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{GateError, SignerError};
use crate::types::{PublicKey, Signature};

/// Reports whether the key is currently unlocked.
pub trait LockState: Send + Sync {
    fn is_unlocked(&self) -> bool;
}

/// External capability that holds the private key.
#[async_trait]
pub trait SigningCapability: Send + Sync {
    /// Public half of the signing key.
    async fn public_key(&self) -> Result<PublicKey, SignerError>;

    /// Sign `message` with the private key.
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

/// Lock-state-aware boundary around a signing capability.
#[derive(Clone)]
pub struct SignerGate {
    lock: Arc<dyn LockState>,
    signer: Arc<dyn SigningCapability>,
}

impl SignerGate {
    /// Create a gate over `signer`, guarded by `lock`.
    pub fn new(lock: Arc<dyn LockState>, signer: Arc<dyn SigningCapability>) -> Self {
        Self { lock, signer }
    }

    /// Whether signing is currently allowed.
    pub fn is_available(&self) -> bool {
        self.lock.is_unlocked()
    }

    /// Public key of the underlying signer, if unlocked.
    pub async fn public_key(&self) -> Result<PublicKey, GateError> {
        self.ensure_open()?;
        Ok(self.signer.public_key().await?)
    }

    /// Sign `message`, if unlocked.
    pub async fn sign(&self, message: &[u8]) -> Result<Signature, GateError> {
        self.ensure_open()?;
        Ok(self.signer.sign_message(message).await?)
    }

    fn ensure_open(&self) -> Result<(), GateError> {
        if self.is_available() {
            Ok(())
        } else {
            tracing::debug!("signer gate closed");
            Err(GateError::Closed)
        }
    }
}
