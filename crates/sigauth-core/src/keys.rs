use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

use crate::errors::SignerError;
use crate::gate::SigningCapability;
use crate::types::{PublicKey, Signature};

/// Ed25519 signing capability backed by an in-process key.
#[derive(Clone)]
pub struct LocalKeySigner {
    key: SigningKey,
}

impl LocalKeySigner {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a signer from its 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// The 32-byte seed. Handle with care.
    pub fn seed(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    pub fn verifying_key(&self) -> PublicKey {
        PublicKey::new(self.key.verifying_key().to_bytes().to_vec())
    }
}

#[async_trait]
impl SigningCapability for LocalKeySigner {
    async fn public_key(&self) -> Result<PublicKey, SignerError> {
        Ok(self.verifying_key())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        let signature = self.key.sign(message);
        Ok(Signature::new(signature.to_bytes().to_vec()))
    }
}

/// Verify an Ed25519 `signature` over `message`. Malformed keys or
/// signatures verify as false.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key.as_bytes()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}
