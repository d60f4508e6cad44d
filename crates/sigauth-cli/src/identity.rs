//! Client identity management
//!
//! This module handles:
//! - Ed25519 signing key generation
//! - File-based key storage with restrictive permissions
//! - The keyring that backs the signer gate: locked until a key is loaded

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigauth_core::keys::LocalKeySigner;
use sigauth_core::{LockState, PublicKey, SignerError, SignerGate, Signature, SigningCapability};

use crate::secret_file::write_private;

/// Identity management errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity not found at {0}")]
    NotFound(PathBuf),

    #[error("Identity already exists at {0} (use --force to replace it)")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid key data: {0}")]
    InvalidKeyData(String),
}

/// Identity information for display
#[derive(Debug, Clone, Serialize)]
pub struct IdentityInfo {
    /// Short identifier (first 16 hex chars of the public key)
    pub key_id: String,
    /// Full hex of the signing public key
    pub public_key: String,
    /// When the identity was created (RFC3339)
    pub created_at: String,
    /// Key algorithm used
    pub key_algorithm: String,
    /// Where the key is stored
    pub path: PathBuf,
}

/// Serializable identity data for file storage
#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    /// Version for future compatibility
    version: u32,
    /// Ed25519 signing private key seed (32 bytes, hex encoded)
    sign_seed: String,
    /// When the identity was created (RFC3339)
    created_at: String,
}

impl StoredIdentity {
    const CURRENT_VERSION: u32 = 1;

    fn new(sign_seed: &[u8; 32], created_at: DateTime<Utc>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            sign_seed: hex::encode(sign_seed),
            created_at: created_at.to_rfc3339(),
        }
    }

    fn seed(&self) -> Result<[u8; 32], IdentityError> {
        if self.version != Self::CURRENT_VERSION {
            return Err(IdentityError::InvalidKeyData(format!(
                "unsupported identity version {}",
                self.version
            )));
        }
        let bytes = hex::decode(&self.sign_seed)
            .map_err(|e| IdentityError::InvalidKeyData(e.to_string()))?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            IdentityError::InvalidKeyData(format!("seed must be 32 bytes, got {}", bytes.len()))
        })
    }
}

/// File-based key storage
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn store(&self, identity: &StoredIdentity) -> Result<(), IdentityError> {
        let json = serde_json::to_string_pretty(identity)
            .map_err(|e| IdentityError::Serialization(e.to_string()))?;
        write_private(&self.path, json.as_bytes())?;
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredIdentity>, IdentityError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = fs::File::open(&self.path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let stored: StoredIdentity = serde_json::from_str(&contents)
            .map_err(|e| IdentityError::Serialization(e.to_string()))?;

        Ok(Some(stored))
    }

    /// Generate and store a new key. Refuses to overwrite unless `force`.
    pub fn generate(&self, force: bool) -> Result<IdentityInfo, IdentityError> {
        if self.exists() && !force {
            return Err(IdentityError::AlreadyExists(self.path.clone()));
        }
        let signer = LocalKeySigner::generate();
        let stored = StoredIdentity::new(&signer.seed(), Utc::now());
        self.store(&stored)?;
        tracing::info!(path = %self.path.display(), "generated new identity");
        Ok(self.info_for(&signer, &stored))
    }

    /// Load the key, if one has been stored.
    pub fn open(&self) -> Result<Option<(LocalKeySigner, IdentityInfo)>, IdentityError> {
        let Some(stored) = self.load()? else {
            return Ok(None);
        };
        let signer = LocalKeySigner::from_seed(&stored.seed()?);
        let info = self.info_for(&signer, &stored);
        Ok(Some((signer, info)))
    }

    /// Display information for the stored key.
    pub fn info(&self) -> Result<IdentityInfo, IdentityError> {
        self.open()?
            .map(|(_, info)| info)
            .ok_or_else(|| IdentityError::NotFound(self.path.clone()))
    }

    fn info_for(&self, signer: &LocalKeySigner, stored: &StoredIdentity) -> IdentityInfo {
        let public_key = signer.verifying_key().to_hex();
        IdentityInfo {
            key_id: public_key.chars().take(16).collect(),
            public_key,
            created_at: stored.created_at.clone(),
            key_algorithm: "Ed25519".to_string(),
            path: self.path.clone(),
        }
    }
}

/// In-process key holder that doubles as the lock-state provider.
///
/// The keyring reports unlocked exactly while a key is loaded.
#[derive(Default)]
pub struct Keyring {
    key: RwLock<Option<LocalKeySigner>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the key from `file`. A missing file leaves the keyring locked.
    pub fn unlock_from(&self, file: &KeyFile) -> Result<bool, IdentityError> {
        match file.open()? {
            Some((signer, info)) => {
                tracing::debug!(key_id = %info.key_id, "keyring unlocked");
                *self.key.write() = Some(signer);
                Ok(true)
            }
            None => {
                tracing::debug!(path = %file.path().display(), "no identity, keyring stays locked");
                Ok(false)
            }
        }
    }

    pub fn unlock_with(&self, signer: LocalKeySigner) {
        *self.key.write() = Some(signer);
    }

    /// Drop the key from memory.
    pub fn lock(&self) {
        *self.key.write() = None;
    }

    /// Gate whose lock state and signer are both this keyring.
    pub fn gate(self: &Arc<Self>) -> SignerGate {
        SignerGate::new(self.clone(), self.clone())
    }

    fn loaded(&self) -> Result<LocalKeySigner, SignerError> {
        self.key
            .read()
            .clone()
            .ok_or_else(|| SignerError("no key loaded".to_string()))
    }
}

impl LockState for Keyring {
    fn is_unlocked(&self) -> bool {
        self.key.read().is_some()
    }
}

#[async_trait]
impl SigningCapability for Keyring {
    async fn public_key(&self) -> Result<PublicKey, SignerError> {
        self.loaded()?.public_key().await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.loaded()?.sign_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigauth_core::keys::verify_signature;
    use sigauth_core::GateError;
    use tempfile::TempDir;

    fn key_file(temp_dir: &TempDir) -> KeyFile {
        KeyFile::new(temp_dir.path().join("keys").join("identity.json"))
    }

    #[test]
    fn test_generate_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let file = key_file(&temp_dir);
        assert!(!file.exists());

        let created = file.generate(false).unwrap();
        assert!(file.exists());
        assert_eq!(created.key_id.len(), 16);
        assert_eq!(created.public_key.len(), 64);
        assert_eq!(created.key_algorithm, "Ed25519");

        let (signer, info) = file.open().unwrap().unwrap();
        assert_eq!(info.public_key, created.public_key);
        assert_eq!(signer.verifying_key().to_hex(), created.public_key);
    }

    #[test]
    fn test_generate_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let file = key_file(&temp_dir);
        let first = file.generate(false).unwrap();

        assert!(matches!(file.generate(false), Err(IdentityError::AlreadyExists(_))));

        let replaced = file.generate(true).unwrap();
        assert_ne!(replaced.public_key, first.public_key);
    }

    #[test]
    fn test_info_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(key_file(&temp_dir).info(), Err(IdentityError::NotFound(_))));
    }

    #[test]
    fn test_rejects_bad_seed() {
        let temp_dir = TempDir::new().unwrap();
        let file = key_file(&temp_dir);
        let mut stored = StoredIdentity::new(&[1u8; 32], Utc::now());
        stored.sign_seed = "abcd".to_string();
        file.store(&stored).unwrap();

        assert!(matches!(file.open(), Err(IdentityError::InvalidKeyData(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let file = key_file(&temp_dir);
        file.generate(false).unwrap();

        let mode = fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_keyring_locked_until_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let file = key_file(&temp_dir);
        let keyring = Arc::new(Keyring::new());
        let gate = keyring.gate();

        assert!(!keyring.unlock_from(&file).unwrap());
        assert!(!gate.is_available());
        assert_eq!(gate.sign(b"m").await, Err(GateError::Closed));

        file.generate(false).unwrap();
        assert!(keyring.unlock_from(&file).unwrap());
        assert!(gate.is_available());

        let public_key = gate.public_key().await.unwrap();
        let signature = gate.sign(b"m").await.unwrap();
        assert!(verify_signature(&public_key, b"m", signature.as_bytes()));

        keyring.lock();
        assert_eq!(gate.public_key().await, Err(GateError::Closed));
    }

    #[tokio::test]
    async fn test_keyring_unlock_with_signer() {
        let keyring = Arc::new(Keyring::new());
        let gate = keyring.gate();
        let signer = LocalKeySigner::generate();
        let expected = signer.verifying_key();

        keyring.unlock_with(signer);

        assert!(keyring.is_unlocked());
        assert_eq!(gate.public_key().await.unwrap(), expected);
        let signature = gate.sign(b"m").await.unwrap();
        assert!(verify_signature(&expected, b"m", signature.as_bytes()));
    }
}
