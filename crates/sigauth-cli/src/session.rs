//! Session persistence and controller wiring
//!
//! Each CLI invocation loads the persisted authentication state, runs one
//! controller operation and writes the resulting state back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use sigauth_core::http::HttpIdentityClient;
use sigauth_core::{AuthenticationState, IdentityTransport, RemoteError, SessionController};

use crate::config::Config;
use crate::identity::{IdentityError, KeyFile, Keyring};
use crate::secret_file::write_private;

/// Session persistence errors
#[derive(Debug, Error)]
pub enum SessionFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt session file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors opening a session context
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    SessionFile(#[from] SessionFileError),

    #[error("Failed to build identity service client: {0}")]
    Transport(#[from] RemoteError),
}

/// JSON file holding the `AuthenticationState` snapshot.
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file is a signed-out state.
    pub fn load(&self) -> Result<AuthenticationState, SessionFileError> {
        if !self.path.exists() {
            return Ok(AuthenticationState::signed_out());
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| SessionFileError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write the snapshot atomically; the file holds a bearer token.
    pub fn save(&self, state: &AuthenticationState) -> Result<(), SessionFileError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| SessionFileError::Serialization(e.to_string()))?;
        write_private(&self.path, json.as_bytes())?;
        Ok(())
    }
}

/// Controller plus the files it was loaded from.
pub struct SessionContext<T: IdentityTransport> {
    controller: SessionController<T>,
    file: SessionFile,
    keyring: Arc<Keyring>,
}

impl SessionContext<HttpIdentityClient> {
    /// Build a context talking to the configured identity service.
    pub fn from_config(config: &Config) -> Result<Self, ContextError> {
        let client = HttpIdentityClient::new(
            config.service.base_url.clone(),
            Duration::from_secs(config.service.timeout_seconds),
        )?;
        Self::open(config, Arc::new(client))
    }
}

impl<T: IdentityTransport> SessionContext<T> {
    /// Unlock the keyring from the key file (if any), load the persisted
    /// state and build a controller over `transport`.
    pub fn open(config: &Config, transport: Arc<T>) -> Result<Self, ContextError> {
        let keyring = Arc::new(Keyring::new());
        keyring.unlock_from(&KeyFile::new(config.key_path()))?;

        let file = SessionFile::new(config.state_path());
        let state = file.load()?;
        tracing::debug!(
            path = %file.path().display(),
            signed_in = state.is_signed_in(),
            "loaded session state"
        );

        let mut controller = SessionController::with_state(transport, keyring.gate(), state);
        controller.set_namespace(config.service.namespace.clone());

        Ok(Self {
            controller,
            file,
            keyring,
        })
    }

    pub fn controller(&self) -> &SessionController<T> {
        &self.controller
    }

    pub fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    /// Write the controller's current state back to disk.
    pub fn persist(&self) -> Result<(), SessionFileError> {
        self.file.save(&self.controller.state())
    }

    /// Summary of the stored session at `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        SessionStatus::of(
            &self.controller.state(),
            self.controller.is_signer_available(),
            now,
        )
    }
}

/// Display summary of the session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub signed_in: bool,
    pub signer_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Whether the next token read will refresh
    pub expired: bool,
}

impl SessionStatus {
    pub fn of(state: &AuthenticationState, signer_available: bool, now: DateTime<Utc>) -> Self {
        match state.session_data() {
            Some(data) => Self {
                signed_in: true,
                signer_available,
                identifier_id: Some(data.profile.identifier_id.clone()),
                profile_id: Some(data.profile.profile_id.clone()),
                expires_at: Some(data.expires_in.clone()),
                expired: !data.is_valid_at(now),
            },
            None => Self {
                signed_in: false,
                signer_available,
                identifier_id: None,
                profile_id: None,
                expires_at: None,
                expired: false,
            },
        }
    }
}
