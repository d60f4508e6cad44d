//! Session data model.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MalformedSession;

/// Identity metadata returned by the identity service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    /// Stable per-key identity
    pub identifier_id: String,
    /// Stable per-account identity
    pub profile_id: String,
}

/// Credentials produced by a completed sign-in transaction.
///
/// `expires_in` is the absolute moment of expiry as an RFC 3339 string, not
/// a duration. It is kept as text because caller-supplied snapshots may carry
/// a value that does not parse; see [`SessionData::expiry`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Opaque bearer credential
    pub access_token: String,
    /// Absolute expiry instant (RFC 3339)
    pub expires_in: String,
    /// Profile bound to the access token
    pub profile: SessionProfile,
}

impl SessionData {
    /// Build session data expiring at `expires_at`.
    pub fn new(
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        profile: SessionProfile,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            profile,
        }
    }

    /// Parse the stored expiry.
    pub fn expiry(&self) -> Result<DateTime<Utc>, MalformedSession> {
        parse_instant(&self.expires_in).map_err(MalformedSession)
    }

    /// Whether the token is still usable at `now`. Equal-to-now is expired,
    /// as is an expiry that does not parse.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry().map(|expiry| now < expiry).unwrap_or(false)
    }
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Parse an RFC 3339 instant into UTC.
pub(crate) fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {value:?}: {e}"))
}

// ============================================================================
// Authentication State
// ============================================================================

/// Sign-in status plus the current session, if any.
///
/// Only the session is stored; `is_signed_in` is derived from it, so a state
/// that claims to be signed in without session data cannot be built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StateSnapshot", into = "StateSnapshot")]
pub struct AuthenticationState {
    session: Option<SessionData>,
}

impl AuthenticationState {
    /// The signed-out state.
    pub fn signed_out() -> Self {
        Self { session: None }
    }

    /// A signed-in state holding `data`.
    pub fn signed_in(data: SessionData) -> Self {
        Self {
            session: Some(data),
        }
    }

    /// Build a state from its two externally visible fields.
    ///
    /// Inconsistent input (flag set without data, or data with the flag
    /// cleared) loads as signed out.
    pub fn from_parts(is_signed_in: bool, session_data: Option<SessionData>) -> Self {
        match (is_signed_in, session_data) {
            (true, Some(data)) => Self::signed_in(data),
            (false, None) => Self::signed_out(),
            (flag, data) => {
                tracing::warn!(
                    is_signed_in = flag,
                    has_session_data = data.is_some(),
                    "inconsistent authentication snapshot; loading as signed out"
                );
                Self::signed_out()
            }
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_data(&self) -> Option<&SessionData> {
        self.session.as_ref()
    }

    pub(crate) fn take(&mut self) -> Option<SessionData> {
        self.session.take()
    }
}

/// Serialized shape of [`AuthenticationState`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateSnapshot {
    #[serde(default)]
    is_signed_in: bool,
    #[serde(default)]
    session_data: Option<SessionData>,
}

impl From<StateSnapshot> for AuthenticationState {
    fn from(s: StateSnapshot) -> Self {
        AuthenticationState::from_parts(s.is_signed_in, s.session_data)
    }
}

impl From<AuthenticationState> for StateSnapshot {
    fn from(state: AuthenticationState) -> Self {
        StateSnapshot {
            is_signed_in: state.is_signed_in(),
            session_data: state.session,
        }
    }
}

// ============================================================================
// Key Material
// ============================================================================

/// Public key bytes as reported by a signing capability.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex, the form sent to the identity service.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Signature bytes over a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}
