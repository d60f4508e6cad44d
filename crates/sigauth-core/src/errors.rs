//! Error types for sigauth core.
//!
//! Every failure a caller can observe from the session controller is an
//! [`AuthError`]. Remote failures carry the [`RemoteStep`] that failed so
//! callers can tell the nonce, login and token steps apart without matching
//! on message text.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Remote Steps
// ============================================================================

/// One of the three remote calls that make up a sign-in transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStep {
    /// Challenge request bound to the public key
    Nonce,
    /// Proof of key ownership
    Login,
    /// Login proof exchanged for an access token
    Token,
}

impl RemoteStep {
    /// All steps in protocol order.
    pub const ALL: [RemoteStep; 3] = [RemoteStep::Nonce, RemoteStep::Login, RemoteStep::Token];

    /// Lowercase name used in logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStep::Nonce => "nonce",
            RemoteStep::Login => "login",
            RemoteStep::Token => "token",
        }
    }
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Collaborator Errors
// ============================================================================

/// Errors returned by an identity service transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request never produced a response (connect, TLS, timeout)
    #[error("http error: {0}")]
    Http(String),

    /// Service answered with a non-2xx status
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response arrived but could not be used
    #[error("bad response: {0}")]
    BadResponse(String),
}

/// Failure reported by a signing capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SignerError(pub String);

/// Errors raised by the signer gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Lock state reports the key as locked
    #[error("signer unavailable: key is locked")]
    Closed,

    /// Key was unlocked but the signer itself failed
    #[error("signer failed: {0}")]
    Signer(#[from] SignerError),
}

// ============================================================================
// Session Errors
// ============================================================================

/// Stored session data failed shape validation.
///
/// The controller treats this exactly like an expired session: it triggers a
/// refresh and is never surfaced to the caller on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed session: {0}")]
pub struct MalformedSession(pub String);

/// Errors surfaced by the session controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Signing was attempted while the key is locked
    #[error("signer gate closed: key is locked")]
    GateClosed,

    /// Key was unlocked but signing failed
    #[error("signer failed: {0}")]
    Signer(String),

    /// A remote step failed; later steps were not attempted
    #[error("{step} step failed: {reason}")]
    RemoteStepFailed { step: RemoteStep, reason: RemoteError },

    /// Operation requires an existing session
    #[error("not signed in")]
    NotSignedIn,
}

impl AuthError {
    /// The remote step that failed, if this is a remote failure.
    pub fn failed_step(&self) -> Option<RemoteStep> {
        match self {
            AuthError::RemoteStepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether the failure came from the key being locked.
    pub fn is_gate_closed(&self) -> bool {
        matches!(self, AuthError::GateClosed)
    }
}

impl From<GateError> for AuthError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Closed => AuthError::GateClosed,
            GateError::Signer(inner) => AuthError::Signer(inner.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_step_display() {
        assert_eq!(RemoteStep::Nonce.to_string(), "nonce");
        assert_eq!(RemoteStep::Login.to_string(), "login");
        assert_eq!(RemoteStep::Token.to_string(), "token");
    }

    #[test]
    fn test_remote_step_serde_lowercase() {
        let json = serde_json::to_string(&RemoteStep::Login).unwrap();
        assert_eq!(json, "\"login\"");
    }

    #[test]
    fn test_failed_step() {
        let err = AuthError::RemoteStepFailed {
            step: RemoteStep::Token,
            reason: RemoteError::Status {
                status: 500,
                body: "boom".into(),
            },
        };
        assert_eq!(err.failed_step(), Some(RemoteStep::Token));
        assert_eq!(AuthError::NotSignedIn.failed_step(), None);
        assert!(err.to_string().starts_with("token step failed"));
    }

    #[test]
    fn test_gate_error_conversion() {
        assert_eq!(AuthError::from(GateError::Closed), AuthError::GateClosed);
        assert_eq!(
            AuthError::from(GateError::Signer(SignerError("hw fault".into()))),
            AuthError::Signer("hw fault".into())
        );
        assert!(AuthError::GateClosed.is_gate_closed());
    }
}
