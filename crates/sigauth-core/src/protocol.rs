//! Remote identity protocol.
//!
//! A sign-in transaction is a strictly ordered sequence:
//!
//! 1. fetch the public key through the signer gate
//! 2. `request_nonce` - server challenge bound to the public key
//! 3. sign the login message through the signer gate
//! 4. `login` - proves key ownership, returns profile and a login token
//! 5. `exchange_token` - login token exchanged for an access token
//!
//! A failing stage stops the transaction; nothing after it runs. The outcome
//! is either complete [`SessionData`] or a [`ProtocolFailure`] naming the
//! stage that failed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AuthError, GateError, RemoteError, RemoteStep};
use crate::gate::SignerGate;
use crate::types::{parse_instant, SessionData, SessionProfile};

/// Default namespace prefix of the signed login message.
pub const DEFAULT_NAMESPACE: &str = "sigauth";

// ============================================================================
// Wire Types
// ============================================================================

/// Response to a nonce request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    /// Single-use challenge
    pub nonce: String,
    /// When the challenge stops being accepted (RFC 3339)
    pub expires_at: String,
}

/// Body of a login request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Hex public key
    pub public_key: String,
    /// Hex signature over `raw_message`
    pub signature: String,
    /// The exact message that was signed
    pub raw_message: String,
    /// Opaque analytics identifier, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_id: Option<String>,
}

/// Response to a successful login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub profile: SessionProfile,
    /// Login proof to exchange for an access token
    pub token: String,
}

/// Response to a token exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    /// Absolute expiry of the access token (RFC 3339)
    pub expires_at: String,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Transport to the remote identity service.
#[async_trait]
pub trait IdentityTransport: Send + Sync {
    /// Obtain a single-use challenge bound to `public_key` (hex).
    async fn request_nonce(&self, public_key: &str) -> Result<NonceResponse, RemoteError>;

    /// Prove ownership of the key.
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, RemoteError>;

    /// Exchange a login proof for an access token.
    async fn exchange_token(&self, login_token: &str) -> Result<TokenResponse, RemoteError>;
}

/// Supplies an opaque analytics identifier forwarded with the login request.
pub trait MetricsIdentity: Send + Sync {
    fn metrics_id(&self) -> Option<String>;
}

// ============================================================================
// Outcome
// ============================================================================

/// Where a sign-in transaction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolFailure {
    /// Public key could not be read through the gate; no remote call made
    PublicKey(GateError),
    /// Nonce request failed
    Nonce(RemoteError),
    /// Signing the nonce failed; only the nonce step ran
    Sign(GateError),
    /// Login failed
    Login(RemoteError),
    /// Token exchange failed
    Token(RemoteError),
}

impl ProtocolFailure {
    /// Remote steps that completed before the failure.
    pub fn completed_steps(&self) -> &'static [RemoteStep] {
        match self {
            ProtocolFailure::PublicKey(_) | ProtocolFailure::Nonce(_) => &[],
            ProtocolFailure::Sign(_) | ProtocolFailure::Login(_) => &[RemoteStep::Nonce],
            ProtocolFailure::Token(_) => &[RemoteStep::Nonce, RemoteStep::Login],
        }
    }

    /// Short name of the failing stage, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            ProtocolFailure::PublicKey(_) => "public_key",
            ProtocolFailure::Nonce(_) => "nonce",
            ProtocolFailure::Sign(_) => "sign",
            ProtocolFailure::Login(_) => "login",
            ProtocolFailure::Token(_) => "token",
        }
    }
}

impl fmt::Display for ProtocolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFailure::PublicKey(e) | ProtocolFailure::Sign(e) => {
                write!(f, "{} stage failed: {}", self.stage(), e)
            }
            ProtocolFailure::Nonce(e) | ProtocolFailure::Login(e) | ProtocolFailure::Token(e) => {
                write!(f, "{} stage failed: {}", self.stage(), e)
            }
        }
    }
}

impl std::error::Error for ProtocolFailure {}

impl From<ProtocolFailure> for AuthError {
    fn from(failure: ProtocolFailure) -> Self {
        match failure {
            ProtocolFailure::PublicKey(e) | ProtocolFailure::Sign(e) => e.into(),
            ProtocolFailure::Nonce(reason) => AuthError::RemoteStepFailed {
                step: RemoteStep::Nonce,
                reason,
            },
            ProtocolFailure::Login(reason) => AuthError::RemoteStepFailed {
                step: RemoteStep::Login,
                reason,
            },
            ProtocolFailure::Token(reason) => AuthError::RemoteStepFailed {
                step: RemoteStep::Token,
                reason,
            },
        }
    }
}

// ============================================================================
// Sign-in Transaction
// ============================================================================

/// Build the message signed during login.
pub fn login_message(namespace: &str, nonce: &str, public_key_hex: &str) -> String {
    format!("{namespace}:{nonce}:{public_key_hex}")
}

/// Runs sign-in transactions against an identity service.
pub struct SignInProtocol<T: IdentityTransport> {
    transport: Arc<T>,
    gate: SignerGate,
    namespace: String,
    metrics: Option<Arc<dyn MetricsIdentity>>,
}

impl<T: IdentityTransport> SignInProtocol<T> {
    pub fn new(transport: Arc<T>, gate: SignerGate) -> Self {
        Self {
            transport,
            gate,
            namespace: DEFAULT_NAMESPACE.to_string(),
            metrics: None,
        }
    }

    /// Set the login message namespace.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    /// Attach a metrics identity source.
    pub fn set_metrics(&mut self, metrics: Arc<dyn MetricsIdentity>) {
        self.metrics = Some(metrics);
    }

    pub fn gate(&self) -> &SignerGate {
        &self.gate
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Run one complete transaction.
    pub async fn run(&self) -> Result<SessionData, ProtocolFailure> {
        let public_key = self
            .gate
            .public_key()
            .await
            .map_err(ProtocolFailure::PublicKey)?
            .to_hex();

        debug!(step = "nonce", "requesting nonce");
        let nonce = self
            .transport
            .request_nonce(&public_key)
            .await
            .and_then(validate_nonce)
            .map_err(ProtocolFailure::Nonce)?;

        let raw_message = login_message(&self.namespace, &nonce.nonce, &public_key);
        let signature = self
            .gate
            .sign(raw_message.as_bytes())
            .await
            .map_err(ProtocolFailure::Sign)?;

        debug!(step = "login", "submitting signed nonce");
        let request = LoginRequest {
            public_key,
            signature: signature.to_hex(),
            raw_message,
            metrics_id: self.metrics.as_ref().and_then(|m| m.metrics_id()),
        };
        let login = self
            .transport
            .login(&request)
            .await
            .and_then(validate_login)
            .map_err(ProtocolFailure::Login)?;

        debug!(step = "token", "exchanging login token");
        let token = self
            .transport
            .exchange_token(&login.token)
            .await
            .and_then(validate_token)
            .map_err(ProtocolFailure::Token)?;

        Ok(SessionData {
            access_token: token.access_token,
            expires_in: token.expires_at,
            profile: login.profile,
        })
    }
}

fn validate_nonce(response: NonceResponse) -> Result<NonceResponse, RemoteError> {
    if response.nonce.is_empty() {
        return Err(RemoteError::BadResponse("empty nonce".into()));
    }
    Ok(response)
}

fn validate_login(response: LoginResponse) -> Result<LoginResponse, RemoteError> {
    if response.token.is_empty() {
        return Err(RemoteError::BadResponse("empty login token".into()));
    }
    if response.profile.identifier_id.is_empty() || response.profile.profile_id.is_empty() {
        return Err(RemoteError::BadResponse("incomplete profile".into()));
    }
    Ok(response)
}

fn validate_token(response: TokenResponse) -> Result<TokenResponse, RemoteError> {
    if response.access_token.is_empty() {
        return Err(RemoteError::BadResponse("empty access token".into()));
    }
    parse_instant(&response.expires_at).map_err(RemoteError::BadResponse)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{CallCounts, MockIdentityService, SwitchableLock};
    use crate::keys::{verify_signature, LocalKeySigner};
    use crate::types::PublicKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn protocol_with(
        service: Arc<MockIdentityService>,
        lock: Arc<dyn crate::gate::LockState>,
    ) -> SignInProtocol<MockIdentityService> {
        let signer = Arc::new(LocalKeySigner::generate());
        SignInProtocol::new(service, SignerGate::new(lock, signer))
    }

    /// Unlocked for the first `n` checks, locked afterwards.
    struct UnlockedFor(AtomicUsize);

    impl crate::gate::LockState for UnlockedFor {
        fn is_unlocked(&self) -> bool {
            self.0
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    struct FixedMetrics;

    impl MetricsIdentity for FixedMetrics {
        fn metrics_id(&self) -> Option<String> {
            Some("metrics-42".into())
        }
    }

    #[tokio::test]
    async fn test_full_transaction() {
        let service = Arc::new(MockIdentityService::new());
        let protocol = protocol_with(service.clone(), Arc::new(SwitchableLock::unlocked()));

        let data = protocol.run().await.unwrap();

        assert_eq!(data.access_token, "issued-access-token-1");
        assert!(data.expiry().is_ok());
        assert_eq!(data.profile, service.profile());
        assert_eq!(
            service.calls(),
            CallCounts {
                nonce: 1,
                login: 1,
                token: 1
            }
        );
    }

    #[tokio::test]
    async fn test_login_message_is_signed() {
        let service = Arc::new(MockIdentityService::new());
        let mut protocol = protocol_with(service.clone(), Arc::new(SwitchableLock::unlocked()));
        protocol.set_namespace("wallet");
        protocol.set_metrics(Arc::new(FixedMetrics));

        protocol.run().await.unwrap();

        let request = service.last_login().unwrap();
        assert_eq!(
            request.raw_message,
            login_message("wallet", "nonce-1", &request.public_key)
        );
        assert_eq!(request.metrics_id.as_deref(), Some("metrics-42"));

        let public_key = PublicKey::new(hex::decode(&request.public_key).unwrap());
        let signature = hex::decode(&request.signature).unwrap();
        assert!(verify_signature(
            &public_key,
            request.raw_message.as_bytes(),
            &signature
        ));
    }

    #[tokio::test]
    async fn test_nonce_failure_stops_transaction() {
        let service = Arc::new(MockIdentityService::new());
        service.fail_at(RemoteStep::Nonce);
        let protocol = protocol_with(service.clone(), Arc::new(SwitchableLock::unlocked()));

        let failure = protocol.run().await.unwrap_err();

        assert!(matches!(failure, ProtocolFailure::Nonce(_)));
        assert!(failure.completed_steps().is_empty());
        assert_eq!(service.calls(), CallCounts { nonce: 1, login: 0, token: 0 });
    }

    #[tokio::test]
    async fn test_login_failure_skips_token() {
        let service = Arc::new(MockIdentityService::new());
        service.fail_at(RemoteStep::Login);
        let protocol = protocol_with(service.clone(), Arc::new(SwitchableLock::unlocked()));

        let failure = protocol.run().await.unwrap_err();

        assert!(matches!(failure, ProtocolFailure::Login(_)));
        assert_eq!(failure.completed_steps(), &[RemoteStep::Nonce]);
        assert_eq!(service.calls(), CallCounts { nonce: 1, login: 1, token: 0 });
    }

    #[tokio::test]
    async fn test_token_failure_reports_completed_steps() {
        let service = Arc::new(MockIdentityService::new());
        service.fail_at(RemoteStep::Token);
        let protocol = protocol_with(service.clone(), Arc::new(SwitchableLock::unlocked()));

        let failure = protocol.run().await.unwrap_err();

        assert!(matches!(failure, ProtocolFailure::Token(_)));
        assert_eq!(
            failure.completed_steps(),
            &[RemoteStep::Nonce, RemoteStep::Login]
        );
        let err: AuthError = failure.into();
        assert_eq!(err.failed_step(), Some(RemoteStep::Token));
    }

    #[tokio::test]
    async fn test_locked_gate_makes_no_remote_calls() {
        let service = Arc::new(MockIdentityService::new());
        let protocol = protocol_with(service.clone(), Arc::new(SwitchableLock::locked()));

        let failure = protocol.run().await.unwrap_err();

        assert_eq!(failure, ProtocolFailure::PublicKey(GateError::Closed));
        assert_eq!(service.calls(), CallCounts::default());
        assert_eq!(AuthError::from(failure), AuthError::GateClosed);
    }

    #[tokio::test]
    async fn test_gate_closing_after_nonce_aborts_before_login() {
        let service = Arc::new(MockIdentityService::new());
        // One check for the public key, then locked before signing
        let protocol = protocol_with(service.clone(), Arc::new(UnlockedFor(AtomicUsize::new(1))));

        let failure = protocol.run().await.unwrap_err();

        assert_eq!(failure, ProtocolFailure::Sign(GateError::Closed));
        assert_eq!(failure.completed_steps(), &[RemoteStep::Nonce]);
        assert_eq!(service.calls(), CallCounts { nonce: 1, login: 0, token: 0 });
    }

    #[test]
    fn test_validate_token_rejects_bad_expiry() {
        let response = TokenResponse {
            access_token: "tok".into(),
            expires_at: "soon".into(),
        };
        assert!(matches!(
            validate_token(response),
            Err(RemoteError::BadResponse(_))
        ));
    }

    #[test]
    fn test_validate_login_rejects_incomplete_profile() {
        let response = LoginResponse {
            profile: SessionProfile {
                identifier_id: String::new(),
                profile_id: "p".into(),
            },
            token: "login".into(),
        };
        assert!(validate_login(response).is_err());
    }

    #[test]
    fn test_wire_format_camel_case() {
        let request = LoginRequest {
            public_key: "ab".into(),
            signature: "cd".into(),
            raw_message: "m".into(),
            metrics_id: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["publicKey"], "ab");
        assert_eq!(value["rawMessage"], "m");
        assert!(value.get("metricsId").is_none());

        let token: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"t","expiresAt":"2030-01-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(token.access_token, "t");
    }
}
