//! Test harness for sigauth core.
//!
//! Scripted stand-ins for the external collaborators: an identity service
//! that counts calls and can be told to fail at a given step, a lock that
//! can be flipped at runtime, and a clock that only moves when told to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::errors::{RemoteError, RemoteStep};
use crate::gate::LockState;
use crate::keys::verify_signature;
use crate::protocol::{IdentityTransport, LoginRequest, LoginResponse, NonceResponse, TokenResponse};
use crate::types::{PublicKey, SessionData, SessionProfile};

// ============================================================================
// Lock State
// ============================================================================

/// Lock state that can be toggled at runtime.
#[derive(Debug)]
pub struct SwitchableLock {
    unlocked: AtomicBool,
}

impl SwitchableLock {
    pub fn unlocked() -> Self {
        Self {
            unlocked: AtomicBool::new(true),
        }
    }

    pub fn locked() -> Self {
        Self {
            unlocked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) {
        self.unlocked.store(false, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.unlocked.store(true, Ordering::SeqCst);
    }
}

impl LockState for SwitchableLock {
    fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Clock that stays where it is put.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

// ============================================================================
// Identity Service
// ============================================================================

/// Number of calls received per remote step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub nonce: usize,
    pub login: usize,
    pub token: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.nonce + self.login + self.token
    }
}

/// Scripted identity service.
///
/// Issues sequential nonces, login tokens and access tokens
/// (`issued-access-token-1`, `issued-access-token-2`, ...), verifies that
/// each login signs the nonce issued to that public key, and records every
/// call. Failure can be injected per step.
pub struct MockIdentityService {
    nonce_calls: AtomicUsize,
    login_calls: AtomicUsize,
    token_calls: AtomicUsize,
    fail_at: Mutex<Option<RemoteStep>>,
    /// Outstanding nonces by hex public key
    nonces: Mutex<HashMap<String, String>>,
    /// Outstanding login tokens
    login_tokens: Mutex<Vec<String>>,
    last_login: Mutex<Option<LoginRequest>>,
    profile: SessionProfile,
    token_ttl: Duration,
    latency: StdDuration,
    clock: Arc<dyn Clock>,
}

impl MockIdentityService {
    pub fn new() -> Self {
        Self {
            nonce_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            fail_at: Mutex::new(None),
            nonces: Mutex::new(HashMap::new()),
            login_tokens: Mutex::new(Vec::new()),
            last_login: Mutex::new(None),
            profile: SessionProfile {
                identifier_id: "mock-identifier".into(),
                profile_id: "mock-profile".into(),
            },
            token_ttl: Duration::minutes(30),
            latency: StdDuration::ZERO,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` when stamping expiries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lifetime of issued access tokens.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: StdDuration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_profile(mut self, profile: SessionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Make `step` fail until [`MockIdentityService::succeed`] is called.
    pub fn fail_at(&self, step: RemoteStep) {
        *self.fail_at.lock() = Some(step);
    }

    /// Clear any injected failure.
    pub fn succeed(&self) {
        *self.fail_at.lock() = None;
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            nonce: self.nonce_calls.load(Ordering::SeqCst),
            login: self.login_calls.load(Ordering::SeqCst),
            token: self.token_calls.load(Ordering::SeqCst),
        }
    }

    pub fn last_login(&self) -> Option<LoginRequest> {
        self.last_login.lock().clone()
    }

    pub fn profile(&self) -> SessionProfile {
        self.profile.clone()
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    async fn enter(&self, step: RemoteStep, counter: &AtomicUsize) -> Result<usize, RemoteError> {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if *self.fail_at.lock() == Some(step) {
            return Err(RemoteError::Status {
                status: 503,
                body: format!("injected {step} failure"),
            });
        }
        Ok(n)
    }

    fn stamp(&self, offset: Duration) -> String {
        (self.clock.now() + offset).to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Default for MockIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityTransport for MockIdentityService {
    async fn request_nonce(&self, public_key: &str) -> Result<NonceResponse, RemoteError> {
        let n = self.enter(RemoteStep::Nonce, &self.nonce_calls).await?;
        let nonce = format!("nonce-{n}");
        self.nonces.lock().insert(public_key.to_string(), nonce.clone());
        Ok(NonceResponse {
            nonce,
            expires_at: self.stamp(Duration::minutes(5)),
        })
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, RemoteError> {
        let n = self.enter(RemoteStep::Login, &self.login_calls).await?;
        *self.last_login.lock() = Some(request.clone());

        // Nonces are single use
        let nonce = self.nonces.lock().remove(&request.public_key).ok_or(RemoteError::Status {
            status: 401,
            body: "no outstanding nonce".into(),
        })?;
        let binds_nonce = request.raw_message.contains(&format!(":{nonce}:"))
            && request.raw_message.ends_with(&request.public_key);
        let public_key = hex::decode(&request.public_key)
            .map(PublicKey::new)
            .map_err(|_| RemoteError::Status {
                status: 400,
                body: "public key is not hex".into(),
            })?;
        let signature = hex::decode(&request.signature).unwrap_or_default();
        if !binds_nonce || !verify_signature(&public_key, request.raw_message.as_bytes(), &signature) {
            return Err(RemoteError::Status {
                status: 401,
                body: "signature rejected".into(),
            });
        }

        let token = format!("login-token-{n}");
        self.login_tokens.lock().push(token.clone());
        Ok(LoginResponse {
            profile: self.profile.clone(),
            token,
        })
    }

    async fn exchange_token(&self, login_token: &str) -> Result<TokenResponse, RemoteError> {
        let n = self.enter(RemoteStep::Token, &self.token_calls).await?;

        let mut outstanding = self.login_tokens.lock();
        let Some(index) = outstanding.iter().position(|t| t == login_token) else {
            return Err(RemoteError::Status {
                status: 401,
                body: "unknown login token".into(),
            });
        };
        outstanding.remove(index);
        drop(outstanding);

        Ok(TokenResponse {
            access_token: format!("issued-access-token-{n}"),
            expires_at: self.stamp(self.token_ttl),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Session data with a fixed test profile, expiring at `at`.
pub fn session_expiring_at(access_token: &str, at: DateTime<Utc>) -> SessionData {
    SessionData::new(
        access_token,
        at,
        SessionProfile {
            identifier_id: "seeded-identifier".into(),
            profile_id: "seeded-profile".into(),
        },
    )
}
