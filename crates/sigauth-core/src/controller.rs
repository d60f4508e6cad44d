//! Session controller.
//!
//! Public entry point for signing in, signing out and reading the current
//! access token or profile. Reads refresh an expired session in place; the
//! `*_with_refresh` variants report whether that happened.
//!
//! Sign-in transactions are serialized behind a single-flight guard. A caller
//! that finds the session expired waits for the guard and then re-checks the
//! store, so overlapping refreshes run one transaction instead of several.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::AuthError;
use crate::gate::SignerGate;
use crate::protocol::{IdentityTransport, MetricsIdentity, SignInProtocol};
use crate::store::{SessionEvent, SessionStore};
use crate::types::{AuthenticationState, SessionData, SessionProfile};

/// Value read from the session, with whether the read refreshed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetched<V> {
    pub value: V,
    /// True when this call ran a sign-in transaction
    pub refreshed: bool,
}

impl<V> Fetched<V> {
    fn cached(value: V) -> Self {
        Self {
            value,
            refreshed: false,
        }
    }

    fn refreshed(value: V) -> Self {
        Self {
            value,
            refreshed: true,
        }
    }
}

/// Session controller for one identity.
pub struct SessionController<T: IdentityTransport> {
    store: SessionStore,
    protocol: SignInProtocol<T>,
    clock: Arc<dyn Clock>,
    /// Serializes sign-in transactions and sign-out
    flight: Mutex<()>,
}

impl<T: IdentityTransport> SessionController<T> {
    /// Create a signed-out controller.
    pub fn new(transport: Arc<T>, gate: SignerGate) -> Self {
        Self::with_state(transport, gate, AuthenticationState::signed_out())
    }

    /// Create a controller seeded with a caller-supplied state.
    pub fn with_state(transport: Arc<T>, gate: SignerGate, state: AuthenticationState) -> Self {
        Self {
            store: SessionStore::new(state),
            protocol: SignInProtocol::new(transport, gate),
            clock: Arc::new(SystemClock),
            flight: Mutex::new(()),
        }
    }

    /// Replace the clock used for expiry checks.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Set the namespace of the signed login message.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.protocol.set_namespace(namespace);
    }

    /// Attach a metrics identity source.
    pub fn set_metrics(&mut self, metrics: Arc<dyn MetricsIdentity>) {
        self.protocol.set_metrics(metrics);
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AuthenticationState {
        self.store.snapshot()
    }

    pub fn is_signed_in(&self) -> bool {
        self.store.is_signed_in()
    }

    /// Whether the signer gate currently allows signing.
    pub fn is_signer_available(&self) -> bool {
        self.protocol.gate().is_available()
    }

    /// Subscribe to sign-in / sign-out notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe()
    }

    /// Run a fresh sign-in transaction and return the new access token.
    ///
    /// Existing session state is not consulted. On failure the controller is
    /// left signed out.
    pub async fn sign_in(&self) -> Result<String, AuthError> {
        let _flight = self.flight.lock().await;
        let data = self.run_transaction().await?;
        Ok(data.access_token)
    }

    /// Clear the session. No remote call is made.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _flight = self.flight.lock().await;
        if self.store.clear() {
            info!("signed out");
            Ok(())
        } else {
            Err(AuthError::NotSignedIn)
        }
    }

    /// Current access token, refreshed first if expired.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        Ok(self.access_token_with_refresh().await?.value)
    }

    /// Current profile, refreshed first if expired.
    pub async fn get_profile(&self) -> Result<SessionProfile, AuthError> {
        Ok(self.profile_with_refresh().await?.value)
    }

    /// Access token plus whether this call refreshed the session.
    pub async fn access_token_with_refresh(&self) -> Result<Fetched<String>, AuthError> {
        self.read_session(|data| data.access_token).await
    }

    /// Profile plus whether this call refreshed the session.
    pub async fn profile_with_refresh(&self) -> Result<Fetched<SessionProfile>, AuthError> {
        self.read_session(|data| data.profile).await
    }

    async fn read_session<V>(&self, pick: impl Fn(SessionData) -> V) -> Result<Fetched<V>, AuthError> {
        let session = self.store.session().ok_or(AuthError::NotSignedIn)?;
        if self.is_fresh(&session) {
            return Ok(Fetched::cached(pick(session)));
        }

        let _flight = self.flight.lock().await;

        // Another caller may have refreshed or signed out while we waited
        let session = self.store.session().ok_or(AuthError::NotSignedIn)?;
        if self.is_fresh(&session) {
            return Ok(Fetched::cached(pick(session)));
        }

        info!("session expired; signing in again");
        let data = self.run_transaction().await?;
        Ok(Fetched::refreshed(pick(data)))
    }

    /// Run the protocol and commit or roll back. Caller holds the flight guard.
    async fn run_transaction(&self) -> Result<SessionData, AuthError> {
        match self.protocol.run().await {
            Ok(data) => {
                self.store.commit(data.clone());
                info!(
                    profile_id = %data.profile.profile_id,
                    expires_in = %data.expires_in,
                    "signed in"
                );
                Ok(data)
            }
            Err(failure) => {
                let cleared = self.store.clear();
                warn!(
                    stage = failure.stage(),
                    completed = ?failure.completed_steps(),
                    cleared_session = cleared,
                    error = %failure,
                    "sign-in failed"
                );
                Err(failure.into())
            }
        }
    }

    fn is_fresh(&self, session: &SessionData) -> bool {
        match session.expiry() {
            Ok(expiry) => self.clock.now() < expiry,
            Err(e) => {
                warn!(error = %e, "stored session unreadable; treating as expired");
                false
            }
        }
    }
}
