//! In-memory session store.
//!
//! Holds the single [`AuthenticationState`] of a controller and broadcasts a
//! [`SessionEvent`] on every sign-in and sign-out. Writes replace or clear
//! the whole session under one lock acquisition, so readers never see a
//! half-written state. The lock is never held across an `.await`.

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::types::{AuthenticationState, SessionData, SessionProfile};

/// Capacity of the change-notification channel.
const EVENT_CAPACITY: usize = 16;

/// Session transition notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new session was stored
    SignedIn(SessionProfile),
    /// The session was cleared
    SignedOut,
}

/// Source of truth for sign-in status.
pub struct SessionStore {
    state: RwLock<AuthenticationState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a store seeded with `initial`.
    pub fn new(initial: AuthenticationState) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(initial),
            events,
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> AuthenticationState {
        self.state.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.read().is_signed_in()
    }

    /// Copy of the current session, if signed in.
    pub fn session(&self) -> Option<SessionData> {
        self.state.read().session_data().cloned()
    }

    /// Replace the state with a signed-in session.
    pub fn commit(&self, data: SessionData) {
        let profile = data.profile.clone();
        *self.state.write() = AuthenticationState::signed_in(data);
        self.notify(SessionEvent::SignedIn(profile));
    }

    /// Clear the session. Returns whether one was present.
    pub fn clear(&self) -> bool {
        let cleared = self.state.write().take().is_some();
        if cleared {
            self.notify(SessionEvent::SignedOut);
        }
        cleared
    }

    /// Subscribe to session transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(AuthenticationState::signed_out())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn data(token: &str) -> SessionData {
        SessionData::new(
            token,
            Utc::now(),
            SessionProfile {
                identifier_id: "id".into(),
                profile_id: "profile".into(),
            },
        )
    }

    #[test]
    fn test_default_is_signed_out() {
        let store = SessionStore::default();
        assert!(!store.is_signed_in());
        assert!(store.session().is_none());
        assert_eq!(store.snapshot(), AuthenticationState::signed_out());
    }

    #[test]
    fn test_commit_and_clear() {
        let store = SessionStore::default();

        store.commit(data("a"));
        assert!(store.is_signed_in());
        assert_eq!(store.session().unwrap().access_token, "a");

        store.commit(data("b"));
        assert_eq!(store.session().unwrap().access_token, "b");

        assert!(store.clear());
        assert!(!store.is_signed_in());
        assert!(!store.clear());
    }

    #[tokio::test]
    async fn test_events() {
        let store = SessionStore::default();
        let mut rx = store.subscribe();

        store.commit(data("a"));
        store.clear();
        // Clearing an empty store emits nothing
        store.clear();

        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::SignedIn(_)));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedOut);
        assert!(rx.try_recv().is_err());
    }
}
