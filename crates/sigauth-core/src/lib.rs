//! sigauth core - session management for a key-holding client identity.
//!
//! This crate implements:
//! - Signer gate that blocks signing while the key is locked
//! - Nonce / login / token sign-in protocol against an identity service
//! - In-memory session store with change notifications
//! - Session controller with expiry-driven refresh
//! - Test harness with scripted collaborators

#![forbid(unsafe_code)]

// Core state machine
pub mod controller;
pub mod protocol;

// Infrastructure
pub mod gate;
pub mod store;
pub mod clock;

// Supporting modules
pub mod errors;
pub mod types;
pub mod keys;
pub mod harness;

// Optional transport implementations
#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod proptests;

pub use controller::{Fetched, SessionController};
pub use errors::{AuthError, GateError, MalformedSession, RemoteError, RemoteStep, SignerError};
pub use gate::{LockState, SignerGate, SigningCapability};
pub use protocol::{IdentityTransport, MetricsIdentity, ProtocolFailure, SignInProtocol};
pub use store::{SessionEvent, SessionStore};
pub use types::{AuthenticationState, PublicKey, SessionData, SessionProfile, Signature};
