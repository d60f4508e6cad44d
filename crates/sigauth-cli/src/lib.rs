//! sigauth CLI - command-line caller for the session controller
//!
//! This crate provides:
//! - Local Ed25519 identity management
//! - Sign-in, token and profile commands against an identity service
//! - Session state persisted between invocations

pub mod cli;
pub mod config;
pub mod identity;
pub mod output;
pub mod secret_file;
pub mod session;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use sigauth_core::{AuthError, RemoteError};

use crate::identity::IdentityError;

/// Exit codes for CLI operations
///
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 2: Authentication failed - the identity service rejected the key
/// - 4: Connection failed - the identity service could not be reached
/// - 5: Invalid input - bad arguments, config or key file
/// - 6: Not signed in - the operation needs a session
/// - 7: Signer locked - no signing key is available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Authentication failed (exit code 2)
    AuthenticationFailed = 2,
    /// Connection failed (exit code 4)
    ConnectionFailed = 4,
    /// Invalid input provided (exit code 5)
    InvalidInput = 5,
    /// No session (exit code 6)
    NotSignedIn = 6,
    /// Signer locked (exit code 7)
    SignerLocked = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::AuthenticationFailed => "AUTH_FAILED",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NotSignedIn => "NOT_SIGNED_IN",
            ExitCode::SignerLocked => "SIGNER_LOCKED",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::AuthenticationFailed => "The identity service rejected the sign-in",
            ExitCode::ConnectionFailed => "Could not reach the identity service",
            ExitCode::InvalidInput => "Invalid arguments, configuration or key file",
            ExitCode::NotSignedIn => "No session; run sign-in first",
            ExitCode::SignerLocked => "No signing key is available",
        }
    }

    /// Map a controller error onto an exit code
    pub fn from_auth_error(error: &AuthError) -> Self {
        match error {
            AuthError::GateClosed => ExitCode::SignerLocked,
            AuthError::Signer(_) => ExitCode::GeneralError,
            AuthError::NotSignedIn => ExitCode::NotSignedIn,
            AuthError::RemoteStepFailed { reason, .. } => match reason {
                RemoteError::Http(_) => ExitCode::ConnectionFailed,
                RemoteError::Status { status, .. } if *status >= 500 => ExitCode::ConnectionFailed,
                RemoteError::Status { .. } | RemoteError::BadResponse(_) => {
                    ExitCode::AuthenticationFailed
                }
            },
        }
    }

    /// Map an identity error onto an exit code
    pub fn from_identity_error(error: &IdentityError) -> Self {
        match error {
            IdentityError::Io(_) => ExitCode::GeneralError,
            _ => ExitCode::InvalidInput,
        }
    }
}
