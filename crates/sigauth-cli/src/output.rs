//! Output formatting for CLI results
//!
//! Three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use sigauth_core::{Fetched, SessionProfile};

use crate::identity::IdentityInfo;
use crate::session::SessionStatus;
use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Exit code name (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<&'static str>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response with command context
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            exit_code: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response
    pub fn error(message: &str, code: ExitCode) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            exit_code: Some(code.name()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Format identity info
    pub fn format_identity(&self, info: &IdentityInfo, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Key ID", &info.key_id]);
                table.add_row(vec!["Public Key", &info.public_key]);
                table.add_row(vec!["Algorithm", &info.key_algorithm]);
                table.add_row(vec!["Created At", &info.created_at]);
                table.add_row(vec!["Path", &info.path.display().to_string()]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(info, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format an access token. Table mode prints the bare token so it can be
    /// captured by shell substitution.
    pub fn format_token(&self, fetched: &Fetched<String>, command: &str) -> String {
        match self.format {
            OutputFormat::Table => fetched.value.clone(),
            OutputFormat::Json => self.to_json_response(
                &TokenOutput {
                    access_token: &fetched.value,
                    refreshed: fetched.refreshed,
                },
                command,
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format the session profile
    pub fn format_profile(&self, fetched: &Fetched<SessionProfile>, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Identifier ID", &fetched.value.identifier_id]);
                table.add_row(vec!["Profile ID", &fetched.value.profile_id]);
                if self.verbose {
                    table.add_row(vec!["Refreshed", yes_no(fetched.refreshed)]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(
                &ProfileOutput {
                    profile: &fetched.value,
                    refreshed: fetched.refreshed,
                },
                command,
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format session status
    pub fn format_status(&self, status: &SessionStatus, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Signed In", yes_no(status.signed_in)]);
                table.add_row(vec!["Signer", if status.signer_available { "unlocked" } else { "locked" }]);
                if status.signed_in {
                    table.add_row(vec!["Identifier ID", status.identifier_id.as_deref().unwrap_or("-")]);
                    table.add_row(vec!["Profile ID", status.profile_id.as_deref().unwrap_or("-")]);
                    table.add_row(vec!["Expires At", status.expires_at.as_deref().unwrap_or("-")]);
                    table.add_row(vec!["Expired", yes_no(status.expired)]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(status, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a plain success message
    pub fn format_message(&self, message: &str, command: &str) -> String {
        match self.format {
            OutputFormat::Table => format!("✓ {message}"),
            OutputFormat::Json => self.to_json_response(&SuccessMessage::new(message), command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error(&self, error: &str, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("✗ {error}"),
            OutputFormat::Json => to_json(&JsonResponse::<()>::error(error, code)),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Progress message (only shown in verbose table mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        to_json(&JsonResponse::success_with_command(value, command))
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn property_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    table
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

// JSON output structures

/// Simple success message for JSON output
#[derive(Serialize)]
pub struct SuccessMessage {
    pub message: String,
}

impl SuccessMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Serialize)]
struct TokenOutput<'a> {
    access_token: &'a str,
    refreshed: bool,
}

#[derive(Serialize)]
struct ProfileOutput<'a> {
    profile: &'a SessionProfile,
    refreshed: bool,
}
