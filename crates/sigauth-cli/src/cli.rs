//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use sigauth_core::IdentityTransport;

use crate::config::{CliOverrides, Config};
use crate::identity::KeyFile;
use crate::output::{OutputFormat, OutputFormatter};
use crate::session::SessionContext;
use crate::ExitCode;

/// sigauth - sign in to an identity service with a local signing key
#[derive(Parser, Debug)]
#[command(name = "sigauth")]
#[command(version, about = "Sign in to an identity service with a local signing key")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (default: `[output] format` from config)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (protocol-level tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Identity service base URL (overrides config)
    #[arg(long, global = true, env = "SIGAUTH_SERVICE_URL")]
    pub service_url: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the local signing key
    Identity(IdentityArgs),
    /// Run a fresh sign-in transaction
    SignIn,
    /// Print a valid access token, refreshing if expired
    Token,
    /// Show the signed-in profile, refreshing if expired
    Profile,
    /// Show the stored session without contacting the service
    Status,
    /// Discard the stored session
    SignOut,
}

/// Arguments for the identity command
#[derive(Parser, Debug)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

/// Identity subcommands
#[derive(Subcommand, Debug)]
pub enum IdentityAction {
    /// Generate a new signing key
    Init {
        /// Replace an existing key
        #[arg(long)]
        force: bool,
    },
    /// Show the stored key
    Show,
}

/// Controller operation run against a session context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    SignIn,
    Token,
    Profile,
    Status,
    SignOut,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::SignIn => "sign-in",
            SessionCommand::Token => "token",
            SessionCommand::Profile => "profile",
            SessionCommand::Status => "status",
            SessionCommand::SignOut => "sign-out",
        }
    }
}

/// Printable result of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub code: ExitCode,
    pub output: String,
}

impl CommandOutcome {
    fn new(code: ExitCode, output: String) -> Self {
        Self { code, output }
    }

    fn print(&self) {
        if self.output.is_empty() {
            return;
        }
        if self.code == ExitCode::Success {
            println!("{}", self.output);
        } else {
            eprintln!("{}", self.output);
        }
    }
}

impl Cli {
    /// Config overrides for the flags that were actually given
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_format: self.output.map(|format| format.to_string()),
            verbose: if self.verbose { Some(true) } else { None },
            debug: if self.debug { Some(true) } else { None },
            service_url: self.service_url.clone(),
        }
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let format: OutputFormat = config.output.format.parse().unwrap_or_default();
        let formatter = OutputFormatter::new(format, config.output.verbose);

        let command = match self.command {
            Commands::Identity(args) => {
                let outcome = args.execute(&config, &formatter);
                outcome.print();
                return Ok(outcome.code);
            }
            Commands::SignIn => SessionCommand::SignIn,
            Commands::Token => SessionCommand::Token,
            Commands::Profile => SessionCommand::Profile,
            Commands::Status => SessionCommand::Status,
            Commands::SignOut => SessionCommand::SignOut,
        };

        formatter.progress(&format!("Using identity service {}", config.service.base_url));
        let context = SessionContext::from_config(&config)?;
        let outcome = run_session_command(command, &context, &formatter).await?;
        outcome.print();
        Ok(outcome.code)
    }
}

impl IdentityArgs {
    pub fn execute(self, config: &Config, formatter: &OutputFormatter) -> CommandOutcome {
        let file = KeyFile::new(config.key_path());
        let (result, command) = match self.action {
            IdentityAction::Init { force } => {
                formatter.progress(&format!("Writing key to {}...", file.path().display()));
                (file.generate(force), "identity init")
            }
            IdentityAction::Show => (file.info(), "identity show"),
        };

        match result {
            Ok(info) => CommandOutcome::new(ExitCode::Success, formatter.format_identity(&info, command)),
            Err(e) => {
                let code = ExitCode::from_identity_error(&e);
                CommandOutcome::new(code, formatter.format_error(&e.to_string(), code))
            }
        }
    }
}

/// Run one controller operation and persist the resulting state.
///
/// The state is written back whether the operation succeeded or not; a
/// failed transaction leaves the session signed out.
pub async fn run_session_command<T: IdentityTransport>(
    command: SessionCommand,
    context: &SessionContext<T>,
    formatter: &OutputFormatter,
) -> anyhow::Result<CommandOutcome> {
    let controller = context.controller();
    let name = command.name();

    let result = match command {
        SessionCommand::SignIn => {
            formatter.progress("Signing in...");
            controller
                .sign_in()
                .await
                .map(|_| formatter.format_message("Signed in", name))
        }
        SessionCommand::Token => controller
            .access_token_with_refresh()
            .await
            .map(|fetched| formatter.format_token(&fetched, name)),
        SessionCommand::Profile => controller
            .profile_with_refresh()
            .await
            .map(|fetched| formatter.format_profile(&fetched, name)),
        SessionCommand::Status => Ok(formatter.format_status(&context.status_at(chrono::Utc::now()), name)),
        SessionCommand::SignOut => controller
            .sign_out()
            .await
            .map(|_| formatter.format_message("Signed out", name)),
    };

    if command != SessionCommand::Status {
        context.persist()?;
    }

    Ok(match result {
        Ok(output) => CommandOutcome::new(ExitCode::Success, output),
        Err(e) => {
            let code = ExitCode::from_auth_error(&e);
            tracing::debug!(command = name, exit_code = code.name(), "command failed");
            CommandOutcome::new(code, formatter.format_error(&e.to_string(), code))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sigauth_core::harness::MockIdentityService;
    use sigauth_core::RemoteStep;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.identity.key_path = Some(temp_dir.path().join("identity.json"));
        config.session.state_path = Some(temp_dir.path().join("session.json"));
        config
    }

    fn quiet() -> OutputFormatter {
        OutputFormatter::new(OutputFormat::Quiet, false)
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["sigauth", "--output", "json", "token"]).unwrap();
        assert!(matches!(cli.command, Commands::Token));
        assert_eq!(cli.output, Some(OutputFormat::Json));

        let cli = Cli::try_parse_from(["sigauth", "identity", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Identity(IdentityArgs { action: IdentityAction::Init { force: true } })
        ));

        let cli = Cli::try_parse_from(["sigauth", "sign-out", "--verbose"]).unwrap();
        assert!(matches!(cli.command, Commands::SignOut));
        assert!(cli.verbose);
    }

    #[test]
    fn test_config_format_kept_without_flag() {
        let cli = Cli::try_parse_from(["sigauth", "status"]).unwrap();
        assert!(cli.output.is_none());

        let mut config = Config::default();
        config.output.format = "json".to_string();
        let config = config.with_overrides(&cli.overrides());

        assert_eq!(config.output.format, "json");
    }

    #[test]
    fn test_output_flag_overrides_config() {
        let cli = Cli::try_parse_from(["sigauth", "status", "--output", "quiet"]).unwrap();

        let mut config = Config::default();
        config.output.format = "json".to_string();
        let config = config.with_overrides(&cli.overrides());

        assert_eq!(config.output.format, "quiet");
    }

    #[test]
    fn test_identity_show_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let args = IdentityArgs { action: IdentityAction::Show };

        let outcome = args.execute(&config, &quiet());
        assert_eq!(outcome.code, ExitCode::InvalidInput);
    }

    #[test]
    fn test_identity_init_then_show() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let formatter = OutputFormatter::new(OutputFormat::Json, false);

        let init = IdentityArgs { action: IdentityAction::Init { force: false } }.execute(&config, &formatter);
        assert_eq!(init.code, ExitCode::Success);

        let show = IdentityArgs { action: IdentityAction::Show }.execute(&config, &formatter);
        let value: serde_json::Value = serde_json::from_str(&show.output).unwrap();
        assert_eq!(value["command"], "identity show");
        assert_eq!(value["data"]["key_algorithm"], "Ed25519");
    }

    #[tokio::test]
    async fn test_session_commands_against_mock() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        KeyFile::new(config.key_path()).generate(false).unwrap();
        let service = Arc::new(MockIdentityService::new());
        let formatter = OutputFormatter::new(OutputFormat::Table, false);

        let context = SessionContext::open(&config, service.clone()).unwrap();
        let outcome = run_session_command(SessionCommand::SignIn, &context, &formatter).await.unwrap();
        assert_eq!(outcome.code, ExitCode::Success);

        let context = SessionContext::open(&config, service.clone()).unwrap();
        let outcome = run_session_command(SessionCommand::Token, &context, &formatter).await.unwrap();
        assert_eq!(outcome.output, "issued-access-token-1");
        assert_eq!(service.calls().total(), 3);

        let outcome = run_session_command(SessionCommand::SignOut, &context, &formatter).await.unwrap();
        assert_eq!(outcome.code, ExitCode::Success);

        let context = SessionContext::open(&config, service.clone()).unwrap();
        let outcome = run_session_command(SessionCommand::SignOut, &context, &quiet()).await.unwrap();
        assert_eq!(outcome.code, ExitCode::NotSignedIn);
    }

    #[tokio::test]
    async fn test_failed_sign_in_persists_signed_out() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        KeyFile::new(config.key_path()).generate(false).unwrap();
        let service = Arc::new(MockIdentityService::new());

        let context = SessionContext::open(&config, service.clone()).unwrap();
        run_session_command(SessionCommand::SignIn, &context, &quiet()).await.unwrap();

        service.fail_at(RemoteStep::Login);
        let outcome = run_session_command(SessionCommand::SignIn, &context, &quiet()).await.unwrap();
        assert_eq!(outcome.code, ExitCode::ConnectionFailed);

        let reloaded = SessionContext::open(&config, service.clone()).unwrap();
        assert!(!reloaded.controller().is_signed_in());
    }

    #[tokio::test]
    async fn test_locked_signer_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let service = Arc::new(MockIdentityService::new());

        let context = SessionContext::open(&config, service.clone()).unwrap();
        let outcome = run_session_command(SessionCommand::Token, &context, &quiet()).await.unwrap();
        assert_eq!(outcome.code, ExitCode::NotSignedIn);

        let outcome = run_session_command(SessionCommand::SignIn, &context, &quiet()).await.unwrap();
        assert_eq!(outcome.code, ExitCode::SignerLocked);
    }
}
