// crates/consent-sync-cli/src/main.rs
// ============================================================================
// Module: Consent Sync CLI Entry Point
// Description: Command dispatcher for the consent sync service.
// Purpose: Start the HTTP server and run bulk sync and maintenance jobs.
// Dependencies: clap, consent-sync-config, consent-sync-core,
//               consent-sync-server, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! `consent-sync serve` runs the storefront and webhook endpoints.
//! `bulk-sync` replays a JSON-lines customer export, `prune-sessions` removes
//! stale checkout sessions, and `check-config` validates configuration without
//! touching the network. Input files are untrusted and read with size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub(crate) mod bulk;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bulk::BulkSummary;
use bulk::run_bulk_sync;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use consent_sync_config::ConsentSyncConfig;
use consent_sync_core::ShopDomain;
use consent_sync_server::AppState;
use consent_sync_server::ServerSettings;
use consent_sync_server::build_engine;
use consent_sync_server::serve;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a bulk-sync input file.
const MAX_BULK_INPUT_BYTES: usize = 256 * 1024 * 1024;
/// Seconds per hour for prune cutoffs.
const SECONDS_PER_HOUR: u64 = 3_600;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "consent-sync", disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `CONSENT_SYNC_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the storefront and webhook server.
    Serve,
    /// Load and validate configuration, then exit.
    CheckConfig,
    /// Reconcile a JSON-lines customer export for one shop.
    BulkSync(BulkSyncCommand),
    /// Delete checkout sessions older than a cutoff.
    PruneSessions(PruneCommand),
}

/// Arguments for `bulk-sync`.
#[derive(Args, Debug)]
struct BulkSyncCommand {
    /// Shop domain the export belongs to.
    #[arg(long, value_name = "DOMAIN")]
    shop: String,
    /// JSON-lines export file.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
}

/// Arguments for `prune-sessions`.
#[derive(Args, Debug)]
struct PruneCommand {
    /// Minimum session age in hours.
    #[arg(long, value_name = "HOURS", default_value_t = 72)]
    older_than_hours: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Serve => command_serve(config).await,
        Commands::CheckConfig => command_check_config(&config),
        Commands::BulkSync(command) => command_bulk_sync(config, command).await,
        Commands::PruneSessions(command) => command_prune(config, &command).await,
    }
}

/// Loads configuration, honoring the `--config` override.
fn load_config(path: Option<&Path>) -> CliResult<ConsentSyncConfig> {
    ConsentSyncConfig::load(path).map_err(|err| CliError::new(format!("config error: {err}")))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs the HTTP server until it fails.
async fn command_serve(config: ConsentSyncConfig) -> CliResult<ExitCode> {
    let addr = config
        .server
        .bind_addr()
        .map_err(|err| CliError::new(format!("config error: {err}")))?;
    let settings = ServerSettings::from_config(&config);
    // Blocking HTTP clients must be built and dropped off the async workers.
    let (engine, sinks) = tokio::task::spawn_blocking(move || build_engine(&config))
        .await
        .map_err(|err| CliError::new(format!("init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("init failed: {err}")))?;
    let state = Arc::new(AppState::new(engine, settings, sinks));
    write_stdout_line(&format!("consent-sync listening on {addr}"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    let outcome = serve(Arc::clone(&state), addr).await;
    tokio::task::spawn_blocking(move || drop(state))
        .await
        .map_err(|err| CliError::new(format!("shutdown join failed: {err}")))?;
    outcome.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Reports a short summary of a valid configuration.
fn command_check_config(config: &ConsentSyncConfig) -> CliResult<ExitCode> {
    let shops = config.platform.shops.len();
    let lists = config.engine_config().email_lists;
    let configured_lists = [&lists.single_opt_in_list, &lists.double_opt_in_list]
        .into_iter()
        .filter(|list| list.is_some())
        .count();
    let message = format!(
        "config ok: bind {}, {shops} shop(s), {configured_lists} email list(s)",
        config.server.bind
    );
    write_stdout_line(&message).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Replays a JSON-lines export through the engine.
async fn command_bulk_sync(
    config: ConsentSyncConfig,
    command: BulkSyncCommand,
) -> CliResult<ExitCode> {
    let shop = ShopDomain::new(&command.shop);
    if config.shop(&shop).is_none() {
        return Err(CliError::new(format!("shop is not configured: {shop}")));
    }
    let bytes = read_bytes_with_limit(&command.input, MAX_BULK_INPUT_BYTES)?;
    let input = String::from_utf8(bytes)
        .map_err(|_| CliError::new("bulk input must be utf-8".to_string()))?;
    let summary = tokio::task::spawn_blocking(move || -> CliResult<BulkSummary> {
        let (engine, _sinks) =
            build_engine(&config).map_err(|err| CliError::new(format!("init failed: {err}")))?;
        Ok(run_bulk_sync(&engine, &shop, &input))
    })
    .await
    .map_err(|err| CliError::new(format!("bulk sync join failed: {err}")))??;

    for failure in &summary.failures {
        write_stderr_line(&format!("line {}: {}", failure.line, failure.message))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let report = serde_json::to_string_pretty(&summary)
        .map_err(|err| CliError::new(format!("failed to render summary: {err}")))?;
    write_stdout_line(&report).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    if summary.failed > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Deletes stale sessions and their provisional events.
async fn command_prune(config: ConsentSyncConfig, command: &PruneCommand) -> CliResult<ExitCode> {
    let older_than = Duration::from_secs(command.older_than_hours.saturating_mul(SECONDS_PER_HOUR));
    let report = tokio::task::spawn_blocking(move || {
        let (engine, _sinks) =
            build_engine(&config).map_err(|err| CliError::new(format!("init failed: {err}")))?;
        engine
            .prune_sessions(older_than)
            .map_err(|err| CliError::new(format!("prune failed: {err}")))
    })
    .await
    .map_err(|err| CliError::new(format!("prune join failed: {err}")))??;
    let message = format!("pruned {} sessions, {} events", report.sessions, report.events);
    write_stdout_line(&message).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a file, failing when it exceeds `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let display = path.display();
    let file = File::open(path)
        .map_err(|err| CliError::new(format!("failed to open {display}: {err}")))?;
    let size = file
        .metadata()
        .map_err(|err| CliError::new(format!("failed to stat {display}: {err}")))?
        .len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(CliError::new(format!(
            "{display} is {size} bytes, above the {max_bytes} byte limit"
        )));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| CliError::new(format!("failed to read {display}: {err}")))?;
    if bytes.len() > max_bytes {
        return Err(CliError::new(format!("{display} grew past the {max_bytes} byte limit")));
    }
    Ok(bytes)
}

/// Formats an output stream failure.
fn output_error(stream: &str, err: &std::io::Error) -> String {
    format!("failed to write {stream}: {err}")
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Writes an error message and returns a failing exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
