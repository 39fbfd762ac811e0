//! Top-level CLI definition and dispatch.
//!
//! This is deliberately a thin demonstration surface: command dispatch,
//! host/profile resolution, and every domain (project/people/account)
//! command are out of scope. The four subcommands here exist only to
//! exercise the resilience substrate and completion cache end-to-end.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use thiserror::Error;

use crate::cache::{CacheStore, CompletionCache};
use crate::core::config::Config;
use crate::core::paths::{resolve_cache_dir, resolve_resilience_dir};
use crate::resilience::{Bulkhead, Limiter, Store};

/// bcq — command-line client for a Basecamp-shaped project-management API.
#[derive(Debug, Parser)]
#[command(
    name = "bcq",
    author,
    version,
    about = "bcq - resilience substrate and completion cache inspection",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the resilience/cache state directory.
    #[arg(long, global = true, value_name = "PATH")]
    state_dir: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Inspect or reset the resilience substrate (breaker/limiter/bulkhead).
    #[command(subcommand)]
    Resilience(ResilienceCommand),
    /// Inspect or refresh the completion cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum ResilienceCommand {
    /// Print breaker state, limiter tokens, and bulkhead occupancy.
    Status,
    /// Clear the resilience state file.
    Reset,
}

#[derive(Debug, Clone, Subcommand)]
enum CacheCommand {
    /// Print per-section cache staleness.
    Status,
    /// Run a synchronous full refresh and report the outcome.
    Refresh,
}

#[derive(Debug, Error)]
pub enum CliError {
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Runtime(_) => 2,
            Self::Json(_) | Self::Io(_) => 3,
        }
    }
}

impl From<crate::core::errors::BcqError> for CliError {
    fn from(value: crate::core::errors::BcqError) -> Self {
        Self::Runtime(value.to_string())
    }
}

/// Dispatch CLI commands.
///
/// # Errors
/// Returns a `CliError` describing the failure; see [`CliError::exit_code`]
/// for the process exit code contract.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Resilience(ResilienceCommand::Status) => run_resilience_status(cli),
        Command::Resilience(ResilienceCommand::Reset) => run_resilience_reset(cli),
        Command::Cache(CacheCommand::Status) => run_cache_status(cli),
        Command::Cache(CacheCommand::Refresh) => run_cache_refresh(cli),
    }
}

fn config(cli: &Cli) -> Result<Config, CliError> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("bcq.toml"));
    Ok(Config::load(&path)?.with_env_overrides())
}

fn resilience_store(cli: &Cli) -> Store {
    Store::new(resolve_resilience_dir(cli.state_dir.as_deref()))
}

fn cache_store(cli: &Cli) -> CacheStore {
    CacheStore::new(resolve_cache_dir(cli.state_dir.as_deref()))
}

fn run_resilience_status(cli: &Cli) -> Result<(), CliError> {
    let cfg = config(cli)?;
    let store = resilience_store(cli);
    let limiter = Limiter::new(&store, &cfg.limiter);
    let bulkhead = Bulkhead::new(&store, &cfg.bulkhead);

    let state = store.load()?;
    let tokens = limiter.tokens()?;
    let available = bulkhead.available()?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!("circuit breaker: {:?}", state.circuit_breaker.state);
            println!("  failures: {}", state.circuit_breaker.failures);
            println!("  successes: {}", state.circuit_breaker.successes);
            println!("rate limiter tokens: {tokens:.2}");
            println!(
                "bulkhead: {} held / {} available",
                state.bulkhead.active_pids.len(),
                available
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "circuit_breaker": {
                    "state": format!("{:?}", state.circuit_breaker.state),
                    "failures": state.circuit_breaker.failures,
                    "successes": state.circuit_breaker.successes,
                },
                "rate_limiter": { "tokens": tokens },
                "bulkhead": {
                    "held": state.bulkhead.active_pids,
                    "available": available,
                },
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_resilience_reset(cli: &Cli) -> Result<(), CliError> {
    let store = resilience_store(cli);
    store.clear()?;
    match output_mode(cli) {
        OutputMode::Human => println!("resilience state cleared"),
        OutputMode::Json => write_json_line(&json!({ "cleared": true }))?,
    }
    Ok(())
}

fn run_cache_status(cli: &Cli) -> Result<(), CliError> {
    let cfg = config(cli)?;
    let store = cache_store(cli);
    let cache: CompletionCache = store.load()?;
    let stale = store.is_stale(
        chrono::Duration::seconds(cfg.cache.max_age_secs as i64),
        cfg.cache.accounts_required,
    );

    match output_mode(cli) {
        OutputMode::Human => {
            println!("stale: {stale}");
            println!(
                "projects: {} (updated {})",
                cache.projects.len(),
                cache.projects_updated_at
            );
            println!(
                "people: {} (updated {})",
                cache.people.len(),
                cache.people_updated_at
            );
            println!(
                "accounts: {} (updated {})",
                cache.accounts.len(),
                cache.accounts_updated_at
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "stale": stale,
                "projects": { "count": cache.projects.len(), "updated_at": cache.projects_updated_at },
                "people": { "count": cache.people.len(), "updated_at": cache.people_updated_at },
                "accounts": { "count": cache.accounts.len(), "updated_at": cache.accounts_updated_at },
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_cache_refresh(_cli: &Cli) -> Result<(), CliError> {
    // The real SaaS transport is out of scope; this surface has no concrete
    // `Fetcher` to wire in, so it reports the shape of the outcome it would
    // produce rather than performing a network call.
    Err(CliError::Runtime(
        "cache refresh requires a configured API client, which this build does not include"
            .to_string(),
    ))
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("BCQ_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };
    match env_mode.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
