//! CivicSync CLI: refresh, read, validate and serve commands.
//!
//! Commands:
//! - `refresh`: run one sync and print `{ok, updated, logs}`
//! - `serve`: HTTP server with the refresh trigger and read endpoints
//! - `show <entity>`: print a read-through value as JSON
//! - `validate`: check bundled (or live) data for consistency
//! - `sources`: list registered source handlers and their configuration

mod server;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use civicsync_core::settings::Settings;
use civicsync_core::summary::{pillar_scores, summarize_all};
use civicsync_core::validate::validate;
use civicsync_runner::{AppConfig, Repository, SyncService};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "civicsync",
    about = "CivicSync: civic indicator ingestion and refresh service"
)]
struct Cli {
    /// TOML file of configuration keys (lowest precedence).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// .env file layered over --config. Defaults to ./.env when present.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every source handler once and persist the merged series.
    Refresh,
    /// Serve the refresh trigger and read endpoints over HTTP.
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
    /// Print a read-through value as JSON.
    Show {
        #[arg(value_enum)]
        what: ShowTarget,
    },
    /// Check definitions, series and neighborhoods for consistency.
    Validate {
        /// Validate the current read-through values instead of the bundled defaults.
        #[arg(long, default_value_t = false)]
        live: bool,
    },
    /// List registered source handlers with cadence, priority and configuration status.
    Sources,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowTarget {
    Series,
    Neighborhoods,
    Projects,
    Aggregates,
    Catalog,
    Summaries,
}

#[derive(Serialize)]
struct RefreshOutput<'a> {
    ok: bool,
    updated: &'a [String],
    logs: &'a [String],
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.env_file.as_deref())?;
    let config = AppConfig::from_settings(&settings)?;

    match cli.command {
        Commands::Refresh => run_refresh(&config, settings),
        Commands::Serve { addr } => run_serve(&config, settings, addr),
        Commands::Show { what } => run_show(&config, settings, what),
        Commands::Validate { live } => run_validate(&config, settings, live),
        Commands::Sources => run_sources(&config, &settings),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// TOML file, then .env file, then the process environment; later layers win.
fn load_settings(config: Option<&Path>, env_file: Option<&Path>) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::from_toml_file(path)?,
        None => Settings::new(),
    };
    match env_file {
        Some(path) => settings = settings.overlay(Settings::from_env_file(path)?),
        None => {
            let default = Path::new(".env");
            if default.exists() {
                settings = settings.overlay(Settings::from_env_file(default)?);
            }
        }
    }
    Ok(settings.overlay(Settings::from_env()))
}

fn run_refresh(config: &AppConfig, settings: Settings) -> Result<()> {
    let service = SyncService::from_config(config, settings)?;
    let report = service.run();
    let output = RefreshOutput {
        ok: true,
        updated: &report.updated,
        logs: &report.logs,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_serve(config: &AppConfig, settings: Settings, addr: SocketAddr) -> Result<()> {
    if config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET is not set; every refresh request will be refused");
    }
    let service = Arc::new(SyncService::from_config(config, settings)?);
    let repository = service.repository().clone();
    let state = server::AppState::new(service, repository, config.cron_secret.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::serve(addr, state))
}

fn run_show(config: &AppConfig, settings: Settings, what: ShowTarget) -> Result<()> {
    let service = SyncService::from_config(config, settings)?;
    let repo: &Repository = service.repository();
    let value = match what {
        ShowTarget::Series => serde_json::to_value(repo.indicator_series().value)?,
        ShowTarget::Neighborhoods => serde_json::to_value(repo.neighborhoods().value)?,
        ShowTarget::Projects => serde_json::to_value(repo.projects().value)?,
        ShowTarget::Aggregates => serde_json::to_value(repo.internal_aggregates().value)?,
        ShowTarget::Catalog => serde_json::to_value(repo.catalog().value)?,
        ShowTarget::Summaries => {
            let series = repo.indicator_series().value;
            serde_json::json!({
                "indicators": summarize_all(repo.definitions(), &series),
                "pillars": pillar_scores(repo.definitions(), &series),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_validate(config: &AppConfig, settings: Settings, live: bool) -> Result<()> {
    let service = SyncService::from_config(config, settings)?;
    let repo = service.repository();
    let defaults = repo.defaults();

    let issues = if live {
        let series = repo.indicator_series();
        let neighborhoods = repo.neighborhoods();
        println!("Validating live data (series from {}, neighborhoods from {})", series.origin, neighborhoods.origin);
        validate(&defaults.definitions, &series.value, &neighborhoods.value)
    } else {
        println!("Validating bundled defaults");
        validate(&defaults.definitions, &defaults.series, &defaults.neighborhoods)
    };

    if issues.is_empty() {
        println!("OK: {} indicators checked", defaults.definitions.len());
        return Ok(());
    }
    for issue in &issues {
        eprintln!("  {issue}");
    }
    bail!("{} validation issue(s)", issues.len());
}

fn run_sources(config: &AppConfig, settings: &Settings) -> Result<()> {
    let registry = civicsync_core::registry::SourceRegistry::standard(&config.http)?;

    println!("{:<12} {:<16} {:<8} {:>8}  Status", "Id", "Label", "Cadence", "Priority");
    println!("{}", "-".repeat(64));
    for entry in registry.entries() {
        let handler = &entry.handler;
        let missing = settings.missing(handler.required_keys());
        let status = if missing.is_empty() {
            "configured".to_string()
        } else {
            format!("missing {}", missing.join(", "))
        };
        println!(
            "{:<12} {:<16} {:<8} {:>8}  {status}",
            handler.id(),
            handler.label(),
            handler.cadence().to_string(),
            entry.priority
        );
    }
    Ok(())
}
