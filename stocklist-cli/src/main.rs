//! Stocklist CLI — refresh the daily instrument list.
//!
//! Default run: resolve the API token, skip if today's snapshot exists,
//! otherwise fetch from FinMind, write the snapshot, and sweep legacy files.
//!
//! - `--force`: refetch even when today's snapshot exists
//! - `--check`: only report freshness (exit 0 when fresh, 1 otherwise)

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use stocklist_core::{
    job, FinMindProvider, JobConfig, JobError, ProcessEnv, RunOptions, RunOutcome, SnapshotStore,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stocklist",
    version,
    about = "Stocklist — daily Taiwan instrument-list refresh"
)]
struct Cli {
    /// Refetch even if today's snapshot already exists.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Only report whether the snapshot is fresh; never fetch.
    #[arg(long, default_value_t = false, conflicts_with = "force")]
    check: bool,

    /// Job config file (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snapshot output path. Overrides the config file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory scanned for legacy dated snapshots. Overrides the config file.
    #[arg(long)]
    legacy_dir: Option<PathBuf>,

    /// Credential file (key=value). Overrides the config file.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// List legacy files that would be removed instead of deleting them.
    #[arg(long, default_value_t = false)]
    dry_run_sweep: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(2);
        }
    };

    if cli.check {
        let code = run_check(&config);
        std::process::exit(code);
    }

    if let Err(e) = run_refresh(&config, &cli) {
        error!("{e}");
        warn!("hint: {}", e.remediation());
        error!("stock list refresh failed");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<JobConfig> {
    let mut config = match &cli.config {
        Some(path) => JobConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => JobConfig::default(),
    };

    if let Some(output) = &cli.output {
        config.snapshot_path = output.clone();
    }
    if let Some(dir) = &cli.legacy_dir {
        config.legacy_dir = dir.clone();
    }
    if let Some(env_file) = &cli.env_file {
        config.env_file = Some(env_file.clone());
    }
    Ok(config)
}

fn run_check(config: &JobConfig) -> i32 {
    let store = SnapshotStore::new(&config.snapshot_path);
    let today = Local::now().date_naive();
    let state = store.check_freshness(today);

    println!("{}: {state}", store.path().display());
    if state.needs_refresh() {
        1
    } else {
        0
    }
}

fn run_refresh(config: &JobConfig, cli: &Cli) -> Result<(), JobError> {
    let provider = FinMindProvider::new(&config.provider)?;
    let options = RunOptions {
        force: cli.force,
        dry_run_sweep: cli.dry_run_sweep,
    };

    let outcome = job::run(
        config,
        &ProcessEnv,
        &provider,
        options,
        Local::now().fixed_offset(),
    )?;

    match outcome {
        RunOutcome::AlreadyFresh { date } => {
            info!(%date, "stock list already current");
        }
        RunOutcome::Refreshed {
            previous,
            count,
            path,
            sweep,
        } => {
            info!(
                count,
                path = %path.display(),
                previous = %previous,
                "stock list refreshed"
            );
            if !sweep.is_clean() {
                warn!(
                    failed = sweep.failed.len(),
                    "some legacy files could not be removed"
                );
            }
        }
    }
    Ok(())
}
