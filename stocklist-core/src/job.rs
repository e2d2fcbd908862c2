//! Refresh pipeline: resolve → check freshness → fetch → normalize → persist → sweep.
//!
//! Any stage failure aborts the remaining stages, except the sweep, whose
//! failures are only logged. Nothing here retries; a failed run is retried by
//! whatever scheduled it.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::config::{ConfigError, JobConfig};
use crate::credential::{self, Credential, EnvSource};
use crate::data::{FetchError, InstrumentProvider, RawInstrument};
use crate::snapshot::Snapshot;
use crate::store::{Freshness, SnapshotStore, StoreError};
use crate::sweep::{SweepReport, Sweeper};

/// Number of entries echoed to the log after a successful fetch.
const PREVIEW_LEN: usize = 5;

/// Fatal job errors.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("no API token found in {primary} or {fallback}")]
    MissingCredential { primary: String, fallback: String },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to persist snapshot to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

impl JobError {
    /// One-line hint printed alongside the error.
    pub fn remediation(&self) -> String {
        match self {
            JobError::Config(_) => "fix the config file or pass --config with a valid path".into(),
            JobError::MissingCredential { primary, .. } => format!(
                "set {primary} in the environment or add `{primary}=your_token_here` to the credential file"
            ),
            JobError::Fetch(FetchError::Unauthorized(_)) => {
                "the provider rejected the token; check that it is valid and not expired".into()
            }
            JobError::Fetch(_) => "check network connectivity and the API token".into(),
            JobError::Persist { .. } => {
                "check free disk space and write permission on the snapshot directory".into()
            }
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobError::Config(_) | JobError::MissingCredential { .. } => 2,
            JobError::Fetch(_) => 3,
            JobError::Persist { .. } => 4,
        }
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Fetch even when today's snapshot already exists.
    pub force: bool,
    /// Report legacy files instead of deleting them.
    pub dry_run_sweep: bool,
}

/// How a successful run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Today's snapshot already existed; nothing was fetched.
    AlreadyFresh { date: NaiveDate },
    /// A new snapshot was written.
    Refreshed {
        previous: Freshness,
        count: usize,
        path: PathBuf,
        sweep: SweepReport,
    },
}

/// Run the whole job.
///
/// `now` fixes "today" for the freshness check, the snapshot date, and the
/// retention cutoff.
pub fn run(
    config: &JobConfig,
    env: &dyn EnvSource,
    provider: &dyn InstrumentProvider,
    options: RunOptions,
    now: DateTime<FixedOffset>,
) -> Result<RunOutcome, JobError> {
    let today = now.date_naive();

    let credential = resolve_credential(config, env)?;

    let store = SnapshotStore::new(&config.snapshot_path);
    let previous = check_freshness(&store, today);
    if !previous.needs_refresh() {
        if !options.force {
            info!(path = %store.path().display(), %today, "snapshot already up to date, pass --force to refetch");
            return Ok(RunOutcome::AlreadyFresh { date: today });
        }
        info!("force mode: refetching despite a fresh snapshot");
    }

    let rows = fetch(provider, &credential)?;
    let snapshot = normalize(&rows, &config.market_label, now);
    persist(&store, &snapshot)?;

    let sweeper = Sweeper::new(
        &config.legacy_dir,
        config.legacy_prefix.as_str(),
        config.retention_days,
    )
    .dry_run(options.dry_run_sweep);
    let sweep = sweep(&sweeper, today);

    Ok(RunOutcome::Refreshed {
        previous,
        count: snapshot.count,
        path: store.path().to_path_buf(),
        sweep,
    })
}

fn resolve_credential(config: &JobConfig, env: &dyn EnvSource) -> Result<Credential, JobError> {
    let _span = info_span!("resolve").entered();

    match credential::resolve_for(config, env) {
        Some(resolved) => {
            info!(
                source = %resolved.source,
                length = resolved.credential.len(),
                "using API token"
            );
            Ok(resolved.credential)
        }
        None => Err(JobError::MissingCredential {
            primary: config.token_var.clone(),
            fallback: config.fallback_token_var.clone(),
        }),
    }
}

fn check_freshness(store: &SnapshotStore, today: NaiveDate) -> Freshness {
    let _span = info_span!("freshness").entered();

    let state = store.check_freshness(today);
    match &state {
        Freshness::Corrupt { reason } => {
            warn!(path = %store.path().display(), %reason, "existing snapshot is corrupt, refetching")
        }
        other => info!(path = %store.path().display(), state = %other, "checked snapshot"),
    }
    state
}

fn fetch(
    provider: &dyn InstrumentProvider,
    credential: &Credential,
) -> Result<Vec<RawInstrument>, JobError> {
    let _span = info_span!("fetch", provider = provider.name()).entered();

    info!("downloading instrument list");
    let rows = provider.fetch_instruments(credential)?;
    // An empty list never reaches the store, whatever the provider returns.
    if rows.is_empty() {
        return Err(FetchError::EmptyResult.into());
    }
    Ok(rows)
}

fn normalize(rows: &[RawInstrument], market: &str, now: DateTime<FixedOffset>) -> Snapshot {
    let _span = info_span!("normalize").entered();

    let snapshot = Snapshot::from_rows(rows, market, now);
    if snapshot.count != rows.len() {
        info!(
            rows = rows.len(),
            unique = snapshot.count,
            "duplicate identifiers collapsed"
        );
    }
    for (id, record) in snapshot.preview(PREVIEW_LEN) {
        info!(id, name = %record.name, industry = %record.industry, "preview");
    }
    snapshot
}

fn persist(store: &SnapshotStore, snapshot: &Snapshot) -> Result<(), JobError> {
    let _span = info_span!("persist").entered();

    store.write(snapshot).map_err(|source| JobError::Persist {
        path: store.path().to_path_buf(),
        source,
    })?;
    info!(
        path = %store.path().display(),
        count = snapshot.count,
        date = %snapshot.date,
        "snapshot written"
    );
    Ok(())
}

fn sweep(sweeper: &Sweeper, today: NaiveDate) -> SweepReport {
    let _span = info_span!("sweep", dir = %sweeper.dir().display()).entered();

    let report = sweeper.sweep(today);
    if report.removed.is_empty() && report.is_clean() {
        info!("no legacy snapshots to remove");
    } else {
        info!(
            removed = report.removed.len(),
            kept = report.kept.len(),
            failed = report.failed.len(),
            "legacy sweep finished"
        );
    }
    report
}
