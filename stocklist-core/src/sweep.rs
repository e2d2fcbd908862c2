//! Retention sweep for legacy dated snapshot files.
//!
//! Files named `{prefix}{YYYY-MM-DD}.json` are removed once their embedded
//! date is strictly older than `today - retention_days`. Everything else in
//! the directory is ignored. Failures are collected, never propagated.

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A per-file cleanup failure. Never fatal to the run.
#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", .path.display())]
pub struct SweepError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Removed files (or, in dry-run mode, files that would be removed).
    pub removed: Vec<PathBuf>,
    /// Dated files inside the retention window.
    pub kept: Vec<PathBuf>,
    pub failed: Vec<SweepError>,
    /// Set when the directory itself could not be listed.
    pub scan_error: Option<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.scan_error.is_none()
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct Sweeper {
    dir: PathBuf,
    prefix: String,
    retention_days: u32,
    dry_run: bool,
}

impl Sweeper {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, retention_days: u32) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            retention_days,
            dry_run: false,
        }
    }

    /// Report what would be removed without deleting anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Oldest date that is still retained.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Extract the date from a dated snapshot filename, if it matches.
    pub fn parse_file_date(&self, file_name: &str) -> Option<NaiveDate> {
        let stem = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(".json")?;
        NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
    }

    pub fn sweep(&self, today: NaiveDate) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff = self.cutoff(today);

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot scan legacy directory");
                report.scan_error = Some(e.to_string());
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(|n| self.parse_file_date(n)) else {
                continue;
            };
            let path = entry.path();

            if date >= cutoff {
                debug!(file = %path.display(), %date, "within retention window");
                report.kept.push(path);
                continue;
            }

            if self.dry_run {
                info!(file = %path.display(), %date, "would remove legacy snapshot");
                report.removed.push(path);
                continue;
            }

            match remove(&path) {
                Ok(()) => {
                    info!(file = %path.display(), %date, "removed legacy snapshot");
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e.source, "cleanup failed");
                    report.failed.push(e);
                }
            }
        }

        report.removed.sort();
        report.kept.sort();
        report
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn remove(path: &Path) -> Result<(), SweepError> {
    fs::remove_file(path).map_err(|source| SweepError {
        path: path.to_path_buf(),
        source,
    })
}
