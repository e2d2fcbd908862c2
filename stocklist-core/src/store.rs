//! Fixed-path snapshot store.
//!
//! Layout: a single JSON file (default `public/stock_list.json`) carrying its
//! own `date` field.
//!
//! - Atomic writes (temp file in the same directory, fsync, rename into place)
//! - Freshness check reads the embedded date, not the file mtime
//! - Unparseable files are reported as corrupt and treated as stale

use chrono::NaiveDate;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("malformed snapshot JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

/// State of the on-disk snapshot relative to today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Snapshot exists and is dated today.
    Fresh,
    /// Snapshot exists but is dated another day.
    Stale { date: NaiveDate },
    /// No file at the target path.
    Absent,
    /// File exists but is not a valid snapshot.
    Corrupt { reason: String },
}

impl Freshness {
    /// Only a fresh snapshot lets the run skip the fetch.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Freshness::Fresh)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => f.write_str("fresh"),
            Freshness::Stale { date } => write!(f, "stale (dated {date})"),
            Freshness::Absent => f.write_str("absent"),
            Freshness::Corrupt { reason } => write!(f, "corrupt ({reason})"),
        }
    }
}

/// The snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compare the stored snapshot's date with `today`.
    pub fn check_freshness(&self, today: NaiveDate) -> Freshness {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Freshness::Absent,
            Err(e) => {
                return Freshness::Corrupt {
                    reason: format!("unreadable: {e}"),
                }
            }
        };

        let snapshot = match parse(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return Freshness::Corrupt {
                    reason: e.to_string(),
                }
            }
        };

        if snapshot.date == today {
            Freshness::Fresh
        } else {
            Freshness::Stale {
                date: snapshot.date,
            }
        }
    }

    /// Load and validate the stored snapshot.
    pub fn read(&self) -> Result<Snapshot, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse(&content)
    }

    /// Write the snapshot atomically, creating parent directories.
    ///
    /// On any failure the previous file is left as it was.
    pub fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        // Dropping the temp file on an error path deletes it.
        let tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err(&dir))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.write_all(b"\n").map_err(io_err(tmp.path()))?;
            writer.flush().map_err(io_err(tmp.path()))?;
        }
        tmp.as_file().sync_all().map_err(io_err(tmp.path()))?;

        tmp.persist(&self.path)
            .map_err(|e| io_err(&self.path)(e.error))?;
        Ok(())
    }
}

fn parse(content: &str) -> Result<Snapshot, StoreError> {
    let snapshot: Snapshot = serde_json::from_str(content).map_err(StoreError::Parse)?;
    snapshot.validate().map_err(StoreError::Invalid)?;
    Ok(snapshot)
}
