//! Stocklist Core — daily instrument-list refresh.
//!
//! This crate contains the whole refresh pipeline:
//! - Job configuration (TOML, all fields defaulted)
//! - Credential resolution from the environment and an optional key=value file
//! - Instrument provider trait with a FinMind implementation
//! - Snapshot document and row normalizer
//! - Fixed-path snapshot store with freshness check and atomic writes
//! - Retention sweep for legacy dated files
//! - The job pipeline tying the stages together

pub mod config;
pub mod credential;
pub mod data;
pub mod job;
pub mod snapshot;
pub mod store;
pub mod sweep;

pub use config::{ConfigError, JobConfig, ProviderConfig};
pub use credential::{Credential, EnvSource, ProcessEnv};
pub use data::{FetchError, FinMindProvider, InstrumentProvider, RawInstrument};
pub use job::{run, JobError, RunOptions, RunOutcome};
pub use snapshot::{InstrumentRecord, Snapshot};
pub use store::{Freshness, SnapshotStore, StoreError};
pub use sweep::{SweepReport, Sweeper};
