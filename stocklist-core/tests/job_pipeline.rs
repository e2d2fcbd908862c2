//! End-to-end tests for the refresh pipeline using a counting mock provider.

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use stocklist_core::{
    run, Credential, FetchError, Freshness, InstrumentProvider, JobConfig, JobError,
    RawInstrument, RunOptions, RunOutcome, Snapshot, SnapshotStore,
};

struct MockProvider {
    rows: Vec<RawInstrument>,
    calls: AtomicUsize,
    seen_token: std::sync::Mutex<Option<String>>,
}

impl MockProvider {
    fn with_rows(rows: Vec<RawInstrument>) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
            seen_token: std::sync::Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InstrumentProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch_instruments(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawInstrument>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_token.lock().unwrap() = Some(credential.expose().to_string());
        Ok(self.rows.clone())
    }
}

fn now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(8 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 20, 8, 0, 0)
        .unwrap()
}

fn sample_rows() -> Vec<RawInstrument> {
    vec![
        RawInstrument::new("2330", "台積電", Some("半導體業")),
        RawInstrument::new("2317", "鴻海", Some("其他電子業")),
        RawInstrument::new("0050", "元大台灣50", None),
    ]
}

fn config_in(dir: &Path) -> JobConfig {
    JobConfig {
        snapshot_path: dir.join("public").join("stock_list.json"),
        legacy_dir: dir.to_path_buf(),
        env_file: None,
        ..JobConfig::default()
    }
}

fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

fn token_env() -> HashMap<String, String> {
    HashMap::from([("FINMIND_TOKEN".to_string(), "test-token".to_string())])
}

fn seed_snapshot(config: &JobConfig, at: DateTime<FixedOffset>) -> Snapshot {
    let snap = Snapshot::from_rows(
        &[RawInstrument::new("1101", "台泥", Some("水泥工業"))],
        "台股",
        at,
    );
    SnapshotStore::new(&config.snapshot_path).write(&snap).unwrap();
    snap
}

#[test]
fn absent_snapshot_is_fetched_and_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let provider = MockProvider::with_rows(sample_rows());

    let outcome = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(
        provider.seen_token.lock().unwrap().as_deref(),
        Some("test-token")
    );
    match outcome {
        RunOutcome::Refreshed {
            previous, count, ..
        } => {
            assert_eq!(previous, Freshness::Absent);
            assert_eq!(count, 3);
        }
        other => panic!("expected refresh, got {other:?}"),
    }

    let written = SnapshotStore::new(&config.snapshot_path).read().unwrap();
    assert_eq!(written.date, now().date_naive());
    assert_eq!(written.count, 3);
    assert_eq!(written.instruments["2330"].market, "台股");
}

#[test]
fn fresh_snapshot_short_circuits_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let seeded = seed_snapshot(&config, now() - Duration::hours(2));
    let provider = MockProvider::with_rows(sample_rows());

    let outcome = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    assert!(matches!(outcome, RunOutcome::AlreadyFresh { .. }));
    assert_eq!(provider.calls(), 0);
    let on_disk = SnapshotStore::new(&config.snapshot_path).read().unwrap();
    assert_eq!(on_disk, seeded);
}

#[test]
fn stale_snapshot_is_refetched_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let yesterday = now() - Duration::days(1);
    seed_snapshot(&config, yesterday);
    let provider = MockProvider::with_rows(sample_rows());

    let outcome = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    assert_eq!(provider.calls(), 1);
    match outcome {
        RunOutcome::Refreshed { previous, .. } => assert_eq!(
            previous,
            Freshness::Stale {
                date: yesterday.date_naive()
            }
        ),
        other => panic!("expected refresh, got {other:?}"),
    }
}

#[test]
fn force_overwrites_fresh_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let seeded = seed_snapshot(&config, now() - Duration::hours(2));
    let provider = MockProvider::with_rows(sample_rows());

    let options = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    run(&config, &token_env(), &provider, options, now()).unwrap();

    assert_eq!(provider.calls(), 1);
    let on_disk = SnapshotStore::new(&config.snapshot_path).read().unwrap();
    assert_eq!(on_disk.timestamp, now());
    assert_ne!(on_disk.timestamp, seeded.timestamp);
    assert_eq!(on_disk.count, 3);
}

#[test]
fn corrupt_snapshot_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    fs::create_dir_all(config.snapshot_path.parent().unwrap()).unwrap();
    fs::write(&config.snapshot_path, "{\"date\": \"garbage\"").unwrap();
    let provider = MockProvider::with_rows(sample_rows());

    let outcome = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(matches!(
        outcome,
        RunOutcome::Refreshed {
            previous: Freshness::Corrupt { .. },
            ..
        }
    ));
    assert!(SnapshotStore::new(&config.snapshot_path).read().is_ok());
}

#[test]
fn missing_credential_fails_before_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let provider = MockProvider::with_rows(sample_rows());

    let err = run(
        &config,
        &no_env(),
        &provider,
        RunOptions::default(),
        now(),
    )
    .unwrap_err();

    assert!(matches!(err, JobError::MissingCredential { .. }));
    assert_ne!(err.exit_code(), 0);
    assert_eq!(provider.calls(), 0);
    assert!(!config.snapshot_path.exists());
}

#[test]
fn credential_file_supplies_token() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    fs::write(&env_path, "# local dev\nFINMIND_TOKEN='from-file'\n").unwrap();
    let config = JobConfig {
        env_file: Some(env_path),
        ..config_in(dir.path())
    };
    let provider = MockProvider::with_rows(sample_rows());

    run(&config, &no_env(), &provider, RunOptions::default(), now()).unwrap();

    assert_eq!(
        provider.seen_token.lock().unwrap().as_deref(),
        Some("from-file")
    );
}

#[test]
fn empty_result_keeps_prior_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let seeded = seed_snapshot(&config, now() - Duration::days(1));
    let provider = MockProvider::with_rows(Vec::new());

    let err = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap_err();

    assert!(matches!(err, JobError::Fetch(FetchError::EmptyResult)));
    assert_eq!(provider.calls(), 1);
    let on_disk = SnapshotStore::new(&config.snapshot_path).read().unwrap();
    assert_eq!(on_disk, seeded);
}

#[test]
fn refresh_sweeps_legacy_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let today = now().date_naive();
    let old = dir
        .path()
        .join(format!("stock_list_{}.json", today - Duration::days(9)));
    let recent = dir
        .path()
        .join(format!("stock_list_{}.json", today - Duration::days(1)));
    fs::write(&old, "{}").unwrap();
    fs::write(&recent, "{}").unwrap();
    let provider = MockProvider::with_rows(sample_rows());

    let outcome = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    assert!(!old.exists());
    assert!(recent.exists());
    match outcome {
        RunOutcome::Refreshed { sweep, .. } => {
            assert_eq!(sweep.removed, vec![old]);
            assert_eq!(sweep.kept, vec![recent]);
        }
        other => panic!("expected refresh, got {other:?}"),
    }
}

#[test]
fn sweep_failure_does_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    seed_snapshot(&config, now() - Duration::days(1));
    // A directory with a matching name cannot be removed as a file.
    let stuck = dir.path().join("stock_list_2000-01-01.json");
    fs::create_dir(&stuck).unwrap();
    let provider = MockProvider::with_rows(sample_rows());

    let outcome = run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    match outcome {
        RunOutcome::Refreshed { count, sweep, .. } => {
            assert_eq!(count, 3);
            assert!(!sweep.is_clean());
            assert_eq!(sweep.failed.len(), 1);
            assert!(sweep.removed.is_empty());
        }
        other => panic!("expected refresh, got {other:?}"),
    }
    assert!(stuck.exists());
    let written = SnapshotStore::new(&config.snapshot_path).read().unwrap();
    assert_eq!(written.date, now().date_naive());
}

#[test]
fn short_circuit_skips_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    seed_snapshot(&config, now());
    let old = dir.path().join("stock_list_2000-01-01.json");
    fs::write(&old, "{}").unwrap();
    let provider = MockProvider::with_rows(sample_rows());

    run(&config, &token_env(), &provider, RunOptions::default(), now()).unwrap();

    assert!(old.exists());
}
