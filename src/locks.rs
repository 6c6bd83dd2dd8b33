//! Advisory file locking for the content index.
//!
//! This module serializes publish operations against the shared content
//! index. Exactly one lock identity exists per site: `content/.locks/publish.lock`.
//!
//! # Lock Record
//!
//! The lock file contains JSON metadata:
//! - `lock_id`: unique token for one acquisition (hex timestamp + random suffix)
//! - `created_at`: RFC3339 timestamp, used only to compute staleness age
//! - `owner_token`: `pid@host`, diagnostics only
//!
//! Lock files are created with **create_new** semantics (exclusive create),
//! so only one process can hold the lock at a time. Ownership is decided by
//! `lock_id` equality alone; `owner_token` is never consulted.
//!
//! # Staleness
//!
//! A record whose age strictly exceeds the configured threshold is presumed
//! abandoned by a crashed publisher. Any waiting acquirer may reclaim it:
//! the reclaim is logged loudly, recorded as a metrics event (best-effort),
//! and the record deleted before the acquirer retries the exclusive create.
//! Two acquirers that both detect staleness simply race on the create; the
//! loser re-enters the wait loop.
//!
//! # Waiting
//!
//! There is no queueing or fairness among waiters. Acquisition polls at a
//! fixed interval under a wall-clock timeout. The clock and sleep are behind
//! the [`Clock`] trait so tests can simulate elapsed time without waiting.

use crate::config::Config;
use crate::context::SiteContext;
use crate::error::{CreelError, Result};
use crate::metrics::{MetricsRecorder, ReclaimEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Time source and sleep used by the acquisition loop.
///
/// Production code uses [`SystemClock`]; tests inject a fake that advances
/// on `sleep` so staleness and timeouts run without real wall-clock delay.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Tunable parameters for lock acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    /// Age beyond which a lock record is presumed abandoned. Strict: a
    /// record aged exactly this long is still live.
    pub stale_after: Duration,

    /// Interval between acquisition attempts while the lock is held.
    pub poll_interval: Duration,

    /// Wall-clock budget for one `acquire` call.
    pub acquire_timeout: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl LockSettings {
    /// Build settings from the site config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_after: Duration::from_secs(config.stale_lock_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        }
    }
}

/// Lock metadata stored in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique token for this acquisition instance. Immutable once written;
    /// never reused across acquisitions.
    pub lock_id: String,

    /// When this acquisition was created (RFC3339).
    pub created_at: DateTime<Utc>,

    /// The acquiring process, as `pid@host`. Diagnostics only.
    pub owner_token: String,
}

impl LockRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            lock_id: generate_lock_id(now),
            created_at: now,
            owner_token: owner_token(),
        }
    }

    /// Serialize to pretty JSON for the lock file.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CreelError::LockStorage(format!("failed to serialize lock record: {}", e)))
    }

    /// Age of this record at `now`. Backwards clock jumps clamp to zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Generate a lock id from a high-resolution timestamp plus a random suffix,
/// unique even under rapid sequential acquisitions.
fn generate_lock_id(now: DateTime<Utc>) -> String {
    let micros = now.timestamp_micros().max(0);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{:x}-{}", micros, &suffix[..8])
}

/// Owner token for lock metadata: `pid@host`.
fn owner_token() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", std::process::id(), host)
}

/// Format an age for operator-facing output.
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Proof of one successful acquisition, consumed by `release`.
///
/// Dropping an unreleased handle performs a best-effort verified delete
/// (read, compare `lock_id`, delete only on match) and warns on failure.
/// Explicit `release` is the error-surfacing path; `with_lock` always uses it.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    lock_id: String,
    owner_token: String,
    released: bool,
}

impl LockHandle {
    /// The lock id granted at acquisition.
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// The owner token written into the record.
    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match fs::read_to_string(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                eprintln!(
                    "Warning: lock {} dropped without release; could not verify store: {}",
                    self.lock_id, e
                );
            }
            Ok(content) => match serde_json::from_str::<LockRecord>(&content) {
                Ok(record) if record.lock_id == self.lock_id => {
                    if let Err(e) = fs::remove_file(&self.path) {
                        eprintln!(
                            "Warning: failed to release dropped lock '{}': {}",
                            self.path.display(),
                            e
                        );
                    }
                }
                _ => {
                    eprintln!(
                        "Warning: lock {} dropped without release but the store holds a \
                         different record; leaving it in place",
                        self.lock_id
                    );
                }
            },
        }
    }
}

/// Current state of the lock store, for `lock status` and `lock clear`.
#[derive(Debug, Clone)]
pub struct LockStatus {
    /// Path of the lock file.
    pub path: PathBuf,

    /// The parsed record, or `None` if the file exists but is unreadable.
    pub record: Option<LockRecord>,

    /// Computed age, when the record is readable.
    pub age: Option<Duration>,

    /// Whether the age strictly exceeds the stale threshold.
    pub is_stale: bool,
}

/// What the store contained at read time.
enum StoreState {
    Empty,
    Held(LockRecord),
    Unreadable(String),
}

/// Mutual exclusion over the shared content index.
///
/// One manager per lock identity; multiple managers (in multiple processes)
/// pointing at the same path compete through the filesystem.
#[derive(Debug)]
pub struct LockManager<C: Clock = SystemClock> {
    lock_path: PathBuf,
    settings: LockSettings,
    metrics: MetricsRecorder,
    clock: C,
}

impl LockManager<SystemClock> {
    /// Build the publish-lock manager for a site.
    pub fn for_site(ctx: &SiteContext, config: &Config) -> Self {
        Self::with_clock(
            ctx.publish_lock_path(),
            MetricsRecorder::new(ctx.metrics_path()),
            LockSettings::from_config(config),
            SystemClock,
        )
    }

    /// Build a manager for an explicit lock path.
    pub fn new<P: AsRef<Path>>(
        lock_path: P,
        metrics: MetricsRecorder,
        settings: LockSettings,
    ) -> Self {
        Self::with_clock(lock_path, metrics, settings, SystemClock)
    }
}

impl<C: Clock> LockManager<C> {
    /// Build a manager with an injected clock.
    pub fn with_clock<P: AsRef<Path>>(
        lock_path: P,
        metrics: MetricsRecorder,
        settings: LockSettings,
        clock: C,
    ) -> Self {
        Self {
            lock_path: lock_path.as_ref().to_path_buf(),
            settings,
            metrics,
            clock,
        }
    }

    /// Path of the lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// The injected clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Acquire exclusive access to the content index.
    ///
    /// Attempts an exclusive create of the lock record. While another
    /// publisher holds a live record, waits `poll_interval` between retries
    /// up to `acquire_timeout`, then fails with `LockTimeout`. A record aged
    /// strictly beyond `stale_after` is reclaimed (logged, metric recorded
    /// best-effort, deleted) and acquisition retried immediately.
    ///
    /// On timeout the store is left untouched.
    pub fn acquire(&self) -> Result<LockHandle> {
        self.ensure_lock_dir()?;
        let started = self.clock.now();

        loop {
            if let Some(handle) = self.try_create()? {
                return Ok(handle);
            }

            let mut wait_before_retry = true;
            match self.read_store()? {
                // Vanished between the failed create and the read; the
                // holder released. Retry the create immediately.
                StoreState::Empty => wait_before_retry = false,
                StoreState::Held(record) => {
                    let age = record.age_at(self.clock.now());
                    if age > self.settings.stale_after {
                        self.reclaim_stale(&record, age)?;
                        wait_before_retry = false;
                    }
                }
                // Age cannot be computed, so the record cannot be proven
                // stale. Treat it as live; `creel lock clear --force` is
                // the operator escape hatch.
                StoreState::Unreadable(_) => {}
            }

            if wait_before_retry {
                let waited = self
                    .clock
                    .now()
                    .signed_duration_since(started)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if waited >= self.settings.acquire_timeout {
                    return Err(CreelError::LockTimeout {
                        path: self.lock_path.display().to_string(),
                        waited_ms: waited.as_millis() as u64,
                        timeout_ms: self.settings.acquire_timeout.as_millis() as u64,
                    });
                }
                self.clock.sleep(self.settings.poll_interval);
            }
        }
    }

    /// Release a previously acquired lock.
    ///
    /// Deletes the record only if the store still holds the handle's
    /// `lock_id`. An empty store is treated as already released (warning,
    /// success). A store holding a different record means this lock was
    /// reclaimed as stale while the caller believed it held exclusivity:
    /// fails with `OwnershipViolation` and leaves the foreign record alone.
    pub fn release(&self, mut handle: LockHandle) -> Result<()> {
        handle.released = true;

        match self.read_store()? {
            StoreState::Empty => {
                eprintln!(
                    "Warning: releasing lock {} but no record exists; treating as already released",
                    handle.lock_id
                );
                Ok(())
            }
            StoreState::Held(record) if record.lock_id == handle.lock_id => {
                match fs::remove_file(&self.lock_path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(CreelError::LockStorage(format!(
                        "failed to remove lock file '{}': {}",
                        self.lock_path.display(),
                        e
                    ))),
                }
            }
            StoreState::Held(record) => Err(CreelError::OwnershipViolation {
                expected_lock_id: handle.lock_id.clone(),
                expected_owner: handle.owner_token.clone(),
                actual_lock_id: record.lock_id,
                actual_owner: record.owner_token,
            }),
            StoreState::Unreadable(reason) => {
                eprintln!(
                    "Warning: lock store unreadable during release of {}: {}",
                    handle.lock_id, reason
                );
                Err(CreelError::OwnershipViolation {
                    expected_lock_id: handle.lock_id.clone(),
                    expected_owner: handle.owner_token.clone(),
                    actual_lock_id: "<unreadable>".to_string(),
                    actual_owner: "<unreadable>".to_string(),
                })
            }
        }
    }

    /// Run `f` while holding the publish lock.
    ///
    /// Release is attempted on every exit path of `f`. An error from `f`
    /// propagates after the release attempt; if the release itself fails
    /// with an ownership violation, that error wins and the closure error
    /// is logged, so the violation is never suppressed.
    pub fn with_lock<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let handle = self.acquire()?;
        let outcome = f();

        match (outcome, self.release(handle)) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(fn_err), Err(release_err)) => {
                if matches!(release_err, CreelError::OwnershipViolation { .. }) {
                    eprintln!(
                        "Warning: error inside locked section (superseded by release failure): {}",
                        fn_err
                    );
                    Err(release_err)
                } else {
                    eprintln!("Warning: failed to release publish lock: {}", release_err);
                    Err(fn_err)
                }
            }
        }
    }

    /// Report the current lock state, or `None` when no lock is held.
    pub fn inspect(&self) -> Result<Option<LockStatus>> {
        match self.read_store()? {
            StoreState::Empty => Ok(None),
            StoreState::Held(record) => {
                let age = record.age_at(self.clock.now());
                Ok(Some(LockStatus {
                    path: self.lock_path.clone(),
                    is_stale: age > self.settings.stale_after,
                    age: Some(age),
                    record: Some(record),
                }))
            }
            StoreState::Unreadable(_) => Ok(Some(LockStatus {
                path: self.lock_path.clone(),
                record: None,
                age: None,
                is_stale: false,
            })),
        }
    }

    /// Unconditionally remove the lock record (operator path).
    ///
    /// The caller is responsible for confirming this is appropriate (the
    /// CLI requires `--force`). Returns the prior state for audit output.
    pub fn clear(&self) -> Result<LockStatus> {
        let status = self.inspect()?.ok_or_else(|| {
            CreelError::UserError(format!(
                "no publish lock to clear at: {}",
                self.lock_path.display()
            ))
        })?;

        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(status),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(status),
            Err(e) => Err(CreelError::LockStorage(format!(
                "failed to clear lock file '{}': {}",
                self.lock_path.display(),
                e
            ))),
        }
    }

    /// Try to create the lock record exclusively.
    ///
    /// Returns `Ok(None)` when a record already exists; any other failure
    /// is a storage error.
    fn try_create(&self) -> Result<Option<LockHandle>> {
        let record = LockRecord::new(self.clock.now());
        let json = record.to_json()?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(CreelError::LockStorage(format!(
                    "failed to create lock file '{}': {}",
                    self.lock_path.display(),
                    e
                )));
            }
        };

        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                // A half-written record must not linger as a phantom holder
                let _ = fs::remove_file(&self.lock_path);
                CreelError::LockStorage(format!(
                    "failed to write lock record '{}': {}",
                    self.lock_path.display(),
                    e
                ))
            })?;

        Ok(Some(LockHandle {
            path: self.lock_path.clone(),
            lock_id: record.lock_id,
            owner_token: record.owner_token,
            released: false,
        }))
    }

    /// Read the current state of the lock store.
    fn read_store(&self) -> Result<StoreState> {
        let content = match fs::read_to_string(&self.lock_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreState::Empty),
            Err(e) => {
                return Err(CreelError::LockStorage(format!(
                    "failed to read lock file '{}': {}",
                    self.lock_path.display(),
                    e
                )));
            }
        };

        match serde_json::from_str::<LockRecord>(&content) {
            Ok(record) => Ok(StoreState::Held(record)),
            Err(e) => Ok(StoreState::Unreadable(e.to_string())),
        }
    }

    /// Remove an abandoned record so acquisition can proceed.
    ///
    /// Logs loudly, records a metrics event (best-effort, failures only
    /// warned), then deletes. A concurrent reclaimer may win the delete;
    /// `NotFound` is not an error.
    fn reclaim_stale(&self, record: &LockRecord, age: Duration) -> Result<()> {
        eprintln!("WARNING: reclaiming stale publish lock");
        eprintln!("  Path:       {}", self.lock_path.display());
        eprintln!("  Lock id:    {}", record.lock_id);
        eprintln!("  Owner:      {}", record.owner_token);
        eprintln!(
            "  Created:    {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        eprintln!(
            "  Age:        {} (stale threshold: {})",
            format_age(age),
            format_age(self.settings.stale_after)
        );

        let event = ReclaimEvent {
            lock_id: record.lock_id.clone(),
            owner_token: record.owner_token.clone(),
            created_at: record.created_at,
            age_ms: age.as_millis() as u64,
        };
        if let Err(e) = self.metrics.record_reclaim(&event) {
            eprintln!("Warning: failed to record lock reclaim metric: {}", e);
        }

        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CreelError::LockStorage(format!(
                "failed to remove stale lock file '{}': {}",
                self.lock_path.display(),
                e
            ))),
        }
    }

    fn ensure_lock_dir(&self) -> Result<()> {
        if let Some(parent) = self.lock_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                CreelError::LockStorage(format!(
                    "failed to create locks directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Fixed test epoch: 2026-01-01T00:00:00Z in epoch millis.
    const EPOCH_MS: i64 = 1_767_225_600_000;

    /// Deterministic clock that advances only when slept.
    struct FakeClock {
        now_ms: Cell<i64>,
        sleeps: Cell<u32>,
    }

    impl FakeClock {
        fn at_epoch() -> Self {
            Self::at(EPOCH_MS)
        }

        fn at(ms: i64) -> Self {
            Self {
                now_ms: Cell::new(ms),
                sleeps: Cell::new(0),
            }
        }

        fn advance(&self, duration: Duration) {
            self.now_ms
                .set(self.now_ms.get() + duration.as_millis() as i64);
        }

        fn sleep_count(&self) -> u32 {
            self.sleeps.get()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(self.now_ms.get()).single().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.set(self.sleeps.get() + 1);
            self.advance(duration);
        }
    }

    fn test_settings() -> LockSettings {
        LockSettings {
            stale_after: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            acquire_timeout: Duration::from_secs(1),
        }
    }

    fn manager_at(temp: &TempDir, clock: FakeClock) -> LockManager<FakeClock> {
        manager_with(temp, clock, test_settings())
    }

    fn manager_with(
        temp: &TempDir,
        clock: FakeClock,
        settings: LockSettings,
    ) -> LockManager<FakeClock> {
        LockManager::with_clock(
            temp.path().join("publish.lock"),
            MetricsRecorder::new(temp.path().join("lock-events.json")),
            settings,
            clock,
        )
    }

    fn write_record(temp: &TempDir, lock_id: &str, created_ms: i64) {
        let record = LockRecord {
            lock_id: lock_id.to_string(),
            created_at: Utc.timestamp_millis_opt(created_ms).single().unwrap(),
            owner_token: "999@other-host".to_string(),
        };
        std::fs::write(
            temp.path().join("publish.lock"),
            record.to_json().unwrap(),
        )
        .unwrap();
    }

    fn stored_lock_id(temp: &TempDir) -> Option<String> {
        let content = std::fs::read_to_string(temp.path().join("publish.lock")).ok()?;
        let record: LockRecord = serde_json::from_str(&content).ok()?;
        Some(record.lock_id)
    }

    #[test]
    fn acquire_writes_record_and_release_removes_it() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let handle = manager.acquire().unwrap();
        let lock_path = temp.path().join("publish.lock");
        assert!(lock_path.exists());

        let content = std::fs::read_to_string(&lock_path).unwrap();
        let record: LockRecord = serde_json::from_str(&content).unwrap();
        assert_eq!(record.lock_id, handle.lock_id());
        assert!(record.owner_token.contains('@'));

        manager.release(handle).unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn acquire_creates_missing_locks_directory() {
        let temp = TempDir::new().unwrap();
        let manager = LockManager::with_clock(
            temp.path().join("content").join(".locks").join("publish.lock"),
            MetricsRecorder::new(temp.path().join("lock-events.json")),
            test_settings(),
            FakeClock::at_epoch(),
        );

        let handle = manager.acquire().unwrap();
        assert!(manager.lock_path().exists());
        manager.release(handle).unwrap();
    }

    #[test]
    fn second_acquire_waits_then_times_out() {
        let temp = TempDir::new().unwrap();
        let holder = manager_at(&temp, FakeClock::at_epoch());
        let handle = holder.acquire().unwrap();
        let held_id = handle.lock_id().to_string();

        let waiter = manager_at(&temp, FakeClock::at_epoch());
        let result = waiter.acquire();

        match result {
            Err(CreelError::LockTimeout {
                waited_ms,
                timeout_ms,
                ..
            }) => {
                assert_eq!(timeout_ms, 1000);
                // Bounded by timeout + one poll interval
                assert!(waited_ms >= 1000);
                assert!(waited_ms <= 1100);
            }
            other => panic!("expected LockTimeout, got {:?}", other.map(|h| h.lock_id().to_string())),
        }

        // The waiter polled rather than failing immediately, and the fresh
        // record was never touched.
        assert!(waiter.clock().sleep_count() >= 10);
        assert_eq!(stored_lock_id(&temp).as_deref(), Some(held_id.as_str()));

        holder.release(handle).unwrap();
    }

    #[test]
    fn handoff_after_release_grants_distinct_lock_id() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let first = manager.acquire().unwrap();
        let first_id = first.lock_id().to_string();
        manager.release(first).unwrap();

        let second = manager.acquire().unwrap();
        assert_ne!(second.lock_id(), first_id);
        manager.release(second).unwrap();
    }

    #[test]
    fn release_on_empty_store_succeeds() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let handle = manager.acquire().unwrap();
        std::fs::remove_file(temp.path().join("publish.lock")).unwrap();

        assert!(manager.release(handle).is_ok());
    }

    #[test]
    fn release_foreign_record_is_ownership_violation() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let handle = manager.acquire().unwrap();
        let my_id = handle.lock_id().to_string();

        // Another party reclaimed and re-acquired while we were "holding"
        std::fs::remove_file(temp.path().join("publish.lock")).unwrap();
        write_record(&temp, "foreign-lock-id", EPOCH_MS);

        let err = manager.release(handle).unwrap_err();
        match err {
            CreelError::OwnershipViolation {
                expected_lock_id,
                actual_lock_id,
                actual_owner,
                ..
            } => {
                assert_eq!(expected_lock_id, my_id);
                assert_eq!(actual_lock_id, "foreign-lock-id");
                assert_eq!(actual_owner, "999@other-host");
            }
            other => panic!("expected OwnershipViolation, got {:?}", other),
        }

        // The foreign record must never be deleted
        assert_eq!(stored_lock_id(&temp).as_deref(), Some("foreign-lock-id"));
    }

    #[test]
    fn record_at_exact_threshold_is_not_reclaimed() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "aging-lock", EPOCH_MS);

        // Clock sits exactly at created_at + threshold
        let clock = FakeClock::at(EPOCH_MS + 300_000);
        let manager = manager_at(&temp, clock);

        // Strict inequality: age == threshold is still live, so the first
        // pass must wait one poll. The sleep pushes the age past the
        // threshold and the second pass reclaims.
        let handle = manager.acquire().unwrap();
        assert_eq!(manager.clock().sleep_count(), 1);

        let metrics = MetricsRecorder::new(temp.path().join("lock-events.json"));
        let events = metrics.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].age_ms, 300_100);

        manager.release(handle).unwrap();
    }

    #[test]
    fn younger_record_is_never_reclaimed() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "fresh-lock", EPOCH_MS);

        let clock = FakeClock::at(EPOCH_MS + 60_000); // one minute old
        let manager = manager_at(&temp, clock);

        let err = manager.acquire().unwrap_err();
        assert!(matches!(err, CreelError::LockTimeout { .. }));
        assert_eq!(stored_lock_id(&temp).as_deref(), Some("fresh-lock"));

        let metrics = MetricsRecorder::new(temp.path().join("lock-events.json"));
        assert!(metrics.read_events().unwrap().is_empty());
    }

    #[test]
    fn stale_record_is_reclaimed_and_acquired() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "abandoned-lock", EPOCH_MS);

        // One second past the threshold
        let clock = FakeClock::at(EPOCH_MS + 301_000);
        let manager = manager_at(&temp, clock);

        let handle = manager.acquire().unwrap();
        assert_ne!(handle.lock_id(), "abandoned-lock");

        let metrics = MetricsRecorder::new(temp.path().join("lock-events.json"));
        let events = metrics.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].lock_id, "abandoned-lock");
        assert_eq!(events[0].owner_token, "999@other-host");
        assert_eq!(events[0].age_ms, 301_000);

        manager.release(handle).unwrap();
    }

    #[test]
    fn metrics_failure_does_not_block_reclaim() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "abandoned-lock", EPOCH_MS);

        // Metrics path is a directory, so every write fails
        let metrics_path = temp.path().join("lock-events.json");
        std::fs::create_dir(&metrics_path).unwrap();

        let manager = LockManager::with_clock(
            temp.path().join("publish.lock"),
            MetricsRecorder::new(&metrics_path),
            test_settings(),
            FakeClock::at(EPOCH_MS + 301_000),
        );

        let handle = manager.acquire().unwrap();
        assert_ne!(handle.lock_id(), "abandoned-lock");
        manager.release(handle).unwrap();
    }

    #[test]
    fn reclaim_race_loser_falls_back_to_waiting() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "abandoned-lock", EPOCH_MS);

        // Both detect staleness; the winner reclaims and recreates first
        let winner = manager_at(&temp, FakeClock::at(EPOCH_MS + 301_000));
        let handle = winner.acquire().unwrap();
        let winner_id = handle.lock_id().to_string();

        // The loser now sees the winner's fresh record and must wait it
        // out rather than reclaim or crash
        let loser = manager_at(&temp, FakeClock::at(EPOCH_MS + 301_000));
        let err = loser.acquire().unwrap_err();
        assert!(matches!(err, CreelError::LockTimeout { .. }));
        assert_eq!(stored_lock_id(&temp).as_deref(), Some(winner_id.as_str()));

        // Exactly one reclaim was recorded
        let metrics = MetricsRecorder::new(temp.path().join("lock-events.json"));
        assert_eq!(metrics.read_events().unwrap().len(), 1);

        winner.release(handle).unwrap();
    }

    #[test]
    fn unreadable_record_is_not_reclaimed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("publish.lock"), "not valid json {").unwrap();

        let manager = manager_at(&temp, FakeClock::at_epoch());
        let err = manager.acquire().unwrap_err();
        assert!(matches!(err, CreelError::LockTimeout { .. }));

        let content = std::fs::read_to_string(temp.path().join("publish.lock")).unwrap();
        assert_eq!(content, "not valid json {");
    }

    #[test]
    fn with_lock_runs_closure_and_releases() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let value = manager
            .with_lock(|| {
                assert!(temp.path().join("publish.lock").exists());
                Ok(7)
            })
            .unwrap();

        assert_eq!(value, 7);
        assert!(!temp.path().join("publish.lock").exists());
    }

    #[test]
    fn with_lock_releases_when_closure_fails() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let err = manager
            .with_lock::<(), _>(|| Err(CreelError::UserError("mutation failed".to_string())))
            .unwrap_err();

        assert!(matches!(err, CreelError::UserError(_)));
        assert!(!temp.path().join("publish.lock").exists());
    }

    #[test]
    fn with_lock_surfaces_ownership_violation_from_release() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let err = manager
            .with_lock(|| {
                // Simulate a reclaim-and-reacquire during the closure
                std::fs::remove_file(temp.path().join("publish.lock")).unwrap();
                write_record(&temp, "thief", EPOCH_MS);
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, CreelError::OwnershipViolation { .. }));
        assert_eq!(stored_lock_id(&temp).as_deref(), Some("thief"));
    }

    #[test]
    fn with_lock_prefers_violation_over_closure_error() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let err = manager
            .with_lock::<(), _>(|| {
                std::fs::remove_file(temp.path().join("publish.lock")).unwrap();
                write_record(&temp, "thief", EPOCH_MS);
                Err(CreelError::UserError("mutation failed".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, CreelError::OwnershipViolation { .. }));
    }

    #[test]
    fn dropped_handle_releases_own_record() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        {
            let _handle = manager.acquire().unwrap();
            assert!(temp.path().join("publish.lock").exists());
        }

        assert!(!temp.path().join("publish.lock").exists());
    }

    #[test]
    fn dropped_handle_leaves_foreign_record_alone() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        {
            let _handle = manager.acquire().unwrap();
            std::fs::remove_file(temp.path().join("publish.lock")).unwrap();
            write_record(&temp, "foreign-lock-id", EPOCH_MS);
        }

        assert_eq!(stored_lock_id(&temp).as_deref(), Some("foreign-lock-id"));
    }

    #[test]
    fn inspect_reports_lock_state() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at(EPOCH_MS + 60_000));

        assert!(manager.inspect().unwrap().is_none());

        write_record(&temp, "held-lock", EPOCH_MS);
        let status = manager.inspect().unwrap().unwrap();
        let record = status.record.unwrap();
        assert_eq!(record.lock_id, "held-lock");
        assert_eq!(status.age.unwrap(), Duration::from_secs(60));
        assert!(!status.is_stale);
    }

    #[test]
    fn inspect_flags_stale_lock() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "old-lock", EPOCH_MS);

        let manager = manager_at(&temp, FakeClock::at(EPOCH_MS + 301_000));
        let status = manager.inspect().unwrap().unwrap();
        assert!(status.is_stale);
    }

    #[test]
    fn inspect_reports_unreadable_record() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("publish.lock"), "garbage").unwrap();

        let manager = manager_at(&temp, FakeClock::at_epoch());
        let status = manager.inspect().unwrap().unwrap();
        assert!(status.record.is_none());
        assert!(!status.is_stale);
    }

    #[test]
    fn clear_removes_record_and_reports_it() {
        let temp = TempDir::new().unwrap();
        write_record(&temp, "stuck-lock", EPOCH_MS);

        let manager = manager_at(&temp, FakeClock::at(EPOCH_MS + 10_000));
        let status = manager.clear().unwrap();

        assert_eq!(status.record.unwrap().lock_id, "stuck-lock");
        assert!(!temp.path().join("publish.lock").exists());
    }

    #[test]
    fn clear_without_lock_fails() {
        let temp = TempDir::new().unwrap();
        let manager = manager_at(&temp, FakeClock::at_epoch());

        let err = manager.clear().unwrap_err();
        assert!(matches!(err, CreelError::UserError(_)));
    }

    #[test]
    fn lock_ids_are_unique_within_one_instant() {
        let now = Utc.timestamp_millis_opt(EPOCH_MS).single().unwrap();
        let a = generate_lock_id(now);
        let b = generate_lock_id(now);
        assert_ne!(a, b);
    }

    #[test]
    fn age_clamps_backwards_clock_jump_to_zero() {
        let record = LockRecord {
            lock_id: "x".to_string(),
            created_at: Utc.timestamp_millis_opt(EPOCH_MS).single().unwrap(),
            owner_token: "1@h".to_string(),
        };
        let earlier = Utc.timestamp_millis_opt(EPOCH_MS - 5_000).single().unwrap();
        assert_eq!(record.age_at(earlier), Duration::ZERO);
    }

    #[test]
    fn format_age_buckets() {
        assert_eq!(format_age(Duration::from_secs(42)), "42s");
        assert_eq!(format_age(Duration::from_secs(301)), "5m 1s");
        assert_eq!(format_age(Duration::from_secs(7260)), "2h 1m");
    }

    #[test]
    fn concurrent_publishers_serialize_their_mutations() {
        let temp = TempDir::new().unwrap();
        let counter_path = temp.path().join("counter.txt");
        std::fs::write(&counter_path, "0").unwrap();

        let settings = LockSettings {
            stale_after: Duration::from_secs(300),
            poll_interval: Duration::from_millis(5),
            acquire_timeout: Duration::from_secs(10),
        };

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let counter_path = counter_path.clone();
                let lock_path = temp.path().join("publish.lock");
                let metrics_path = temp.path().join("lock-events.json");
                scope.spawn(move || {
                    let manager = LockManager::new(
                        lock_path,
                        MetricsRecorder::new(metrics_path),
                        settings,
                    );
                    for _ in 0..5 {
                        manager
                            .with_lock(|| {
                                // Unprotected read-modify-write; only the
                                // lock keeps this race-free
                                let n: u64 = std::fs::read_to_string(&counter_path)
                                    .unwrap()
                                    .trim()
                                    .parse()
                                    .unwrap();
                                std::fs::write(&counter_path, (n + 1).to_string()).unwrap();
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });

        let final_count: u64 = std::fs::read_to_string(&counter_path)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(final_count, 20);

        // No reclaims should have occurred under healthy handoff
        let metrics = MetricsRecorder::new(temp.path().join("lock-events.json"));
        assert!(metrics.read_events().unwrap().is_empty());
    }
}
