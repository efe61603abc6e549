//! # Dedup Sweeper
//!
//! Scheduled expiration sweeps over the dedup ledger. Two purges run as one
//! round:
//!
//! - `purge_expired`: rows whose `expiration_date` has passed
//! - `purge_older_than(hard_purge_days)`: rows older than the hard cap by
//!   creation time, regardless of their expiry
//!
//! A round runs once at startup (so missed fires after a restart never
//! extend a row's life past the next boot) and then daily at local
//! midnight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, LocalResult, TimeZone, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::DedupConfig;
use crate::storage::StorageProvider;

/// Daily sweeper over the dedup ledger.
#[derive(Debug)]
pub struct DedupSweeper {
    storage: Arc<StorageProvider>,
    hard_purge_days: i64,
}

impl DedupSweeper {
    pub fn new(storage: Arc<StorageProvider>, config: &DedupConfig) -> Self {
        Self {
            storage,
            hard_purge_days: config.hard_purge_days,
        }
    }

    /// Run both purges once. Returns `(expired, hard_purged)` counts.
    pub async fn run_once(&self) -> (u64, u64) {
        let now = Utc::now();

        let expired = match self.storage.dedup_purge_expired(now).await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "expired-row purge failed");
                0
            }
        };
        let hard_purged = match self
            .storage
            .dedup_purge_older_than(self.hard_purge_days, now)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "hard purge failed");
                0
            }
        };

        info!(expired, hard_purged, "dedup sweep finished");
        (expired, hard_purged)
    }

    /// Start the sweep loop on its own task.
    pub fn spawn(self) -> SweeperHandle {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let loop_running = Arc::clone(&running);
        let loop_shutdown = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            // Startup round covers fires missed while the process was down.
            self.run_once().await;

            while loop_running.load(Ordering::Acquire) {
                let pause = duration_until_next_midnight(Local::now());
                tokio::select! {
                    _ = loop_shutdown.notified() => {}
                    _ = tokio::time::sleep(pause) => {
                        self.run_once().await;
                    }
                }
            }
        });

        SweeperHandle {
            running,
            shutdown,
            handle,
        }
    }
}

/// Handle controlling a spawned sweeper loop.
pub struct SweeperHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
        let _ = self.handle.await;
    }
}

/// Time remaining until the next local midnight. Falls back to 24 hours on
/// a nonexistent local time (DST edge on the midnight boundary).
fn duration_until_next_midnight(now: DateTime<Local>) -> Duration {
    let next_day = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|date| date.and_hms_opt(0, 0, 0));

    let Some(naive_midnight) = next_day else {
        return Duration::from_secs(24 * 60 * 60);
    };

    let next_midnight = match Local.from_local_datetime(&naive_midnight) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => return Duration::from_secs(24 * 60 * 60),
    };

    (next_midnight - now)
        .to_std()
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    #[tokio::test]
    async fn run_once_applies_both_purges() {
        let storage = Arc::new(StorageProvider::new_in_memory());
        let now = Utc::now();

        let expired = Uuid::new_v4();
        storage
            .dedup_insert(
                expired,
                now - ChronoDuration::days(1),
                now - ChronoDuration::days(11),
            )
            .await
            .unwrap();
        let ancient = Uuid::new_v4();
        storage
            .dedup_insert(
                ancient,
                now + ChronoDuration::days(30),
                now - ChronoDuration::days(16),
            )
            .await
            .unwrap();
        let fresh = Uuid::new_v4();
        storage
            .dedup_insert(fresh, now + ChronoDuration::days(10), now)
            .await
            .unwrap();

        let sweeper = DedupSweeper::new(Arc::clone(&storage), &DedupConfig::default());
        let (purged_expired, hard_purged) = sweeper.run_once().await;

        assert_eq!(purged_expired, 1);
        assert_eq!(hard_purged, 1);
        assert!(storage.dedup_exists(fresh).await.unwrap());
        assert_eq!(storage.as_in_memory().unwrap().dedup_len().await, 1);
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_startup_round() {
        let storage = Arc::new(StorageProvider::new_in_memory());
        let now = Utc::now();
        storage
            .dedup_insert(
                Uuid::new_v4(),
                now - ChronoDuration::days(1),
                now - ChronoDuration::days(11),
            )
            .await
            .unwrap();

        let sweeper = DedupSweeper::new(Arc::clone(&storage), &DedupConfig::default());
        let handle = sweeper.spawn();

        for _ in 0..100 {
            if storage.as_in_memory().unwrap().dedup_len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(storage.as_in_memory().unwrap().dedup_len().await, 0);
        handle.stop().await;
    }

    #[test]
    fn next_midnight_is_within_a_day() {
        let pause = duration_until_next_midnight(Local::now());
        assert!(pause > Duration::ZERO);
        assert!(pause <= Duration::from_secs(24 * 60 * 60));
    }
}
