//! # Worker Pool
//!
//! A bounded pool of tokio tasks fed from one FIFO queue:
//!
//! - queue capacity 500 (configurable); a full queue rejects the submission
//!   (**abort** policy); callers log the rejection and complete the
//!   affected pending slot exceptionally
//! - minimum 5 / maximum 20 workers; the pool grows toward the maximum
//!   while work is queued and shrinks back when a worker sits idle past the
//!   60-second reaper timeout
//! - a monitor task logs active/queued/completed/submitted counts every
//!   30 seconds
//! - `shutdown()` stops intake, drains for up to 60 seconds, then aborts
//!   whatever is still running

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{RelayError, RelayResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Monotonic counters shared by workers, the monitor, and tests.
#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    queued: AtomicUsize,
    active: AtomicUsize,
    workers: AtomicUsize,
}

/// A point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub queued: usize,
    pub active: usize,
    pub workers: usize,
}

/// Bounded concurrent task executor.
pub struct WorkerPool {
    sender: StdMutex<Option<mpsc::Sender<Job>>>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<PoolCounters>,
    config: PoolConfig,
    accepting: Arc<AtomicBool>,
    worker_handles: StdMutex<Vec<JoinHandle<()>>>,
    monitor_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn the minimum worker set and the monitor, and return the pool.
    pub fn start(config: &PoolConfig) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity);
        let pool = Arc::new(Self {
            sender: StdMutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            counters: Arc::new(PoolCounters::default()),
            config: config.clone(),
            accepting: Arc::new(AtomicBool::new(true)),
            worker_handles: StdMutex::new(Vec::new()),
            monitor_handle: StdMutex::new(None),
        });

        for _ in 0..config.min_workers {
            pool.spawn_worker();
        }
        pool.spawn_monitor();
        pool
    }

    /// Enqueue a task. Fails with [`RelayError::Overloaded`] when the queue
    /// is full or the pool is shutting down; the task is dropped in that
    /// case, never silently queued.
    pub fn submit<F>(&self, task: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.accepting.load(Ordering::Acquire) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(RelayError::overloaded("worker pool is shutting down"));
        }

        let sender = {
            let guard = self
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clone()
        };
        let Some(sender) = sender else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(RelayError::overloaded("worker pool is shutting down"));
        };

        match sender.try_send(Box::pin(task)) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                self.maybe_grow();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::overloaded(format!(
                    "work queue full ({} entries)",
                    self.config.queue_capacity
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::overloaded("worker pool is shutting down"))
            }
        }
    }

    /// Current counter values.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::Relaxed),
            workers: self.counters.workers.load(Ordering::Relaxed),
        }
    }

    /// Stop intake, drain for up to the configured window, then abort
    /// whatever is still outstanding.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);

        // Closing the channel lets workers drain the queue and exit on None.
        {
            let mut guard = self
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take();
        }

        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.shutdown_drain_sec);
        loop {
            let snapshot = self.snapshot();
            if snapshot.queued == 0 && snapshot.active == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    queued = snapshot.queued,
                    active = snapshot.active,
                    "drain window elapsed, aborting outstanding work"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self
                .worker_handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            handle.abort();
        }
        let monitor = {
            let mut guard = self
                .monitor_handle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };
        if let Some(monitor) = monitor {
            monitor.abort();
        }

        let snapshot = self.snapshot();
        info!(
            completed = snapshot.completed,
            rejected = snapshot.rejected,
            "worker pool stopped"
        );
    }

    /// Grow toward the maximum while work is waiting.
    fn maybe_grow(&self) {
        let workers = self.counters.workers.load(Ordering::Acquire);
        if workers < self.config.max_workers
            && self.counters.queued.load(Ordering::Acquire) > 0
        {
            self.spawn_worker();
        }
    }

    fn spawn_worker(&self) {
        let receiver = Arc::clone(&self.receiver);
        let counters = Arc::clone(&self.counters);
        let min_workers = self.config.min_workers;
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_sec);

        counters.workers.fetch_add(1, Ordering::AcqRel);
        let handle = tokio::spawn(async move {
            loop {
                let recv = async {
                    let mut rx = receiver.lock().await;
                    rx.recv().await
                };
                let job = tokio::select! {
                    job = recv => job,
                    _ = tokio::time::sleep(idle_timeout) => {
                        // Reap this worker if the pool is above its floor.
                        let workers = counters.workers.load(Ordering::Acquire);
                        if workers > min_workers
                            && counters
                                .workers
                                .compare_exchange(
                                    workers,
                                    workers - 1,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_ok()
                        {
                            debug!("idle worker reaped");
                            return;
                        }
                        continue;
                    }
                };

                match job {
                    Some(job) => {
                        counters.queued.fetch_sub(1, Ordering::AcqRel);
                        counters.active.fetch_add(1, Ordering::AcqRel);
                        job.await;
                        counters.active.fetch_sub(1, Ordering::AcqRel);
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        // Channel closed and drained: shutdown.
                        counters.workers.fetch_sub(1, Ordering::AcqRel);
                        return;
                    }
                }
            }
        });

        let mut guard = self
            .worker_handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(handle);
    }

    fn spawn_monitor(&self) {
        let counters = Arc::clone(&self.counters);
        let interval = Duration::from_secs(self.config.monitor_interval_sec);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                info!(
                    active = counters.active.load(Ordering::Relaxed),
                    workers = counters.workers.load(Ordering::Relaxed),
                    queued = counters.queued.load(Ordering::Relaxed),
                    completed = counters.completed.load(Ordering::Relaxed),
                    submitted = counters.submitted.load(Ordering::Relaxed),
                    "worker pool status"
                );
            }
        });

        let mut guard = self
            .monitor_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(handle);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn small_pool_config(queue_capacity: usize) -> PoolConfig {
        PoolConfig {
            min_workers: 2,
            max_workers: 4,
            queue_capacity,
            idle_timeout_sec: 60,
            monitor_interval_sec: 30,
            shutdown_drain_sec: 2,
        }
    }

    #[tokio::test]
    async fn submitted_tasks_run() {
        let pool = WorkerPool::start(&small_pool_config(16));
        let (tx, rx) = oneshot::channel();

        pool.submit(async move {
            let _ = tx.send(42u32);
        })
        .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_rejects_with_overloaded() {
        let config = PoolConfig {
            min_workers: 1,
            max_workers: 1,
            queue_capacity: 1,
            ..small_pool_config(1)
        };
        let pool = WorkerPool::start(&config);

        // Wedge the single worker on a future that never resolves until we
        // let it go, then fill the one queue slot.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        pool.submit(async move {
            let _ = release_rx.await;
        })
        .unwrap();
        // Give the worker a moment to pick up the blocking task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.submit(async {}).unwrap();

        let err = pool.submit(async {}).unwrap_err();
        assert!(matches!(err, RelayError::Overloaded { .. }));
        assert_eq!(pool.snapshot().rejected, 1);

        let _ = release_tx.send(());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_work() {
        let pool = WorkerPool::start(&small_pool_config(64));
        let counter = Arc::new(AtomicU64::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 20);

        // Intake is closed after shutdown.
        let err = pool.submit(async {}).unwrap_err();
        assert!(matches!(err, RelayError::Overloaded { .. }));
    }

    #[tokio::test]
    async fn pool_grows_under_load() {
        let pool = WorkerPool::start(&small_pool_config(64));
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        for _ in 0..8 {
            let mut release = release_rx.clone();
            pool.submit(async move {
                let _ = release.wait_for(|go| *go).await;
            })
            .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = pool.snapshot();
        assert!(snapshot.workers > 2, "pool should grow past its floor");
        assert!(snapshot.workers <= 4, "pool must respect its ceiling");

        let _ = release_tx.send(true);
        pool.shutdown().await;
    }
}
