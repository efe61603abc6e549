//! # Topic Consumer
//!
//! One consumer-group loop per subscription: poll the topic on a dedicated
//! task and offload the records to the worker pool. Records of one poll
//! batch run as a single pool job, in order, and the next poll waits for
//! that job: the in-order-per-partition processing model of the bus.
//! Without it, two deliveries of the same correlation id could race past
//! the dedup check. A pool rejection drops the batch with a warning;
//! redelivery semantics belong to the broker and the dedup ledger, not to
//! this loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::executor::WorkerPool;
use crate::messaging::envelope::BusRecord;
use crate::messaging::provider::BusProvider;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_MAX_BATCH: usize = 16;

/// Per-record processing seam implemented by the engine handlers and the
/// edge's response listener.
#[async_trait]
pub trait RecordHandler: Send + Sync + 'static {
    /// Handler name for logging.
    fn name(&self) -> &'static str;

    /// Process one record. Infallible at this seam: handlers route their own
    /// failures (dead letters, synthetic error replies) internally.
    async fn handle(&self, record: BusRecord);
}

/// A consumer-group subscription bound to a handler.
pub struct TopicConsumer {
    bus: Arc<BusProvider>,
    pool: Arc<WorkerPool>,
    handler: Arc<dyn RecordHandler>,
    topic: String,
    group: String,
    poll_interval: Duration,
    max_batch: usize,
}

impl TopicConsumer {
    pub fn new(
        bus: Arc<BusProvider>,
        pool: Arc<WorkerPool>,
        handler: Arc<dyn RecordHandler>,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            pool,
            handler,
            topic: topic.into(),
            group: group.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the poll loop on its own task.
    pub fn spawn(self) -> ConsumerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let loop_running = Arc::clone(&running);
        let loop_shutdown = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            self.run(loop_running, loop_shutdown).await;
        });

        ConsumerHandle {
            running,
            shutdown,
            handle,
        }
    }

    async fn run(self, running: Arc<AtomicBool>, shutdown: Arc<Notify>) {
        debug!(
            topic = %self.topic,
            group = %self.group,
            handler = self.handler.name(),
            "consumer loop starting"
        );

        while running.load(Ordering::Acquire) {
            match self.bus.poll(&self.topic, &self.group, self.max_batch).await {
                Ok(batch) if !batch.is_empty() => {
                    self.dispatch_batch(batch).await;
                    // Drain the topic before sleeping again.
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        topic = %self.topic,
                        group = %self.group,
                        error = %err,
                        "poll failed"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!(topic = %self.topic, group = %self.group, "consumer loop stopped");
    }

    /// Run one batch on the pool, in record order, and wait for it.
    async fn dispatch_batch(&self, batch: Vec<BusRecord>) {
        let handler = Arc::clone(&self.handler);
        let (done_tx, done_rx) = oneshot::channel();
        let work = async move {
            for record in batch {
                handler.handle(record).await;
            }
            let _ = done_tx.send(());
        };

        if let Err(err) = self.pool.submit(work) {
            warn!(
                topic = %self.topic,
                handler = self.handler.name(),
                error = %err,
                "worker pool rejected batch, dropping"
            );
            return;
        }
        let _ = done_rx.await;
    }
}

/// Handle controlling a spawned consumer loop.
pub struct ConsumerHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
        let _ = self.handle.await;
    }
}
