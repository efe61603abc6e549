//! # Pending Request Registry
//!
//! A concurrent map of `rid → single-shot completion sink`. The slot is
//! removed in the same critical section that produces its sender, so a
//! completion can be observed at most once per `rid` no matter how many
//! replies race for it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::RelayError;

/// How a pending request resolved.
#[derive(Debug)]
pub enum PendingOutcome {
    /// The reply body as received on the response topic.
    Reply(String),
    /// The request failed before a reply could be produced.
    Failed(RelayError),
}

/// Process-wide table of pending slots.
#[derive(Debug, Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<Uuid, oneshot::Sender<PendingOutcome>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the slot for a freshly minted `rid` and hand back its
    /// receiver. A colliding insert (which would need a duplicated UUID)
    /// replaces the stale sender, keeping the at-most-one-slot invariant.
    pub fn insert(&self, rid: Uuid) -> oneshot::Receiver<PendingOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.insert(rid, tx);
        rx
    }

    /// Atomically remove the slot and deliver its outcome. Returns `false`
    /// when no slot exists (a late or foreign reply), which is normal and
    /// must not error.
    pub fn complete(&self, rid: Uuid, outcome: PendingOutcome) -> bool {
        let sender = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.remove(&rid)
        };
        match sender {
            // A dropped receiver means the caller already gave up; the
            // completion still counts as consumed.
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop the slot without completing it (timeout, cancelled caller).
    pub fn remove(&self, rid: Uuid) -> bool {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.remove(&rid).is_some()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        let slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
