//! Build cancellation in reverse start order.
//!
//! Every worker a build starts is registered on a [`CancelStack`]. When the
//! build is aborted the stack is unwound LIFO: the most recently started
//! worker is cancelled first, so children are cancelled before the parents
//! they were built into.

use crate::core::WorkerStatus;
use crate::stack::Stack;
use crate::worker::WorkerSlot;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Workers started by a build, in start order.
#[derive(Default)]
pub struct CancelStack {
    started: Mutex<Stack<Arc<WorkerSlot>>>,
}

impl CancelStack {
    /// Creates an empty cancel stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker whose build has started.
    pub fn register(&self, slot: Arc<WorkerSlot>) {
        self.started.lock().push(slot);
    }

    /// Returns the number of registered workers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.started.lock().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started.lock().is_empty()
    }

    /// Returns the registered keys, oldest first.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.started
            .lock()
            .iter()
            .map(|slot| slot.key().to_string())
            .collect()
    }

    /// Forgets every registered worker without cancelling it.
    ///
    /// Called once a build has completed and its workers are live.
    pub fn clear(&self) {
        self.started.lock().clear();
    }

    /// Cancels every registered worker, newest first.
    ///
    /// Each worker's `cancel_build` is awaited before the next one is
    /// called. Returns the cancelled slots in cancellation order.
    pub async fn unwind(&self, build_id: &str) -> Vec<Arc<WorkerSlot>> {
        let mut pending = std::mem::take(&mut *self.started.lock());
        let mut cancelled = Vec::with_capacity(pending.len());

        while let Some(slot) = pending.pop() {
            debug!(build_id, worker = slot.key(), "Cancelling worker build");
            slot.worker().cancel_build(build_id).await;
            slot.set_status(WorkerStatus::Cancelled);
            cancelled.push(slot);
        }

        cancelled
    }
}

impl std::fmt::Debug for CancelStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelStack")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
