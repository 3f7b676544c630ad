//! Worker contract and engine-side worker handles.
//!
//! A [`Worker`] is an external collaborator (a page fragment, an overlay
//! panel) that knows how to build, cancel, consent and destroy itself. The
//! coordinators never store workers directly: each one is wrapped in a
//! [`WorkerSlot`] that also carries the engine-owned [`WorkerStatus`].

use crate::core::{BuildGeneration, WorkerStatus};
use crate::errors::WorkerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// A worker's answer to a teardown consent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consent {
    /// Whether teardown or the state change is permitted.
    pub approved: bool,
    /// State the worker wants back if it is rebuilt later.
    #[serde(default)]
    pub saved_state: Option<serde_json::Value>,
}

impl Consent {
    /// Approves without saving state.
    #[must_use]
    pub fn approve() -> Self {
        Self {
            approved: true,
            saved_state: None,
        }
    }

    /// Approves and hands back state to restore later.
    #[must_use]
    pub fn approve_with(saved_state: serde_json::Value) -> Self {
        Self {
            approved: true,
            saved_state: Some(saved_state),
        }
    }

    /// Denies the request.
    #[must_use]
    pub fn deny() -> Self {
        Self {
            approved: false,
            saved_state: None,
        }
    }
}

/// Everything a worker needs to construct itself for one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLaunch {
    /// The build identifier the worker is built under.
    pub build_id: String,
    /// The generation of the build that launched the worker.
    pub generation: BuildGeneration,
    /// What the build targets (a URL, a panel key).
    pub target: String,
    /// Position of the worker in its chain; 0 is the top-level worker.
    pub depth: usize,
    /// Caller-supplied parameters for the target.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Previously saved state for this worker, if any.
    #[serde(default)]
    pub restored_state: Option<serde_json::Value>,
}

/// The contract every externally-collaborating unit implements.
///
/// Returning from a method is the continuation: the pipeline moves on to
/// the next worker only after the call resolves. Implementations must treat
/// the pipeline as the sole authority on ordering.
#[async_trait]
pub trait Worker: Send + Sync + Debug {
    /// Returns the key that identifies this worker within its chain.
    fn key(&self) -> &str;

    /// Constructs the worker (render, fetch, attach).
    async fn build(&self, launch: &WorkerLaunch) -> Result<(), WorkerError>;

    /// Aborts a build started under `build_id`.
    async fn cancel_build(&self, build_id: &str);

    /// Asks whether the worker permits teardown or a state change.
    ///
    /// Must not mutate shared state before the answer is known.
    async fn request_consent(&self, build_id: &str) -> Consent;

    /// Releases resources and detaches the worker.
    async fn destroy(&self, build_id: &str);
}

/// Creates workers by key.
pub trait WorkerFactory: Send + Sync {
    /// Creates a fresh worker for `key`.
    fn create(&self, key: &str) -> Result<Arc<dyn Worker>, WorkerError>;
}

/// A worker together with its engine-owned status.
///
/// Slots compare equal by key, so an
/// [`ExclusiveStack`](crate::stack::ExclusiveStack) of slots holds at most
/// one worker per key.
pub struct WorkerSlot {
    key: String,
    worker: Arc<dyn Worker>,
    status: Mutex<WorkerStatus>,
}

impl WorkerSlot {
    /// Wraps a worker whose build has not started yet.
    #[must_use]
    pub fn new(worker: Arc<dyn Worker>) -> Arc<Self> {
        Self::with_status(worker, WorkerStatus::Building)
    }

    /// Wraps a worker with an explicit initial status.
    #[must_use]
    pub fn with_status(worker: Arc<dyn Worker>, status: WorkerStatus) -> Arc<Self> {
        Arc::new(Self {
            key: worker.key().to_string(),
            worker,
            status: Mutex::new(status),
        })
    }

    /// Returns the worker key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the wrapped worker.
    #[must_use]
    pub fn worker(&self) -> &Arc<dyn Worker> {
        &self.worker
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        *self.status.lock()
    }

    /// Overwrites the status.
    pub fn set_status(&self, status: WorkerStatus) {
        *self.status.lock() = status;
    }

    /// Moves the worker to `Consenting` unless a consent request is already
    /// in flight for it. Returns false in that case.
    pub(crate) fn begin_consent(&self) -> bool {
        let mut status = self.status.lock();
        if *status == WorkerStatus::Consenting {
            return false;
        }
        *status = WorkerStatus::Consenting;
        true
    }

    /// Resets a worker left `Consented` by a finished pass back to `Running`.
    pub(crate) fn release_consent(&self) {
        let mut status = self.status.lock();
        if *status == WorkerStatus::Consented {
            *status = WorkerStatus::Running;
        }
    }
}

impl PartialEq for WorkerSlot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Debug for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("key", &self.key)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::ExclusiveStack;
    use crate::testing::{CallLog, ScriptedWorker};

    fn slot(key: &str) -> Arc<WorkerSlot> {
        WorkerSlot::new(Arc::new(ScriptedWorker::new(key, CallLog::new())))
    }

    #[test]
    fn test_slot_takes_worker_key() {
        let slot = slot("T");
        assert_eq!(slot.key(), "T");
        assert_eq!(slot.status(), WorkerStatus::Building);
    }

    #[test]
    fn test_begin_consent_is_first_requester_wins() {
        let slot = slot("A");
        slot.set_status(WorkerStatus::Running);

        assert!(slot.begin_consent());
        assert!(!slot.begin_consent());
        assert_eq!(slot.status(), WorkerStatus::Consenting);
    }

    #[test]
    fn test_release_consent_only_touches_consented() {
        let slot = slot("A");
        slot.set_status(WorkerStatus::Consented);
        slot.release_consent();
        assert_eq!(slot.status(), WorkerStatus::Running);

        slot.set_status(WorkerStatus::Destroyed);
        slot.release_consent();
        assert_eq!(slot.status(), WorkerStatus::Destroyed);
    }

    #[test]
    fn test_slots_are_exclusive_by_key() {
        let mut stack = ExclusiveStack::new();
        stack.push(slot("T"));
        stack.push(slot("A"));
        stack.push(slot("T"));

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek().unwrap().key(), "T");
    }

    #[test]
    fn test_consent_constructors() {
        assert!(Consent::approve().approved);
        assert!(!Consent::deny().approved);
        let consent = Consent::approve_with(serde_json::json!({"scroll": 10}));
        assert_eq!(consent.saved_state.unwrap()["scroll"], 10);
    }
}
