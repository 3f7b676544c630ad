//! Scripted workers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::errors::WorkerError;
use crate::worker::{Consent, Worker, WorkerLaunch};

/// A worker operation recorded by [`CallLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerOp {
    /// `Worker::build`.
    Build,
    /// `Worker::cancel_build`.
    CancelBuild,
    /// `Worker::request_consent`.
    RequestConsent,
    /// `Worker::destroy`.
    Destroy,
}

/// One recorded worker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCall {
    /// The worker key.
    pub key: String,
    /// The operation.
    pub op: WorkerOp,
    /// The build identifier passed to the call.
    pub build_id: String,
}

/// Shared, ordered log of worker calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<WorkerCall>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn record(&self, key: &str, op: WorkerOp, build_id: &str) {
        self.calls.lock().push(WorkerCall {
            key: key.to_string(),
            op,
            build_id: build_id.to_string(),
        });
    }

    /// Returns every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<WorkerCall> {
        self.calls.lock().clone()
    }

    /// Returns the keys of the workers that received `op`, in call order.
    #[must_use]
    pub fn keys_for(&self, op: WorkerOp) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.key.clone())
            .collect()
    }

    /// Returns how many times `key` received `op`.
    #[must_use]
    pub fn count(&self, key: &str, op: WorkerOp) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.key == key && call.op == op)
            .count()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Holds a worker call until the test releases it.
///
/// The worker signals `started` when it reaches the gate and then waits for
/// `release`. Cancelling a gated build releases it.
#[derive(Debug, Default)]
pub struct BuildGate {
    started: Notify,
    release: Notify,
}

impl BuildGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits until a worker has reached the gate.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Lets the waiting worker continue.
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Signals arrival at the gate and waits for release.
    pub async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }
}

/// A worker that records its calls and follows a script.
#[derive(Debug)]
pub struct ScriptedWorker {
    key: String,
    log: CallLog,
    consent: Mutex<Consent>,
    build_gate: Option<Arc<BuildGate>>,
    consent_gate: Option<Arc<BuildGate>>,
    build_failure: Option<String>,
    launches: Mutex<Vec<WorkerLaunch>>,
}

impl ScriptedWorker {
    /// Creates a worker that approves consent and builds immediately.
    #[must_use]
    pub fn new(key: impl Into<String>, log: CallLog) -> Self {
        Self {
            key: key.into(),
            log,
            consent: Mutex::new(Consent::approve()),
            build_gate: None,
            consent_gate: None,
            build_failure: None,
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Sets the consent answer.
    #[must_use]
    pub fn with_consent(self, consent: Consent) -> Self {
        *self.consent.lock() = consent;
        self
    }

    /// Holds `build` at the gate.
    #[must_use]
    pub fn with_build_gate(mut self, gate: Arc<BuildGate>) -> Self {
        self.build_gate = Some(gate);
        self
    }

    /// Holds `request_consent` at the gate.
    #[must_use]
    pub fn with_consent_gate(mut self, gate: Arc<BuildGate>) -> Self {
        self.consent_gate = Some(gate);
        self
    }

    /// Makes `build` fail with `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.build_failure = Some(message.into());
        self
    }

    /// Changes the consent answer of a live worker.
    pub fn set_consent(&self, consent: Consent) {
        *self.consent.lock() = consent;
    }

    /// Returns every launch payload the worker was built with.
    #[must_use]
    pub fn launches(&self) -> Vec<WorkerLaunch> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn key(&self) -> &str {
        &self.key
    }

    async fn build(&self, launch: &WorkerLaunch) -> Result<(), WorkerError> {
        self.log.record(&self.key, WorkerOp::Build, &launch.build_id);
        self.launches.lock().push(launch.clone());

        if let Some(gate) = &self.build_gate {
            gate.pass().await;
        }

        match &self.build_failure {
            Some(message) => Err(WorkerError::build(&self.key, message)),
            None => Ok(()),
        }
    }

    async fn cancel_build(&self, build_id: &str) {
        self.log.record(&self.key, WorkerOp::CancelBuild, build_id);
        if let Some(gate) = &self.build_gate {
            gate.release();
        }
    }

    async fn request_consent(&self, build_id: &str) -> Consent {
        self.log.record(&self.key, WorkerOp::RequestConsent, build_id);
        if let Some(gate) = &self.consent_gate {
            gate.pass().await;
        }
        self.consent.lock().clone()
    }

    async fn destroy(&self, build_id: &str) {
        self.log.record(&self.key, WorkerOp::Destroy, build_id);
    }
}
