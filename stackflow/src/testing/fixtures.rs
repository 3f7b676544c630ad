//! Worker factory fixture.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::mocks::{BuildGate, CallLog, ScriptedWorker};
use crate::errors::WorkerError;
use crate::worker::{Consent, Worker, WorkerFactory};

/// How the next worker created for a key behaves.
#[derive(Debug, Clone)]
pub struct WorkerScript {
    /// Consent answer.
    pub consent: Consent,
    /// Gate held by the worker's first build; consumed on creation.
    pub build_gate: Option<Arc<BuildGate>>,
    /// Gate held by the worker's consent requests; consumed on creation.
    pub consent_gate: Option<Arc<BuildGate>>,
    /// Build failure message.
    pub build_failure: Option<String>,
}

impl Default for WorkerScript {
    fn default() -> Self {
        Self {
            consent: Consent::approve(),
            build_gate: None,
            consent_gate: None,
            build_failure: None,
        }
    }
}

/// Creates [`ScriptedWorker`]s that share one [`CallLog`].
///
/// Keys without a script get a worker that approves and builds at once.
#[derive(Debug, Default)]
pub struct ScriptedWorkerFactory {
    log: CallLog,
    scripts: Mutex<HashMap<String, WorkerScript>>,
    created: Mutex<Vec<Arc<ScriptedWorker>>>,
    unknown: Mutex<Vec<String>>,
}

impl ScriptedWorkerFactory {
    /// Creates a factory with a fresh call log.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the shared call log.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Makes workers created for `key` deny consent.
    pub fn deny_consent(&self, key: &str) {
        self.script(key, |script| script.consent = Consent::deny());
    }

    /// Sets the consent answer of workers created for `key`.
    pub fn consent_with(&self, key: &str, consent: Consent) {
        self.script(key, |script| script.consent = consent);
    }

    /// Gates the build of the next worker created for `key`.
    pub fn gate_build(&self, key: &str) -> Arc<BuildGate> {
        let gate = BuildGate::new();
        let held = Arc::clone(&gate);
        self.script(key, move |script| script.build_gate = Some(held));
        gate
    }

    /// Gates the consent requests of the next worker created for `key`.
    pub fn gate_consent(&self, key: &str) -> Arc<BuildGate> {
        let gate = BuildGate::new();
        let held = Arc::clone(&gate);
        self.script(key, move |script| script.consent_gate = Some(held));
        gate
    }

    /// Makes the builds of workers created for `key` fail.
    pub fn fail_build(&self, key: &str, message: &str) {
        let message = message.to_string();
        self.script(key, move |script| script.build_failure = Some(message));
    }

    /// Refuses to create workers for `key`.
    pub fn reject_key(&self, key: &str) {
        self.unknown.lock().push(key.to_string());
    }

    /// Returns the workers created for `key`, oldest first.
    #[must_use]
    pub fn created(&self, key: &str) -> Vec<Arc<ScriptedWorker>> {
        self.created
            .lock()
            .iter()
            .filter(|worker| worker.key() == key)
            .cloned()
            .collect()
    }

    /// Returns the most recent worker created for `key`.
    #[must_use]
    pub fn latest(&self, key: &str) -> Option<Arc<ScriptedWorker>> {
        self.created(key).pop()
    }

    fn script<F>(&self, key: &str, edit: F)
    where
        F: FnOnce(&mut WorkerScript),
    {
        edit(self.scripts.lock().entry(key.to_string()).or_default());
    }
}

impl WorkerFactory for ScriptedWorkerFactory {
    fn create(&self, key: &str) -> Result<Arc<dyn Worker>, WorkerError> {
        if self.unknown.lock().iter().any(|k| k == key) {
            return Err(WorkerError::build(key, "no worker registered for key"));
        }

        let mut worker = ScriptedWorker::new(key, self.log.clone());
        if let Some(script) = self.scripts.lock().get_mut(key) {
            worker = worker.with_consent(script.consent.clone());
            if let Some(gate) = script.build_gate.take() {
                worker = worker.with_build_gate(gate);
            }
            if let Some(gate) = script.consent_gate.take() {
                worker = worker.with_consent_gate(gate);
            }
            if let Some(message) = &script.build_failure {
                worker = worker.failing(message.clone());
            }
        }

        let worker = Arc::new(worker);
        self.created.lock().push(Arc::clone(&worker));
        Ok(worker)
    }
}
