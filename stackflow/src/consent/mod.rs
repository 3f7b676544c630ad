//! Consent chains: all-or-nothing teardown permission.
//!
//! A [`ConsentChain`] polls the workers of an [`ExclusiveStack`] from the top
//! down. Each approval is merged into a [`SavedState`] accumulator keyed by
//! worker. The first refusal, or the first worker already being asked by
//! someone else, rolls every approval of the pass back to `Running` and
//! fails the whole chain.

use crate::core::WorkerStatus;
use crate::stack::ExclusiveStack;
use crate::worker::WorkerSlot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Saved view state collected from consenting workers, keyed by worker key.
pub type SavedState = serde_json::Map<String, serde_json::Value>;

/// Why a consent chain failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The worker refused.
    Refused,
    /// The worker was already answering another consent request.
    AlreadyConsenting,
}

/// The worker that stopped a consent chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDenial {
    /// Key of the worker.
    pub worker: String,
    /// Why the chain stopped there.
    pub reason: DenialReason,
}

/// Result of polling a consent chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsentVerdict {
    /// Every worker approved; carries the accumulated saved state.
    Approved(SavedState),
    /// A worker denied; no state is returned.
    Denied(ConsentDenial),
}

impl ConsentVerdict {
    /// Returns true if every worker approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }

    /// Returns the accumulated state of an approved chain.
    #[must_use]
    pub fn saved_state(&self) -> Option<&SavedState> {
        match self {
            Self::Approved(state) => Some(state),
            Self::Denied(_) => None,
        }
    }
}

/// Workers awaiting a consent poll plus the rollback list of those that
/// already approved.
#[derive(Debug, Default)]
pub struct ConsentChain {
    pending: ExclusiveStack<Arc<WorkerSlot>>,
    approved: Vec<Arc<WorkerSlot>>,
}

impl ConsentChain {
    /// Creates a chain that will poll `pending` from the top down.
    #[must_use]
    pub fn new(pending: ExclusiveStack<Arc<WorkerSlot>>) -> Self {
        Self {
            pending,
            approved: Vec::new(),
        }
    }

    /// Returns the number of workers still to be asked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if there is nobody left to ask.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Polls every worker, merging approvals into `accumulated`.
    pub async fn seek(mut self, build_id: &str, mut accumulated: SavedState) -> ConsentVerdict {
        while let Some(slot) = self.pending.pop() {
            if !slot.begin_consent() {
                debug!(build_id, worker = slot.key(), "Worker already consenting");
                return self.deny(slot.key(), DenialReason::AlreadyConsenting);
            }

            let consent = slot.worker().request_consent(build_id).await;
            if !consent.approved {
                info!(build_id, worker = slot.key(), "Consent denied");
                slot.set_status(WorkerStatus::Running);
                return self.deny(slot.key(), DenialReason::Refused);
            }

            if let Some(state) = consent.saved_state {
                accumulated.insert(slot.key().to_string(), state);
            }
            slot.set_status(WorkerStatus::Consented);
            self.approved.push(slot);
        }

        ConsentVerdict::Approved(accumulated)
    }

    fn deny(mut self, worker: &str, reason: DenialReason) -> ConsentVerdict {
        for slot in self.approved.drain(..) {
            slot.set_status(WorkerStatus::Running);
        }
        ConsentVerdict::Denied(ConsentDenial {
            worker: worker.to_string(),
            reason,
        })
    }
}

/// Returns every worker left `Consented` by an approved chain to `Running`.
pub fn release_consent<'a, I>(slots: I)
where
    I: IntoIterator<Item = &'a Arc<WorkerSlot>>,
{
    for slot in slots {
        slot.release_consent();
    }
}
