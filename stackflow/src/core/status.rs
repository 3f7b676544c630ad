//! Worker lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The engine-owned status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// The worker's build has started but not finished.
    Building,
    /// The worker is built and live.
    Running,
    /// The worker is being asked for teardown consent.
    Consenting,
    /// The worker approved teardown in the current consent pass.
    Consented,
    /// The worker's build was cancelled.
    Cancelled,
    /// The worker was destroyed.
    Destroyed,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::Building
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Running => write!(f, "running"),
            Self::Consenting => write!(f, "consenting"),
            Self::Consented => write!(f, "consented"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

impl WorkerStatus {
    /// Returns true if the worker is built and attached.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Consenting | Self::Consented)
    }

    /// Returns true if the worker can never become live again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Destroyed)
    }
}
