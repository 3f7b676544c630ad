//! # Stackflow
//!
//! A finite-state build pipeline engine for coordinating nested workers.
//!
//! Stackflow serializes asynchronous build requests per build identifier
//! and provides:
//!
//! - **Stacks**: a LIFO [`Stack`](stack::Stack) and a uniqueness-enforcing
//!   [`ExclusiveStack`](stack::ExclusiveStack)
//! - **DFA pipelines**: states grouped into DFA groups, with declared
//!   predecessors, success/failure links and pipeline locks
//! - **Generation stamps**: a newer build supersedes an older one, whose
//!   remaining continuations are dropped
//! - **Consent chains**: all-or-nothing teardown permission with saved state
//! - **Cancellation**: started workers are cancelled in reverse start order
//! - **Coordinators**: a route [`Router`](coordinators::router::Router) and a
//!   [`PanelCoordinator`](coordinators::panels::PanelCoordinator)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackflow::prelude::*;
//!
//! let router = Router::new(factory, RouterConfig::default())?;
//!
//! match router.push(Route::new("/inbox/42", ["shell", "inbox", "message"])).await? {
//!     NavigationOutcome::Navigated { url, .. } => println!("now at {url}"),
//!     NavigationOutcome::Denied(denial) => println!("{} refused", denial.worker),
//!     other => println!("{other:?}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod consent;
pub mod coordinators;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stack;
pub mod testing;
pub mod utils;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancelStack;
    pub use crate::config::{EngineConfig, PanelConfig, RouterConfig};
    pub use crate::consent::{ConsentChain, ConsentDenial, ConsentVerdict, DenialReason, SavedState};
    pub use crate::coordinators::panels::{PanelCoordinator, PanelOutcome, PanelRequest};
    pub use crate::coordinators::router::{NavigationKind, NavigationOutcome, Route, Router};
    pub use crate::core::{BuildGeneration, WorkerStatus};
    pub use crate::errors::{
        DefinitionError, LockConflictError, StackflowError, TransitionError, WorkerError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        BuildContext, BuildResult, DfaGroup, DfaTarget, Link, PipelineDefinition, PipelineEngine,
        StateHandler, StateNode, StepContext, StepOutcome,
    };
    pub use crate::stack::{ExclusiveStack, Stack};
    pub use crate::worker::{Consent, Worker, WorkerFactory, WorkerLaunch, WorkerSlot};
}
