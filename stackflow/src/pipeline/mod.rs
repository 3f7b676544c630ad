//! Finite-state pipeline definitions and execution.
//!
//! This module provides:
//! - DFA groups of states linked by `next`/`fail` edges, validated when the
//!   definition is built
//! - The [`PipelineEngine`], which serializes builds per identifier, enforces
//!   state locks and drops continuations of superseded builds
//! - The [`StateHandler`] trait and closure-backed handlers

mod definition;
mod engine;
mod handler;

pub use definition::{
    DfaGroup, DfaTarget, Link, PipelineDefinition, PipelineDefinitionBuilder, PipelineKey,
    StateNode,
};
pub use engine::{BuildContext, BuildReport, BuildResult, PipelineEngine, Transition};
pub use handler::{AsyncFnHandler, EntryKind, FnHandler, StateHandler, StepContext, StepOutcome};
