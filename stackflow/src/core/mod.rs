//! Core value types shared across the engine and coordinators.
//!
//! This module contains:
//! - [`BuildGeneration`], the stamp that decides whether a continuation is stale
//! - [`WorkerStatus`], the engine-owned lifecycle status of a worker

mod generation;
mod status;

pub use generation::BuildGeneration;
pub(crate) use generation::GenerationCounter;
pub use status::WorkerStatus;
