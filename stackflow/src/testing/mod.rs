//! Testing utilities for pipelines and coordinators.
//!
//! This module provides:
//! - Scripted workers that record every call and can be told to deny
//!   consent, fail their build, or hold until released
//! - A worker factory handing out scripted workers by key

mod fixtures;
mod mocks;

pub use fixtures::{ScriptedWorkerFactory, WorkerScript};
pub use mocks::{BuildGate, CallLog, ScriptedWorker, WorkerCall, WorkerOp};
