//! State handlers and the context they run in.

use super::engine::BuildContext;
use crate::core::BuildGeneration;
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// What a state's work reported when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Follow the state's `next` link.
    Advance,
    /// Follow the state's `fail` link.
    Fail,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance => write!(f, "advance"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// How the current state was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// First build for the identifier, at the initial group's root.
    Started,
    /// Untargeted request against an existing context.
    AutoTrigger,
    /// Explicit [`DfaTarget`](super::DfaTarget).
    Targeted,
    /// The previous state advanced.
    Advanced,
    /// The previous state failed.
    Failed,
}

/// Everything a handler can see about the step it runs.
pub struct StepContext<S, P> {
    build_id: String,
    generation: BuildGeneration,
    run_id: Uuid,
    state: S,
    from: Option<S>,
    entry: EntryKind,
    payload: Arc<P>,
    contexts: Arc<DashMap<String, BuildContext<S>>>,
}

impl<S: Copy, P> StepContext<S, P> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        build_id: &str,
        generation: BuildGeneration,
        run_id: Uuid,
        state: S,
        from: Option<S>,
        entry: EntryKind,
        payload: Arc<P>,
        contexts: Arc<DashMap<String, BuildContext<S>>>,
    ) -> Self {
        Self {
            build_id: build_id.to_string(),
            generation,
            run_id,
            state,
            from,
            entry,
            payload,
            contexts,
        }
    }

    /// Returns the build identifier.
    #[must_use]
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Returns the generation of the build this step belongs to.
    #[must_use]
    pub fn generation(&self) -> BuildGeneration {
        self.generation
    }

    /// Returns the run id of the build this step belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the state being entered.
    #[must_use]
    pub fn state(&self) -> S {
        self.state
    }

    /// Returns the state the build left, if any.
    #[must_use]
    pub fn from(&self) -> Option<S> {
        self.from
    }

    /// Returns how the state was entered.
    #[must_use]
    pub fn entry(&self) -> EntryKind {
        self.entry
    }

    /// Returns the build request payload.
    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Returns true if no newer build has taken over the identifier.
    ///
    /// Handlers doing several units of work check this before each one.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.contexts
            .get(&self.build_id)
            .is_some_and(|context| self.generation.is_current_for(context.generation))
    }
}

impl<S: Copy, P> Clone for StepContext<S, P> {
    fn clone(&self) -> Self {
        Self {
            build_id: self.build_id.clone(),
            generation: self.generation,
            run_id: self.run_id,
            state: self.state,
            from: self.from,
            entry: self.entry,
            payload: Arc::clone(&self.payload),
            contexts: Arc::clone(&self.contexts),
        }
    }
}

impl<S: Debug, P> Debug for StepContext<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("build_id", &self.build_id)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("from", &self.from)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Work performed when a state is entered.
///
/// Returning is the continuation: the engine applies the outcome as soon as
/// `enter` resolves, unless a newer build has taken over the identifier.
#[async_trait]
pub trait StateHandler<S, P>: Send + Sync {
    /// Runs the state's work.
    async fn enter(&self, step: &StepContext<S, P>) -> StepOutcome;
}

/// A handler backed by a synchronous closure.
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wraps a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, P, F> StateHandler<S, P> for FnHandler<F>
where
    S: Send + Sync,
    P: Send + Sync,
    F: Fn(&StepContext<S, P>) -> StepOutcome + Send + Sync,
{
    async fn enter(&self, step: &StepContext<S, P>) -> StepOutcome {
        (self.func)(step)
    }
}

/// A handler backed by an async closure taking an owned context.
pub struct AsyncFnHandler<F, Fut> {
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnHandler<F, Fut> {
    /// Wraps an async closure.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, P, F, Fut> StateHandler<S, P> for AsyncFnHandler<F, Fut>
where
    S: Copy + Send + Sync,
    P: Send + Sync,
    F: Fn(StepContext<S, P>) -> Fut + Send + Sync,
    Fut: Future<Output = StepOutcome> + Send,
{
    async fn enter(&self, step: &StepContext<S, P>) -> StepOutcome {
        (self.func)(step.clone()).await
    }
}
