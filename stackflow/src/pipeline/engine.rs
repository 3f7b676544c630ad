//! The finite-state pipeline engine.

use super::definition::{DfaTarget, PipelineDefinition, PipelineKey};
use super::handler::{EntryKind, StepContext, StepOutcome};
use crate::config::EngineConfig;
use crate::core::{BuildGeneration, GenerationCounter};
use crate::errors::{LockConflictError, StackflowError, TransitionError};
use crate::events::{build_payload, kinds, with_field, EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::utils::{now, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Engine-side record of one build identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildContext<S> {
    /// The state the identifier is in.
    pub current_state: S,
    /// Generation of the build that owns the identifier.
    pub generation: BuildGeneration,
    /// True while the current state holds the pipeline lock.
    pub locked: bool,
    /// States entered by the current build, in order.
    pub path: Vec<S>,
    /// Unique id of the current build.
    pub run_id: Uuid,
    /// When the current build started.
    pub started_at: Timestamp,
}

impl<S: Copy> BuildContext<S> {
    fn begin(generation: BuildGeneration, state: S, locked: bool) -> Self {
        Self {
            current_state: state,
            generation,
            locked,
            path: vec![state],
            run_id: Uuid::new_v4(),
            started_at: now(),
        }
    }
}

/// Result of applying an outcome to a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The build moved to `to`.
    Entered {
        /// The state that was left.
        from: S,
        /// The state that was entered.
        to: S,
        /// [`EntryKind::Advanced`] or [`EntryKind::Failed`].
        entry: EntryKind,
    },
    /// A newer build owns the identifier; nothing was changed.
    Stale,
}

/// What a completed build hands back to its caller.
#[derive(Debug, Clone)]
pub struct BuildReport<S, P> {
    /// The build identifier.
    pub build_id: String,
    /// The build's generation.
    pub generation: BuildGeneration,
    /// The build's run id.
    pub run_id: Uuid,
    /// The terminal state reached.
    pub final_state: S,
    /// Every state the build entered, in order.
    pub path: Vec<S>,
    /// The request payload.
    pub payload: Arc<P>,
}

/// How a started build ended.
#[derive(Debug, Clone)]
pub enum BuildResult<S, P> {
    /// A terminal state was reached.
    Completed(BuildReport<S, P>),
    /// A newer build took over the identifier before this one completed.
    Superseded {
        /// The superseded build's generation.
        generation: BuildGeneration,
    },
}

impl<S, P> BuildResult<S, P> {
    /// Returns true if the build completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the report of a completed build.
    #[must_use]
    pub fn report(&self) -> Option<&BuildReport<S, P>> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Superseded { .. } => None,
        }
    }
}

struct Step<S> {
    state: S,
    from: Option<S>,
    entry: EntryKind,
}

/// Drives builds through a [`PipelineDefinition`], one context per build
/// identifier.
///
/// Every request goes through [`start_build`](Self::start_build). Starting
/// a build is synchronous up to the first handler: lock checks, transition
/// checks and generation assignment happen before the returned future first
/// yields, so requests for the same identifier are serialized in call order.
pub struct PipelineEngine<S, G, P> {
    definition: Arc<PipelineDefinition<S, G, P>>,
    contexts: Arc<DashMap<String, BuildContext<S>>>,
    generations: GenerationCounter,
    event_sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl<S, G, P> PipelineEngine<S, G, P>
where
    S: PipelineKey,
    G: PipelineKey,
    P: Send + Sync + 'static,
{
    /// Creates an engine over a validated definition.
    #[must_use]
    pub fn new(definition: PipelineDefinition<S, G, P>, config: EngineConfig) -> Self {
        Self {
            definition: Arc::new(definition),
            contexts: Arc::new(DashMap::new()),
            generations: GenerationCounter::default(),
            event_sink: Arc::new(NoOpEventSink),
            config,
        }
    }

    /// Sets the sink lifecycle events are reported to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the definition.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition<S, G, P> {
        &self.definition
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a snapshot of the context for `build_id`.
    #[must_use]
    pub fn context(&self, build_id: &str) -> Option<BuildContext<S>> {
        self.contexts.get(build_id).map(|context| context.clone())
    }

    /// Returns true if `build_id` is in a locking state.
    #[must_use]
    pub fn is_locked(&self, build_id: &str) -> bool {
        self.contexts
            .get(build_id)
            .is_some_and(|context| context.locked)
    }

    /// Starts or resumes a build for `build_id` and drives it to completion.
    ///
    /// Without a target, a fresh identifier enters the initial group's root
    /// and an existing one enters its current group's auto-trigger state.
    ///
    /// # Errors
    ///
    /// Returns [`StackflowError::LockConflict`] if the identifier is locked,
    /// and a [`StackflowError::Transition`] if the entry is not legal from
    /// the current state or a state has no link for its outcome. The context
    /// is left untouched when the request is refused.
    pub async fn start_build(
        &self,
        build_id: &str,
        payload: P,
        target: Option<DfaTarget<S, G>>,
    ) -> Result<BuildResult<S, P>, StackflowError> {
        let timer = SpanTimer::start(build_id);
        let (generation, run_id, step) = self.initiate(build_id, target)?;
        self.drive(build_id, generation, run_id, step, Arc::new(payload), &timer)
            .await
    }

    /// Applies `outcome` to the build stamped `generation`.
    ///
    /// Returns [`Transition::Stale`] without touching the context if a newer
    /// build owns the identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StackflowError::UnknownBuild`] for an identifier that never
    /// started, and a [`StackflowError::Transition`] if the current state has
    /// no link for the outcome or the link's target does not accept it.
    pub fn transition_state(
        &self,
        build_id: &str,
        generation: BuildGeneration,
        outcome: StepOutcome,
    ) -> Result<Transition<S>, StackflowError> {
        let (from, to, run_id) = {
            let mut context = self
                .contexts
                .get_mut(build_id)
                .ok_or_else(|| StackflowError::UnknownBuild(build_id.to_string()))?;

            if !generation.is_current_for(context.generation) {
                debug!(
                    build_id,
                    generation = %generation,
                    owner = %context.generation,
                    "Dropping stale continuation"
                );
                return Ok(Transition::Stale);
            }

            let from = context.current_state;
            let node = self.definition.node(from)?;
            let link = match outcome {
                StepOutcome::Advance => node.next,
                StepOutcome::Fail => node.fail,
            }
            .ok_or_else(|| TransitionError::MissingLink {
                state: from.to_string(),
                outcome: outcome.to_string(),
            })?;

            let to = self.definition.resolve(link)?;
            let target = self.definition.node(to)?;
            if !self.definition.is_root(to) && !target.accepts_from(from) {
                return Err(TransitionError::illegal(from, to).into());
            }

            context.current_state = to;
            context.locked = target.super_pipeline_lock;
            context.path.push(to);
            (from, to, context.run_id)
        };

        debug!(build_id, generation = %generation, from = %from, to = %to, "State entered");
        if self.config.emit_state_events {
            let payload = with_field(
                build_payload(build_id, Some(generation), &to.to_string()),
                "from",
                json!(from.to_string()),
            );
            self.event_sink
                .try_emit(kinds::STATE_ENTERED, Some(with_field(payload, "run_id", json!(run_id))));
        }

        let entry = match outcome {
            StepOutcome::Advance => EntryKind::Advanced,
            StepOutcome::Fail => EntryKind::Failed,
        };
        Ok(Transition::Entered { from, to, entry })
    }

    fn initiate(
        &self,
        build_id: &str,
        target: Option<DfaTarget<S, G>>,
    ) -> Result<(BuildGeneration, Uuid, Step<S>), StackflowError> {
        let (generation, context, step) = match self.contexts.entry(build_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let context = occupied.get_mut();
                if context.locked {
                    let state = context.current_state;
                    drop(occupied);
                    info!(build_id, state = %state, "Build rejected: identifier locked");
                    self.event_sink.try_emit(
                        kinds::BUILD_REJECTED,
                        Some(build_payload(build_id, None, &state.to_string())),
                    );
                    return Err(LockConflictError::new(build_id, state).into());
                }

                let from = context.current_state;
                let (state, entry) = self.resolve_entry(Some(from), target)?;
                let locked = self.definition.node(state)?.super_pipeline_lock;
                let generation = self.generations.next();
                *context = BuildContext::begin(generation, state, locked);
                let step = Step {
                    state,
                    from: Some(from),
                    entry,
                };
                (generation, context.clone(), step)
            }
            Entry::Vacant(vacant) => {
                let (state, entry) = self.resolve_entry(None, target)?;
                let locked = self.definition.node(state)?.super_pipeline_lock;
                let generation = self.generations.next();
                let context = BuildContext::begin(generation, state, locked);
                vacant.insert(context.clone());
                let step = Step {
                    state,
                    from: None,
                    entry,
                };
                (generation, context, step)
            }
        };

        info!(
            build_id,
            generation = %generation,
            state = %step.state,
            engine = %self.config.name,
            "Build started"
        );
        let payload = with_field(
            build_payload(build_id, Some(generation), &step.state.to_string()),
            "run_id",
            json!(context.run_id),
        );
        self.event_sink.try_emit(kinds::BUILD_STARTED, Some(payload));

        Ok((generation, context.run_id, step))
    }

    fn resolve_entry(
        &self,
        current: Option<S>,
        target: Option<DfaTarget<S, G>>,
    ) -> Result<(S, EntryKind), TransitionError> {
        let (state, entry) = match (target, current) {
            (Some(target), _) => {
                let group = self.definition.group(target.group)?;
                let state = target.state.unwrap_or(group.root);
                if group.node(state).is_none() {
                    return Err(TransitionError::UnknownState {
                        group: group.name.to_string(),
                        state: state.to_string(),
                    });
                }
                (state, EntryKind::Targeted)
            }
            (None, Some(current)) => {
                let group = self.definition.group_of(current)?;
                let state = group.auto_trigger.ok_or_else(|| TransitionError::NoAutoTrigger {
                    group: group.name.to_string(),
                })?;
                (state, EntryKind::AutoTrigger)
            }
            (None, None) => (self.definition.initial_group().root, EntryKind::Started),
        };

        if self.definition.is_root(state) {
            return Ok((state, entry));
        }
        match current {
            Some(current) if self.definition.node(state)?.accepts_from(current) => {
                Ok((state, entry))
            }
            Some(current) => Err(TransitionError::illegal(current, state)),
            None => Err(TransitionError::illegal("<none>", state)),
        }
    }

    async fn drive(
        &self,
        build_id: &str,
        generation: BuildGeneration,
        run_id: Uuid,
        mut step: Step<S>,
        payload: Arc<P>,
        timer: &SpanTimer,
    ) -> Result<BuildResult<S, P>, StackflowError> {
        loop {
            let node = self.definition.node(step.state)?;
            if node.is_terminal() {
                return Ok(self.complete(build_id, generation, payload, timer));
            }

            let outcome = match &node.handler {
                Some(handler) => {
                    let context = StepContext::new(
                        build_id,
                        generation,
                        run_id,
                        step.state,
                        step.from,
                        step.entry,
                        Arc::clone(&payload),
                        Arc::clone(&self.contexts),
                    );
                    handler.enter(&context).await
                }
                None => StepOutcome::Advance,
            };

            match self.transition_state(build_id, generation, outcome)? {
                Transition::Entered { from, to, entry } => {
                    step = Step {
                        state: to,
                        from: Some(from),
                        entry,
                    };
                }
                Transition::Stale => return Ok(self.supersede(build_id, generation)),
            }
        }
    }

    fn complete(
        &self,
        build_id: &str,
        generation: BuildGeneration,
        payload: Arc<P>,
        timer: &SpanTimer,
    ) -> BuildResult<S, P> {
        let report = {
            let Some(mut context) = self.contexts.get_mut(build_id) else {
                return self.supersede(build_id, generation);
            };
            if !generation.is_current_for(context.generation) {
                drop(context);
                return self.supersede(build_id, generation);
            }
            context.locked = false;
            BuildReport {
                build_id: build_id.to_string(),
                generation,
                run_id: context.run_id,
                final_state: context.current_state,
                path: context.path.clone(),
                payload,
            }
        };

        let duration_ms = timer.elapsed_ms();
        info!(
            build_id,
            generation = %generation,
            state = %report.final_state,
            duration_ms,
            "Build completed"
        );
        let event = with_field(
            with_field(
                build_payload(build_id, Some(generation), &report.final_state.to_string()),
                "run_id",
                json!(report.run_id),
            ),
            "duration_ms",
            json!(duration_ms),
        );
        self.event_sink.try_emit(kinds::BUILD_COMPLETED, Some(event));

        BuildResult::Completed(report)
    }

    fn supersede(&self, build_id: &str, generation: BuildGeneration) -> BuildResult<S, P> {
        let state = self
            .contexts
            .get(build_id)
            .map(|context| context.current_state.to_string())
            .unwrap_or_default();
        warn!(build_id, generation = %generation, "Build superseded");
        self.event_sink.try_emit(
            kinds::BUILD_SUPERSEDED,
            Some(build_payload(build_id, Some(generation), &state)),
        );
        BuildResult::Superseded { generation }
    }
}

impl<S: Debug, G: Debug, P> Debug for PipelineEngine<S, G, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("name", &self.config.name)
            .field("contexts", &self.contexts.len())
            .finish_non_exhaustive()
    }
}
