//! Work done in each routing state.

use super::history::{HistoryEntry, NavigationHistory};
use super::route::{ChainDiff, NavigationKind, NavigationOutcome, NavigationRequest, Route};
use super::states::RouteState;
use crate::cancellation::CancelStack;
use crate::consent::{self, ConsentChain, ConsentDenial, ConsentVerdict, SavedState};
use crate::core::{BuildGeneration, WorkerStatus};
use crate::pipeline::{EntryKind, StateHandler, StepContext, StepOutcome};
use crate::stack::{ExclusiveStack, Stack};
use crate::worker::{WorkerFactory, WorkerLaunch, WorkerSlot};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Step = StepContext<RouteState, NavigationRequest>;

/// A worker build that failed, tagged with the build it belonged to.
#[derive(Debug, Clone)]
struct BuildFailure {
    generation: BuildGeneration,
    worker: String,
    error: String,
}

/// Teardown decisions of `build_starting`, consumed by `building`.
#[derive(Debug, Clone)]
struct BuildPlan {
    generation: BuildGeneration,
    start: usize,
    restored: Option<SavedState>,
}

/// Router bookkeeping shared between the states of a navigation.
#[derive(Debug)]
struct RouterState {
    current: Option<Route>,
    inflated: Vec<Arc<WorkerSlot>>,
    departing_state: SavedState,
    history: NavigationHistory,
    denial: Option<(BuildGeneration, ConsentDenial)>,
    failure: Option<BuildFailure>,
    plan: Option<BuildPlan>,
    committed: Option<(BuildGeneration, bool)>,
}

impl RouterState {
    fn new(history_limit: usize) -> Self {
        Self {
            current: None,
            inflated: Vec::new(),
            departing_state: SavedState::new(),
            history: NavigationHistory::new(history_limit),
            denial: None,
            failure: None,
            plan: None,
            committed: None,
        }
    }

    fn inflated_keys(&self) -> Vec<String> {
        self.inflated
            .iter()
            .map(|slot| slot.key().to_string())
            .collect()
    }

    fn forget(&mut self, slots: &[Arc<WorkerSlot>]) {
        self.inflated
            .retain(|slot| !slots.iter().any(|gone| Arc::ptr_eq(gone, slot)));
    }
}

/// State handler of the routing pipeline.
pub(crate) struct RouteHandler {
    factory: Arc<dyn WorkerFactory>,
    state: Mutex<RouterState>,
    cancel: CancelStack,
}

impl RouteHandler {
    pub(crate) fn new(factory: Arc<dyn WorkerFactory>, history_limit: usize) -> Self {
        Self {
            factory,
            state: Mutex::new(RouterState::new(history_limit)),
            cancel: CancelStack::new(),
        }
    }

    async fn consenting(&self, step: &Step) -> StepOutcome {
        if step.from() == Some(RouteState::Cancelled) {
            debug!(build_id = step.build_id(), "Restarting after cancellation, consent skipped");
            return StepOutcome::Advance;
        }

        let pending: ExclusiveStack<Arc<WorkerSlot>> =
            self.state.lock().inflated.iter().cloned().collect();
        let verdict = ConsentChain::new(pending)
            .seek(step.build_id(), SavedState::new())
            .await;

        let mut state = self.state.lock();
        match verdict {
            ConsentVerdict::Approved(saved) => {
                state.departing_state = saved;
                StepOutcome::Advance
            }
            ConsentVerdict::Denied(denial) => {
                state.denial = Some((step.generation(), denial));
                StepOutcome::Fail
            }
        }
    }

    async fn build_starting(&self, step: &Step) -> StepOutcome {
        // a refresh can interrupt a running build without passing `cancelled`
        let leftover = self.cancel.unwind(step.build_id()).await;

        let doomed = {
            let mut state = self.state.lock();
            state.forget(&leftover);

            let request = step.payload();
            let inflated = state.inflated_keys();
            let diff = if request.kind == NavigationKind::Refresh {
                ChainDiff::overhaul()
            } else {
                ChainDiff::between(&inflated, &request.route.chain)
            };
            let restored = state
                .history
                .restore_for(request.kind, &request.route.url)
                .map(|entry| entry.saved_state.clone());

            debug!(
                build_id = step.build_id(),
                diff_index = diff.index,
                overhaul = diff.overhaul,
                restoring = restored.is_some(),
                "Planned route build"
            );
            state.plan = Some(BuildPlan {
                generation: step.generation(),
                start: diff.index,
                restored,
            });
            let keep = diff.index.min(state.inflated.len());
            state.inflated.split_off(keep)
        };

        for slot in doomed {
            slot.worker().destroy(step.build_id()).await;
            slot.set_status(WorkerStatus::Destroyed);
        }
        StepOutcome::Advance
    }

    async fn building(&self, step: &Step) -> StepOutcome {
        let plan = self.state.lock().plan.clone();
        let Some(plan) = plan.filter(|plan| plan.generation == step.generation()) else {
            warn!(build_id = step.build_id(), "No build plan for this generation");
            return StepOutcome::Fail;
        };

        let route = &step.payload().route;
        for (depth, key) in route.chain.iter().enumerate().skip(plan.start) {
            if !step.is_current() {
                return StepOutcome::Advance;
            }

            let worker = match self.factory.create(key) {
                Ok(worker) => worker,
                Err(err) => return self.record_failure(step, key, &err.to_string()),
            };
            let slot = WorkerSlot::new(worker);
            self.cancel.register(Arc::clone(&slot));

            let launch = self.launch(step, &plan, depth, key);
            let result = slot.worker().build(&launch).await;

            let result = result.map_err(|e| e.to_string());
            if let Some(outcome) = self.commit_worker(step, slot, result) {
                return outcome;
            }
        }
        self.commit_route(step, &plan)
    }

    async fn cancelled(&self, step: &Step) -> StepOutcome {
        let cancelled = self.cancel.unwind(step.build_id()).await;
        {
            let mut state = self.state.lock();
            state.forget(&cancelled);
            consent::release_consent(&state.inflated);
        }
        info!(
            build_id = step.build_id(),
            cancelled = cancelled.len(),
            "Build cancelled"
        );

        if step.entry() == EntryKind::Failed {
            StepOutcome::Fail
        } else {
            StepOutcome::Advance
        }
    }

    fn launch(&self, step: &Step, plan: &BuildPlan, depth: usize, key: &str) -> WorkerLaunch {
        let route = &step.payload().route;
        let restored_state = match &plan.restored {
            Some(restored) => restored.get(key).cloned(),
            None => self.state.lock().departing_state.get(key).cloned(),
        };
        WorkerLaunch {
            build_id: step.build_id().to_string(),
            generation: step.generation(),
            target: route.url.clone(),
            depth,
            params: route.params.clone(),
            restored_state,
        }
    }

    /// Records a finished worker build. Returns the outcome to stop with, if any.
    fn commit_worker(
        &self,
        step: &Step,
        slot: Arc<WorkerSlot>,
        result: Result<(), String>,
    ) -> Option<StepOutcome> {
        let mut state = self.state.lock();
        if !step.is_current() {
            debug!(
                build_id = step.build_id(),
                worker = slot.key(),
                "Dropping result of superseded build"
            );
            return Some(StepOutcome::Advance);
        }
        match result {
            Ok(()) => {
                slot.set_status(WorkerStatus::Running);
                state.inflated.push(slot);
                None
            }
            Err(error) => {
                drop(state);
                Some(self.record_failure(step, slot.key(), &error))
            }
        }
    }

    /// Makes the built route current while the engine still holds the
    /// identifier in `building`.
    fn commit_route(&self, step: &Step, plan: &BuildPlan) -> StepOutcome {
        let mut state = self.state.lock();
        if !step.is_current() {
            debug!(build_id = step.build_id(), "Dropping superseded route");
            return StepOutcome::Advance;
        }

        let request = step.payload();
        let departing_state = std::mem::take(&mut state.departing_state);
        let departing = state.current.take();
        if request.kind != NavigationKind::Refresh {
            // returning to the current url records nothing
            let departing = departing
                .filter(|route| route.url != request.route.url)
                .map(|route| HistoryEntry::new(route, departing_state));
            state
                .history
                .commit(request.kind, departing, &request.route.url);
        }
        state.current = Some(request.route.clone());
        state.plan = None;
        state.committed = Some((step.generation(), plan.restored.is_some()));
        consent::release_consent(&state.inflated);
        self.cancel.clear();
        StepOutcome::Advance
    }

    fn record_failure(&self, step: &Step, worker: &str, error: &str) -> StepOutcome {
        warn!(build_id = step.build_id(), worker, error, "Worker build failed");
        self.state.lock().failure = Some(BuildFailure {
            generation: step.generation(),
            worker: worker.to_string(),
            error: error.to_string(),
        });
        StepOutcome::Fail
    }

    /// Turns a completed routing build into its outcome.
    pub(crate) fn finish(
        &self,
        request: &NavigationRequest,
        generation: BuildGeneration,
    ) -> NavigationOutcome {
        let mut state = self.state.lock();
        if let Some((_, denial)) = state.denial.take().filter(|(g, _)| *g == generation) {
            return NavigationOutcome::Denied(denial);
        }
        if let Some(failure) = state.failure.take().filter(|f| f.generation == generation) {
            state.plan = None;
            consent::release_consent(&state.inflated);
            return NavigationOutcome::Failed {
                worker: failure.worker,
                error: failure.error,
            };
        }

        match state.committed.take().filter(|(g, _)| *g == generation) {
            Some((_, restored)) => NavigationOutcome::Navigated {
                url: request.route.url.clone(),
                restored,
            },
            None => NavigationOutcome::Superseded,
        }
    }

    /// Returns true if `route` is already current and fully inflated.
    pub(crate) fn is_current_route(&self, route: &Route) -> bool {
        let state = self.state.lock();
        let inflated: Stack<String> = state.inflated_keys().into();
        state
            .current
            .as_ref()
            .is_some_and(|current| current.url == route.url)
            && inflated.matches(&route.key_stack())
    }

    pub(crate) fn current_route(&self) -> Option<Route> {
        self.state.lock().current.clone()
    }

    pub(crate) fn inflated_keys(&self) -> Vec<String> {
        self.state.lock().inflated_keys()
    }

    pub(crate) fn history(&self) -> NavigationHistory {
        self.state.lock().history.clone()
    }

    pub(crate) fn worker_status(&self, key: &str) -> Option<WorkerStatus> {
        self.state
            .lock()
            .inflated
            .iter()
            .find(|slot| slot.key() == key)
            .map(|slot| slot.status())
    }

    pub(crate) fn pending_cancellations(&self) -> usize {
        self.cancel.pending_count()
    }
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandler")
            .field("state", &*self.state.lock())
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StateHandler<RouteState, NavigationRequest> for RouteHandler {
    async fn enter(&self, step: &Step) -> StepOutcome {
        match step.state() {
            RouteState::Consenting => self.consenting(step).await,
            RouteState::BuildStarting => self.build_starting(step).await,
            RouteState::Building => self.building(step).await,
            RouteState::Cancelled => self.cancelled(step).await,
            RouteState::ConsentDenied | RouteState::Complete => StepOutcome::Advance,
        }
    }
}
