//! Work done in each panel state.

use super::request::{PanelOutcome, PanelRequest};
use super::states::PanelState;
use crate::cancellation::CancelStack;
use crate::consent::{ConsentChain, ConsentDenial, ConsentVerdict, SavedState};
use crate::core::{BuildGeneration, WorkerStatus};
use crate::pipeline::{EntryKind, StateHandler, StepContext, StepOutcome};
use crate::stack::ExclusiveStack;
use crate::worker::{WorkerFactory, WorkerLaunch, WorkerSlot};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Step = StepContext<PanelState, PanelRequest>;

#[derive(Debug, Clone)]
struct PanelFailure {
    generation: BuildGeneration,
    panel: String,
    error: String,
}

/// Open panels of one context plus the bookkeeping of its current request.
#[derive(Debug, Default)]
struct DeckState {
    open: ExclusiveStack<Arc<WorkerSlot>>,
    saved: SavedState,
    dismiss: Option<(BuildGeneration, Vec<Arc<WorkerSlot>>)>,
    closed: Option<(BuildGeneration, Vec<String>)>,
    raised: Option<BuildGeneration>,
    denial: Option<(BuildGeneration, ConsentDenial)>,
    failure: Option<PanelFailure>,
}

impl DeckState {
    fn find(&self, key: &str) -> Option<Arc<WorkerSlot>> {
        self.open.iter().find(|slot| slot.key() == key).cloned()
    }

    /// Moves an open panel to the top. Returns false if it is not open.
    fn raise(&mut self, key: &str) -> bool {
        match self.find(key) {
            Some(slot) => {
                self.open.push(slot);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct PanelDeck {
    state: Mutex<DeckState>,
    cancel: CancelStack,
}

/// State handler of the panel pipeline; one deck per context.
pub(crate) struct PanelHandler {
    factory: Arc<dyn WorkerFactory>,
    decks: DashMap<String, Arc<PanelDeck>>,
}

impl PanelHandler {
    pub(crate) fn new(factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            factory,
            decks: DashMap::new(),
        }
    }

    fn deck(&self, context: &str) -> Arc<PanelDeck> {
        Arc::clone(self.decks.entry(context.to_string()).or_default().value())
    }

    fn existing(&self, context: &str) -> Option<Arc<PanelDeck>> {
        self.decks.get(context).map(|deck| Arc::clone(deck.value()))
    }

    async fn polling(&self, step: &Step) -> StepOutcome {
        let deck = self.deck(step.build_id());
        let targets: Vec<Arc<WorkerSlot>> = {
            let state = deck.state.lock();
            match step.payload() {
                PanelRequest::Open { .. } => Vec::new(),
                PanelRequest::Close { key } => state.find(key).into_iter().collect(),
                PanelRequest::CloseAll => state.open.iter().cloned().collect(),
            }
        };

        let pending: ExclusiveStack<Arc<WorkerSlot>> = targets.iter().cloned().collect();
        let verdict = ConsentChain::new(pending)
            .seek(step.build_id(), SavedState::new())
            .await;

        let mut state = deck.state.lock();
        match verdict {
            ConsentVerdict::Approved(saved) => {
                state.saved.extend(saved);
                let mut doomed = targets;
                doomed.reverse();
                state.dismiss = Some((step.generation(), doomed));
                StepOutcome::Advance
            }
            ConsentVerdict::Denied(denial) => {
                info!(
                    build_id = step.build_id(),
                    panel = %denial.worker,
                    "Panel refused to close"
                );
                state.denial = Some((step.generation(), denial));
                StepOutcome::Fail
            }
        }
    }

    async fn dismissing(&self, step: &Step) -> StepOutcome {
        let deck = self.deck(step.build_id());
        let doomed = {
            let mut state = deck.state.lock();
            let doomed = state
                .dismiss
                .take()
                .filter(|(generation, _)| *generation == step.generation())
                .map(|(_, slots)| slots)
                .unwrap_or_default();
            for slot in &doomed {
                state.open.sort_delete(slot);
            }
            doomed
        };

        let mut closed = Vec::with_capacity(doomed.len());
        for slot in doomed {
            slot.worker().destroy(step.build_id()).await;
            slot.set_status(WorkerStatus::Destroyed);
            closed.push(slot.key().to_string());
        }
        if !closed.is_empty() {
            debug!(build_id = step.build_id(), panels = ?closed, "Panels dismissed");
        }
        deck.state.lock().closed = Some((step.generation(), closed));
        StepOutcome::Advance
    }

    async fn opening(&self, step: &Step) -> StepOutcome {
        let PanelRequest::Open { key, params } = step.payload() else {
            return StepOutcome::Advance;
        };
        let deck = self.deck(step.build_id());

        let launch = {
            let mut state = deck.state.lock();
            if state.raise(key) {
                state.raised = Some(step.generation());
                return StepOutcome::Advance;
            }
            WorkerLaunch {
                build_id: step.build_id().to_string(),
                generation: step.generation(),
                target: key.clone(),
                depth: state.open.len(),
                params: params.clone(),
                restored_state: state.saved.get(key).cloned(),
            }
        };

        let worker = match self.factory.create(key) {
            Ok(worker) => worker,
            Err(err) => return record_failure(&deck, step, key, &err.to_string()),
        };
        let slot = WorkerSlot::new(worker);
        deck.cancel.register(Arc::clone(&slot));

        let result = slot.worker().build(&launch).await;
        commit_panel(&deck, step, slot, result.map_err(|e| e.to_string()))
    }

    async fn aborted(&self, step: &Step) -> StepOutcome {
        let deck = self.deck(step.build_id());
        let cancelled = deck.cancel.unwind(step.build_id()).await;
        info!(
            build_id = step.build_id(),
            cancelled = cancelled.len(),
            "Panel build aborted"
        );

        if step.entry() == EntryKind::Failed {
            StepOutcome::Fail
        } else {
            StepOutcome::Advance
        }
    }

    /// Turns a completed panel build into its outcome.
    pub(crate) fn finish(
        &self,
        context: &str,
        request: &PanelRequest,
        generation: BuildGeneration,
    ) -> PanelOutcome {
        let deck = self.deck(context);
        let mut state = deck.state.lock();
        if let Some((_, denial)) = state.denial.take().filter(|(g, _)| *g == generation) {
            return PanelOutcome::Refused(denial);
        }
        if let Some(failure) = state.failure.take().filter(|f| f.generation == generation) {
            return PanelOutcome::Failed {
                panel: failure.panel,
                error: failure.error,
            };
        }

        let raised = state.raised.take().is_some_and(|g| g == generation);
        let closed = state
            .closed
            .take()
            .filter(|(g, _)| *g == generation)
            .map(|(_, panels)| panels)
            .unwrap_or_default();

        match request {
            PanelRequest::Open { key, .. } if raised => PanelOutcome::Raised { panel: key.clone() },
            PanelRequest::Open { key, .. } => PanelOutcome::Opened { panel: key.clone() },
            PanelRequest::Close { .. } | PanelRequest::CloseAll => {
                PanelOutcome::Closed { panels: closed }
            }
        }
    }

    pub(crate) fn contexts(&self) -> Vec<String> {
        self.decks.iter().map(|deck| deck.key().clone()).collect()
    }

    pub(crate) fn is_open(&self, context: &str, key: &str) -> bool {
        self.existing(context)
            .is_some_and(|deck| deck.state.lock().find(key).is_some())
    }

    pub(crate) fn open_panels(&self, context: &str) -> Vec<String> {
        self.existing(context)
            .map(|deck| {
                deck.state
                    .lock()
                    .open
                    .iter()
                    .map(|slot| slot.key().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn panel_status(&self, context: &str, key: &str) -> Option<WorkerStatus> {
        self.existing(context)
            .and_then(|deck| deck.state.lock().find(key))
            .map(|slot| slot.status())
    }

    pub(crate) fn pending_cancellations(&self, context: &str) -> usize {
        self.existing(context)
            .map_or(0, |deck| deck.cancel.pending_count())
    }
}

/// Records a finished panel build.
fn commit_panel(
    deck: &PanelDeck,
    step: &Step,
    slot: Arc<WorkerSlot>,
    result: Result<(), String>,
) -> StepOutcome {
    let mut state = deck.state.lock();
    if !step.is_current() {
        debug!(
            build_id = step.build_id(),
            panel = slot.key(),
            "Dropping result of superseded panel build"
        );
        return StepOutcome::Advance;
    }
    match result {
        Ok(()) => {
            slot.set_status(WorkerStatus::Running);
            state.saved.remove(slot.key());
            state.open.push(slot);
            drop(state);
            deck.cancel.clear();
            StepOutcome::Advance
        }
        Err(error) => {
            drop(state);
            record_failure(deck, step, slot.key(), &error)
        }
    }
}

fn record_failure(deck: &PanelDeck, step: &Step, panel: &str, error: &str) -> StepOutcome {
    warn!(build_id = step.build_id(), panel, error, "Panel build failed");
    deck.state.lock().failure = Some(PanelFailure {
        generation: step.generation(),
        panel: panel.to_string(),
        error: error.to_string(),
    });
    StepOutcome::Fail
}

impl std::fmt::Debug for PanelHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelHandler")
            .field("contexts", &self.decks.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StateHandler<PanelState, PanelRequest> for PanelHandler {
    async fn enter(&self, step: &Step) -> StepOutcome {
        match step.state() {
            PanelState::Polling => self.polling(step).await,
            PanelState::Dismissing => self.dismissing(step).await,
            PanelState::Opening => self.opening(step).await,
            PanelState::Aborted => self.aborted(step).await,
            PanelState::Idle | PanelState::Refused => StepOutcome::Advance,
        }
    }
}
