//! Route navigation over a chain of nested workers.
//!
//! A [`Router`] owns one build identifier on its own engine. Every
//! navigation polls the inflated workers for consent, destroys the ones the
//! new [`Route`] does not keep, and builds the rest one by one. A navigation
//! requested while another is building cancels the older one: its started
//! workers are cancelled newest first and the newer request is built
//! without asking for consent again.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stackflow::prelude::*;
//! use stackflow::testing::ScriptedWorkerFactory;
//!
//! # async fn example() -> Result<(), StackflowError> {
//! let router = Router::new(ScriptedWorkerFactory::new(), RouterConfig::default())?;
//! router.push(Route::new("/a", ["T", "A"])).await?;
//! router.push(Route::new("/a/b", ["T", "A", "B"])).await?;
//! assert_eq!(router.inflated_keys(), vec!["T", "A", "B"]);
//! # Ok(())
//! # }
//! ```

mod handler;
mod history;
mod route;
#[cfg(test)]
mod router_tests;
mod states;

pub use history::{HistoryEntry, NavigationHistory};
pub use route::{
    ChainDiff, NavigationKind, NavigationOutcome, NavigationRequest, Route, RoutePlan,
};
pub use states::{RouteGroup, RouteState};

use crate::config::RouterConfig;
use crate::core::WorkerStatus;
use crate::errors::StackflowError;
use crate::events::EventSink;
use crate::pipeline::{BuildContext, BuildResult, DfaTarget, PipelineEngine};
use crate::worker::WorkerFactory;
use handler::RouteHandler;
use std::sync::Arc;
use tracing::{debug, info};

/// Navigates between routes, one navigation at a time.
#[derive(Debug)]
pub struct Router {
    engine: PipelineEngine<RouteState, RouteGroup, NavigationRequest>,
    handler: Arc<RouteHandler>,
    config: RouterConfig,
}

impl Router {
    /// Creates a router that builds workers with `factory`.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` is invalid.
    pub fn new(
        factory: Arc<dyn WorkerFactory>,
        config: RouterConfig,
    ) -> Result<Self, StackflowError> {
        config.validate()?;
        let handler = Arc::new(RouteHandler::new(factory, config.history_limit));
        let definition = states::routing_definition(Arc::clone(&handler))?;

        Ok(Self {
            engine: PipelineEngine::new(definition, config.engine.clone()),
            handler,
            config,
        })
    }

    /// Sets the sink the router's engine reports to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.engine = self.engine.with_event_sink(sink);
        self
    }

    /// Navigates to `route`.
    ///
    /// Lock conflicts are not errors: a navigation requested while the
    /// router is consenting, tearing down or cancelling returns
    /// [`NavigationOutcome::Rejected`]. A route that is already current is
    /// [`NavigationOutcome::Unchanged`] only while no build is running; during
    /// a build it cancels the build like any other route.
    ///
    /// The route is committed before the engine releases the identifier, so
    /// a navigation started right after another one finishes sees its route.
    ///
    /// # Errors
    ///
    /// Returns an error only if the routing table is violated, which
    /// indicates a bug.
    pub async fn navigate(
        &self,
        route: Route,
        kind: NavigationKind,
    ) -> Result<NavigationOutcome, StackflowError> {
        let settled_on_route = kind != NavigationKind::Refresh
            && self.is_settled()
            && self.handler.is_current_route(&route);
        if settled_on_route {
            debug!(url = %route.url, "Route already current");
            return Ok(NavigationOutcome::Unchanged);
        }

        let target = (kind == NavigationKind::Refresh).then(|| DfaTarget::group(RouteGroup::Build));
        let request = NavigationRequest { route, kind };

        match self
            .engine
            .start_build(&self.config.build_id, request, target)
            .await
        {
            Ok(BuildResult::Completed(report)) => {
                let outcome = self.handler.finish(&report.payload, report.generation);
                info!(
                    url = %report.payload.route.url,
                    generation = %report.generation,
                    outcome = ?outcome,
                    "Navigation finished"
                );
                Ok(outcome)
            }
            Ok(BuildResult::Superseded { .. }) => Ok(NavigationOutcome::Superseded),
            Err(err) if err.is_lock_conflict() => Ok(NavigationOutcome::Rejected),
            Err(err) => Err(err),
        }
    }

    /// Navigates to a new history entry.
    ///
    /// # Errors
    ///
    /// See [`navigate`](Self::navigate).
    pub async fn push(&self, route: Route) -> Result<NavigationOutcome, StackflowError> {
        self.navigate(route, NavigationKind::Push).await
    }

    /// Navigates back to `route`, restoring its saved state if it is the
    /// top of the back stack.
    ///
    /// # Errors
    ///
    /// See [`navigate`](Self::navigate).
    pub async fn back(&self, route: Route) -> Result<NavigationOutcome, StackflowError> {
        self.navigate(route, NavigationKind::Back).await
    }

    /// Navigates forward to `route`, restoring its saved state if it is the
    /// top of the forward stack.
    ///
    /// # Errors
    ///
    /// See [`navigate`](Self::navigate).
    pub async fn forward(&self, route: Route) -> Result<NavigationOutcome, StackflowError> {
        self.navigate(route, NavigationKind::Forward).await
    }

    /// Navigates to `route` without recording the current entry.
    ///
    /// # Errors
    ///
    /// See [`navigate`](Self::navigate).
    pub async fn replace(&self, route: Route) -> Result<NavigationOutcome, StackflowError> {
        self.navigate(route, NavigationKind::Replace).await
    }

    /// Tears down and rebuilds the current route without asking for consent.
    ///
    /// Returns [`NavigationOutcome::Unchanged`] if nothing was navigated to yet.
    ///
    /// # Errors
    ///
    /// See [`navigate`](Self::navigate).
    pub async fn refresh(&self) -> Result<NavigationOutcome, StackflowError> {
        match self.handler.current_route() {
            Some(route) => self.navigate(route, NavigationKind::Refresh).await,
            None => Ok(NavigationOutcome::Unchanged),
        }
    }

    /// Returns the URL of the current route.
    #[must_use]
    pub fn current_url(&self) -> Option<String> {
        self.handler.current_route().map(|route| route.url)
    }

    /// Returns the current route.
    #[must_use]
    pub fn current_route(&self) -> Option<Route> {
        self.handler.current_route()
    }

    /// Returns the keys of the built workers, outermost first.
    #[must_use]
    pub fn inflated_keys(&self) -> Vec<String> {
        self.handler.inflated_keys()
    }

    /// Returns the status of an inflated worker.
    #[must_use]
    pub fn worker_status(&self, key: &str) -> Option<WorkerStatus> {
        self.handler.worker_status(key)
    }

    /// Returns a copy of the navigation history.
    #[must_use]
    pub fn history(&self) -> NavigationHistory {
        self.handler.history()
    }

    /// Returns the engine context of the router's build identifier.
    #[must_use]
    pub fn context(&self) -> Option<BuildContext<RouteState>> {
        self.engine.context(&self.config.build_id)
    }

    /// Returns true if a navigation request would be rejected right now.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.engine.is_locked(&self.config.build_id)
    }

    /// Returns true if no build is running and nothing is left to cancel.
    fn is_settled(&self) -> bool {
        let idle = self
            .context()
            .map_or(true, |context| context.current_state == RouteState::Complete);
        idle && self.handler.pending_cancellations() == 0
    }

    /// Returns how many started workers a cancellation would unwind.
    #[must_use]
    pub fn pending_cancellations(&self) -> usize {
        self.handler.pending_cancellations()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}
