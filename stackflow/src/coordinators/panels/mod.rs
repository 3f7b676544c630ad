//! Overlay panels stacked per context.
//!
//! Each context (a window, a tab) is its own build identifier with its own
//! stack of open panels. Opening a panel that is already open raises it to
//! the top. Closing asks the panels involved for consent first and destroys
//! them topmost first. A request made while a panel is still building
//! aborts that build.

mod handler;
#[cfg(test)]
mod panels_tests;
mod request;
mod states;

pub use request::{PanelOutcome, PanelRequest};
pub use states::{PanelGroup, PanelState};

use crate::config::PanelConfig;
use crate::core::WorkerStatus;
use crate::errors::StackflowError;
use crate::events::EventSink;
use crate::pipeline::{BuildContext, BuildResult, PipelineEngine};
use crate::worker::WorkerFactory;
use futures::future::join_all;
use handler::PanelHandler;
use std::sync::Arc;
use tracing::info;

/// Opens and closes panels, one request per context at a time.
#[derive(Debug)]
pub struct PanelCoordinator {
    engine: PipelineEngine<PanelState, PanelGroup, PanelRequest>,
    handler: Arc<PanelHandler>,
    config: PanelConfig,
}

impl PanelCoordinator {
    /// Creates a coordinator that builds panels with `factory`.
    ///
    /// # Errors
    ///
    /// Returns a definition error if the panel table is invalid.
    pub fn new(
        factory: Arc<dyn WorkerFactory>,
        config: PanelConfig,
    ) -> Result<Self, StackflowError> {
        let handler = Arc::new(PanelHandler::new(factory));
        let definition = states::panel_definition(Arc::clone(&handler))?;

        Ok(Self {
            engine: PipelineEngine::new(definition, config.engine.clone()),
            handler,
            config,
        })
    }

    /// Sets the sink the coordinator's engine reports to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.engine = self.engine.with_event_sink(sink);
        self
    }

    /// Opens `key` on top of `context`, or raises it if it is already open.
    ///
    /// Raising goes through the pipeline like any other request, so it
    /// aborts a panel that is still building.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn open(
        &self,
        context: &str,
        key: &str,
        params: serde_json::Value,
    ) -> Result<PanelOutcome, StackflowError> {
        self.request(
            context,
            PanelRequest::Open {
                key: key.to_string(),
                params,
            },
        )
        .await
    }

    /// Closes `key` in `context`, asking it for consent first.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn close(&self, context: &str, key: &str) -> Result<PanelOutcome, StackflowError> {
        if !self.handler.is_open(context, key) {
            return Ok(PanelOutcome::Unchanged);
        }
        self.request(
            context,
            PanelRequest::Close {
                key: key.to_string(),
            },
        )
        .await
    }

    /// Closes every panel of `context`. Nothing is closed unless every
    /// panel consents.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn close_all(&self, context: &str) -> Result<PanelOutcome, StackflowError> {
        if self.handler.open_panels(context).is_empty() {
            return Ok(PanelOutcome::Unchanged);
        }
        self.request(context, PanelRequest::CloseAll).await
    }

    /// Closes the panels of every known context concurrently.
    ///
    /// Returns one outcome per context, in no particular order.
    pub async fn close_all_contexts(
        &self,
    ) -> Vec<(String, Result<PanelOutcome, StackflowError>)> {
        let contexts = self.handler.contexts();
        let outcomes = join_all(contexts.iter().map(|context| self.close_all(context))).await;
        contexts.into_iter().zip(outcomes).collect()
    }

    /// Runs `request` on `context` through the panel pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error only if the panel table is violated.
    pub async fn request(
        &self,
        context: &str,
        request: PanelRequest,
    ) -> Result<PanelOutcome, StackflowError> {
        match self.engine.start_build(context, request, None).await {
            Ok(BuildResult::Completed(report)) => {
                let outcome = self
                    .handler
                    .finish(context, &report.payload, report.generation);
                info!(
                    context,
                    generation = %report.generation,
                    outcome = ?outcome,
                    "Panel request finished"
                );
                Ok(outcome)
            }
            Ok(BuildResult::Superseded { .. }) => Ok(PanelOutcome::Superseded),
            Err(err) if err.is_lock_conflict() => Ok(PanelOutcome::Rejected),
            Err(err) => Err(err),
        }
    }

    /// Returns the open panels of `context`, bottom first.
    #[must_use]
    pub fn open_panels(&self, context: &str) -> Vec<String> {
        self.handler.open_panels(context)
    }

    /// Returns the topmost panel of `context`.
    #[must_use]
    pub fn top_panel(&self, context: &str) -> Option<String> {
        self.handler.open_panels(context).pop()
    }

    /// Returns the status of an open panel.
    #[must_use]
    pub fn panel_status(&self, context: &str, key: &str) -> Option<WorkerStatus> {
        self.handler.panel_status(context, key)
    }

    /// Returns how many started panel builds an abort would cancel.
    #[must_use]
    pub fn pending_cancellations(&self, context: &str) -> usize {
        self.handler.pending_cancellations(context)
    }

    /// Returns the engine context of `context`.
    #[must_use]
    pub fn context(&self, context: &str) -> Option<BuildContext<PanelState>> {
        self.engine.context(context)
    }

    /// Returns true if a request on `context` would be rejected right now.
    #[must_use]
    pub fn is_locked(&self, context: &str) -> bool {
        self.engine.is_locked(context)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }
}
