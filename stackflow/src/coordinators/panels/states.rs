//! The panel DFA.

use super::handler::PanelHandler;
use super::request::PanelRequest;
use crate::errors::DefinitionError;
use crate::pipeline::{DfaGroup, Link, PipelineDefinition, StateHandler, StateNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// States of a panel build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelState {
    /// No request in flight.
    Idle,
    /// Asking the panels a request would close for consent. Locked.
    Polling,
    /// A panel refused to close. Locked.
    Refused,
    /// Destroying the consented panels. Locked.
    Dismissing,
    /// Building the requested panel.
    Opening,
    /// Cancelling an interrupted or failed panel build. Locked.
    Aborted,
}

impl fmt::Display for PanelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Refused => "refused",
            Self::Dismissing => "dismissing",
            Self::Opening => "opening",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// DFA groups of the panel pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelGroup {
    /// Consent polling and idling.
    Poll,
    /// Dismissal, opening and abort.
    Open,
}

impl fmt::Display for PanelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => f.write_str("poll"),
            Self::Open => f.write_str("open"),
        }
    }
}

type Node = StateNode<PanelState, PanelGroup, PanelRequest>;

/// Builds the panel table around one handler.
pub(crate) fn panel_definition(
    handler: Arc<PanelHandler>,
) -> Result<PipelineDefinition<PanelState, PanelGroup, PanelRequest>, DefinitionError> {
    let handler: Arc<dyn StateHandler<PanelState, PanelRequest>> = handler;

    let poll = DfaGroup::new(PanelGroup::Poll, PanelState::Polling)
        .with_auto_trigger(PanelState::Polling)
        .state(Node::new(PanelState::Idle).with_prev([
            PanelState::Opening,
            PanelState::Refused,
            PanelState::Aborted,
        ]))
        .state(
            Node::new(PanelState::Polling)
                .with_prev([PanelState::Idle, PanelState::Aborted])
                .with_next(Link::Group(PanelGroup::Open))
                .with_fail(Link::State(PanelState::Refused))
                .with_handler(Arc::clone(&handler))
                .locked(),
        )
        .state(
            Node::new(PanelState::Refused)
                .with_prev([PanelState::Polling])
                .with_next(Link::State(PanelState::Idle))
                .locked(),
        );

    let open = DfaGroup::new(PanelGroup::Open, PanelState::Dismissing)
        .with_auto_trigger(PanelState::Aborted)
        .state(
            Node::new(PanelState::Dismissing)
                .with_prev([PanelState::Polling])
                .with_next(Link::State(PanelState::Opening))
                .with_handler(Arc::clone(&handler))
                .locked(),
        )
        .state(
            Node::new(PanelState::Opening)
                .with_prev([PanelState::Dismissing])
                .with_next(Link::State(PanelState::Idle))
                .with_fail(Link::State(PanelState::Aborted))
                .with_handler(Arc::clone(&handler)),
        )
        .state(
            Node::new(PanelState::Aborted)
                .with_prev([PanelState::Opening])
                .with_next(Link::State(PanelState::Polling))
                .with_fail(Link::State(PanelState::Idle))
                .with_handler(handler)
                .locked(),
        );

    PipelineDefinition::builder(PanelGroup::Poll)
        .group(poll)
        .group(open)
        .build()
}
