//! The routing DFA.

use super::handler::RouteHandler;
use super::route::NavigationRequest;
use crate::errors::DefinitionError;
use crate::pipeline::{DfaGroup, Link, PipelineDefinition, StateHandler, StateNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// States of a navigation build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// Asking every inflated worker for teardown consent. Locked.
    Consenting,
    /// A worker refused; the navigation is abandoned. Locked.
    ConsentDenied,
    /// Destroying the workers the new route does not keep. Locked.
    BuildStarting,
    /// Building the new workers one at a time, shallowest first.
    Building,
    /// Cancelling the workers of an interrupted or failed build. Locked.
    Cancelled,
    /// Idle; the last navigation finished.
    Complete,
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Consenting => "consenting",
            Self::ConsentDenied => "consent_denied",
            Self::BuildStarting => "build_starting",
            Self::Building => "building",
            Self::Cancelled => "cancelled",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// DFA groups of the routing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteGroup {
    /// Consent seeking and completion.
    Consent,
    /// Teardown, building and cancellation.
    Build,
}

impl fmt::Display for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consent => f.write_str("consent"),
            Self::Build => f.write_str("build"),
        }
    }
}

type Node = StateNode<RouteState, RouteGroup, NavigationRequest>;

/// Builds the routing table around one handler.
///
/// ```text
/// complete ──► consenting ──► [build] build_starting ──► building ──► complete
///                  │                                         │
///                  ▼                                         ▼
///            consent_denied ──► complete          cancelled ──► consenting
///                                                      └──(fail)──► complete
/// ```
pub(crate) fn routing_definition(
    handler: Arc<RouteHandler>,
) -> Result<PipelineDefinition<RouteState, RouteGroup, NavigationRequest>, DefinitionError> {
    let handler: Arc<dyn StateHandler<RouteState, NavigationRequest>> = handler;

    let consent = DfaGroup::new(RouteGroup::Consent, RouteState::Consenting)
        .with_auto_trigger(RouteState::Consenting)
        .state(
            Node::new(RouteState::Consenting)
                .with_prev([RouteState::Complete, RouteState::Cancelled])
                .with_next(Link::Group(RouteGroup::Build))
                .with_fail(Link::State(RouteState::ConsentDenied))
                .with_handler(Arc::clone(&handler))
                .locked(),
        )
        .state(
            Node::new(RouteState::ConsentDenied)
                .with_prev([RouteState::Consenting])
                .with_next(Link::State(RouteState::Complete))
                .locked(),
        )
        .state(Node::new(RouteState::Complete).with_prev([
            RouteState::Building,
            RouteState::ConsentDenied,
            RouteState::Cancelled,
        ]));

    let build = DfaGroup::new(RouteGroup::Build, RouteState::BuildStarting)
        .with_auto_trigger(RouteState::Cancelled)
        .state(
            Node::new(RouteState::BuildStarting)
                .with_prev([RouteState::Consenting])
                .with_next(Link::State(RouteState::Building))
                .with_handler(Arc::clone(&handler))
                .locked(),
        )
        .state(
            Node::new(RouteState::Building)
                .with_prev([RouteState::BuildStarting])
                .with_next(Link::State(RouteState::Complete))
                .with_fail(Link::State(RouteState::Cancelled))
                .with_handler(Arc::clone(&handler)),
        )
        .state(
            Node::new(RouteState::Cancelled)
                .with_prev([RouteState::Building])
                .with_next(Link::State(RouteState::Consenting))
                .with_fail(Link::State(RouteState::Complete))
                .with_handler(handler)
                .locked(),
        );

    PipelineDefinition::builder(RouteGroup::Consent)
        .group(consent)
        .group(build)
        .build()
}
