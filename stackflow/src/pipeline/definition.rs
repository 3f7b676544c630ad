//! Declarative DFA tables and their validation.

use super::handler::StateHandler;
use crate::errors::{DefinitionError, TransitionError};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

/// Identifier of a state or a DFA group.
///
/// Implemented for every closed enum with the required derives.
pub trait PipelineKey: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> PipelineKey for T where T: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Where a `next` or `fail` link leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link<S, G> {
    /// A state, which must list the linking state in its `prev`.
    State(S),
    /// Another group, entered at its root.
    Group(G),
}

impl<S: Display, G: Display> Display for Link<S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(state) => write!(f, "{state}"),
            Self::Group(group) => write!(f, "group:{group}"),
        }
    }
}

/// An explicit entry point for a build: a group and, optionally, one of its
/// states. Without a state the group's root is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfaTarget<S, G> {
    /// The group to enter.
    pub group: G,
    /// The state to enter; defaults to the group's root.
    pub state: Option<S>,
}

impl<S, G> DfaTarget<S, G> {
    /// Targets the root of `group`.
    #[must_use]
    pub fn group(group: G) -> Self {
        Self { group, state: None }
    }

    /// Targets `state` inside `group`.
    #[must_use]
    pub fn state(group: G, state: S) -> Self {
        Self {
            group,
            state: Some(state),
        }
    }
}

/// One state of a DFA group.
pub struct StateNode<S, G, P> {
    /// The state name.
    pub name: S,
    /// States this state may be entered from.
    pub prev: Vec<S>,
    /// Link followed on [`StepOutcome::Advance`](super::StepOutcome::Advance).
    /// A node without one is terminal.
    pub next: Option<Link<S, G>>,
    /// Link followed on [`StepOutcome::Fail`](super::StepOutcome::Fail).
    pub fail: Option<Link<S, G>>,
    /// Work performed on entry. A node without a handler advances at once.
    pub handler: Option<Arc<dyn StateHandler<S, P>>>,
    /// Rejects new build requests for the identifier while this state is current.
    pub super_pipeline_lock: bool,
}

impl<S: PipelineKey, G: PipelineKey, P> StateNode<S, G, P> {
    /// Creates a terminal, unlocked node without predecessors.
    #[must_use]
    pub fn new(name: S) -> Self {
        Self {
            name,
            prev: Vec::new(),
            next: None,
            fail: None,
            handler: None,
            super_pipeline_lock: false,
        }
    }

    /// Sets the legal predecessors.
    #[must_use]
    pub fn with_prev(mut self, prev: impl IntoIterator<Item = S>) -> Self {
        self.prev = prev.into_iter().collect();
        self
    }

    /// Sets the advance link.
    #[must_use]
    pub fn with_next(mut self, next: Link<S, G>) -> Self {
        self.next = Some(next);
        self
    }

    /// Sets the fail link.
    #[must_use]
    pub fn with_fail(mut self, fail: Link<S, G>) -> Self {
        self.fail = Some(fail);
        self
    }

    /// Sets the entry handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn StateHandler<S, P>>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Marks the state as holding the pipeline lock.
    #[must_use]
    pub fn locked(mut self) -> Self {
        self.super_pipeline_lock = true;
        self
    }

    /// Returns true if reaching this node completes the build.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }

    /// Returns true if `state` is a legal predecessor.
    #[must_use]
    pub fn accepts_from(&self, state: S) -> bool {
        self.prev.contains(&state)
    }
}

impl<S: Debug, G: Debug, P> Debug for StateNode<S, G, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("name", &self.name)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .field("fail", &self.fail)
            .field("has_handler", &self.handler.is_some())
            .field("super_pipeline_lock", &self.super_pipeline_lock)
            .finish()
    }
}

/// A named sub-graph of states with one root and an optional auto-trigger.
pub struct DfaGroup<S, G, P> {
    /// The group name.
    pub name: G,
    /// Entry state when the group is targeted.
    pub root: S,
    /// Entry state for untargeted requests against a context in this group.
    pub auto_trigger: Option<S>,
    /// The group's states, in declaration order.
    pub states: Vec<StateNode<S, G, P>>,
}

impl<S: PipelineKey, G: PipelineKey, P> DfaGroup<S, G, P> {
    /// Creates an empty group entered at `root`.
    #[must_use]
    pub fn new(name: G, root: S) -> Self {
        Self {
            name,
            root,
            auto_trigger: None,
            states: Vec::new(),
        }
    }

    /// Sets the auto-trigger state.
    #[must_use]
    pub fn with_auto_trigger(mut self, state: S) -> Self {
        self.auto_trigger = Some(state);
        self
    }

    /// Adds a state.
    #[must_use]
    pub fn state(mut self, node: StateNode<S, G, P>) -> Self {
        self.states.push(node);
        self
    }

    /// Returns the node for `state`, if it belongs to this group.
    #[must_use]
    pub fn node(&self, state: S) -> Option<&StateNode<S, G, P>> {
        self.states.iter().find(|node| node.name == state)
    }
}

impl<S: Debug, G: Debug, P> Debug for DfaGroup<S, G, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DfaGroup")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("auto_trigger", &self.auto_trigger)
            .field("states", &self.states)
            .finish()
    }
}

/// A validated, immutable set of DFA groups.
pub struct PipelineDefinition<S, G, P> {
    initial_group: G,
    groups: HashMap<G, DfaGroup<S, G, P>>,
    owners: HashMap<S, G>,
}

impl<S: PipelineKey, G: PipelineKey, P> PipelineDefinition<S, G, P> {
    /// Starts a definition whose fresh contexts enter `initial_group`.
    #[must_use]
    pub fn builder(initial_group: G) -> PipelineDefinitionBuilder<S, G, P> {
        PipelineDefinitionBuilder {
            initial_group,
            groups: Vec::new(),
        }
    }

    /// Returns the group fresh contexts enter.
    #[must_use]
    pub fn initial_group(&self) -> &DfaGroup<S, G, P> {
        // presence checked in build()
        &self.groups[&self.initial_group]
    }

    /// Returns a group by name.
    pub fn group(&self, group: G) -> Result<&DfaGroup<S, G, P>, TransitionError> {
        self.groups
            .get(&group)
            .ok_or_else(|| TransitionError::UnknownGroup {
                group: group.to_string(),
            })
    }

    /// Returns the group that declares `state`.
    pub fn group_of(&self, state: S) -> Result<&DfaGroup<S, G, P>, TransitionError> {
        let group = self
            .owners
            .get(&state)
            .ok_or_else(|| TransitionError::UnknownState {
                group: "<any>".to_string(),
                state: state.to_string(),
            })?;
        self.group(*group)
    }

    /// Returns the node for `state`.
    pub fn node(&self, state: S) -> Result<&StateNode<S, G, P>, TransitionError> {
        let group = self.group_of(state)?;
        group
            .node(state)
            .ok_or_else(|| TransitionError::UnknownState {
                group: group.name.to_string(),
                state: state.to_string(),
            })
    }

    /// Returns true if `state` is the root of its group.
    #[must_use]
    pub fn is_root(&self, state: S) -> bool {
        self.group_of(state).is_ok_and(|group| group.root == state)
    }

    /// Resolves a link to the state it enters.
    pub fn resolve(&self, link: Link<S, G>) -> Result<S, TransitionError> {
        match link {
            Link::State(state) => Ok(state),
            Link::Group(group) => Ok(self.group(group)?.root),
        }
    }

    /// Returns the number of declared states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.owners.len()
    }
}

impl<S: Debug, G: Debug, P> Debug for PipelineDefinition<S, G, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("initial_group", &self.initial_group)
            .field("groups", &self.groups.values().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects groups and validates them into a [`PipelineDefinition`].
pub struct PipelineDefinitionBuilder<S, G, P> {
    initial_group: G,
    groups: Vec<DfaGroup<S, G, P>>,
}

impl<S: PipelineKey, G: PipelineKey, P> PipelineDefinitionBuilder<S, G, P> {
    /// Adds a group.
    #[must_use]
    pub fn group(mut self, group: DfaGroup<S, G, P>) -> Self {
        self.groups.push(group);
        self
    }

    /// Validates the table.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] if a link, predecessor, root or
    /// auto-trigger names an undeclared state or group, if a state is
    /// declared twice, if a link's target does not list its source as a
    /// predecessor, or if a terminal state locks, fails or runs a handler.
    pub fn build(self) -> Result<PipelineDefinition<S, G, P>, DefinitionError> {
        if self.groups.is_empty() {
            return Err(DefinitionError::empty());
        }

        let mut owners = HashMap::new();
        let mut groups = HashMap::new();
        for group in self.groups {
            for node in &group.states {
                if owners.insert(node.name, group.name).is_some() {
                    return Err(DefinitionError::duplicate_state(node.name.to_string()));
                }
            }
            if groups.contains_key(&group.name) {
                return Err(DefinitionError::new(format!(
                    "Group '{}' is declared more than once",
                    group.name
                )));
            }
            groups.insert(group.name, group);
        }

        if !groups.contains_key(&self.initial_group) {
            return Err(DefinitionError::unknown_group(self.initial_group.to_string()));
        }

        let definition = PipelineDefinition {
            initial_group: self.initial_group,
            groups,
            owners,
        };
        for group in definition.groups.values() {
            definition.validate_group(group)?;
        }
        Ok(definition)
    }
}

impl<S: PipelineKey, G: PipelineKey, P> PipelineDefinition<S, G, P> {
    fn validate_group(&self, group: &DfaGroup<S, G, P>) -> Result<(), DefinitionError> {
        let entries = std::iter::once(group.root).chain(group.auto_trigger);
        for entry in entries {
            if group.node(entry).is_none() {
                return Err(DefinitionError::outside_group(
                    group.name.to_string(),
                    entry.to_string(),
                ));
            }
        }

        for node in &group.states {
            for prev in &node.prev {
                if !self.owners.contains_key(prev) {
                    return Err(DefinitionError::unknown_state(
                        node.name.to_string(),
                        prev.to_string(),
                    ));
                }
            }

            if node.is_terminal() {
                let problem = if node.super_pipeline_lock {
                    Some("must not hold the pipeline lock")
                } else if node.fail.is_some() {
                    Some("must not declare a fail link")
                } else if node.handler.is_some() {
                    Some("must not have a handler")
                } else {
                    None
                };
                if let Some(reason) = problem {
                    return Err(DefinitionError::invalid_terminal(node.name.to_string(), reason));
                }
            }

            for link in node.next.iter().chain(node.fail.iter()) {
                self.validate_link(node.name, *link)?;
            }
        }
        Ok(())
    }

    fn validate_link(&self, from: S, link: Link<S, G>) -> Result<(), DefinitionError> {
        match link {
            Link::Group(group) => {
                if self.groups.contains_key(&group) {
                    Ok(())
                } else {
                    Err(DefinitionError::unknown_group(group.to_string()))
                }
            }
            Link::State(to) => {
                let target = self
                    .node(to)
                    .map_err(|_| DefinitionError::unknown_state(from.to_string(), to.to_string()))?;
                if target.accepts_from(from) {
                    Ok(())
                } else {
                    Err(DefinitionError::unlisted_predecessor(
                        from.to_string(),
                        to.to_string(),
                    ))
                }
            }
        }
    }
}
