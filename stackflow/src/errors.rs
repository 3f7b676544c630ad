//! Error types for the stackflow engine.
//!
//! Invalid pipeline tables and illegal transitions are programming errors and
//! are reported as [`DefinitionError`] and [`TransitionError`]. Lock conflicts
//! are ordinary runtime outcomes that callers usually ignore. Stale builds are
//! not errors at all and never appear here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stackflow operations.
#[derive(Debug, Error)]
pub enum StackflowError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Definition(#[from] DefinitionError),

    /// A requested transition is not in the DFA table.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// A build was requested while the identifier is locked.
    #[error("{0}")]
    LockConflict(#[from] LockConflictError),

    /// No context exists for the build identifier.
    #[error("Unknown build identifier: {0}")]
    UnknownBuild(String),

    /// A worker reported a failure.
    #[error("{0}")]
    Worker(#[from] WorkerError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackflowError {
    /// Returns true if this error is a lock conflict.
    #[must_use]
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::LockConflict(_))
    }

    /// Returns true if this error is an illegal or impossible transition.
    #[must_use]
    pub fn is_transition_violation(&self) -> bool {
        matches!(self, Self::Transition(_))
    }
}

/// Metadata about a definition error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "DFA-002-UNKNOWN-LINK").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        map
    }
}

/// Error raised when a pipeline definition is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DefinitionError {
    /// The error message.
    pub message: String,
    /// The states involved in the error.
    pub states: Vec<String>,
    /// Diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl DefinitionError {
    /// Creates a new definition error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            states: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the states involved.
    #[must_use]
    pub fn with_states(mut self, states: Vec<String>) -> Self {
        self.states = states;
        self
    }

    /// Sets the diagnostic info, filling in the default fix hint for its code.
    #[must_use]
    pub fn with_error_info(mut self, mut info: ErrorInfo) -> Self {
        if info.fix_hint.is_none() {
            info.fix_hint = DefinitionSuggestions::get(&info.code).map(String::from);
        }
        self.error_info = Some(info);
        self
    }

    /// The definition has no group with the requested name.
    #[must_use]
    pub fn unknown_group(group: impl Into<String>) -> Self {
        let group = group.into();
        Self::new(format!("Unknown DFA group '{group}'"))
            .with_error_info(ErrorInfo::new("DFA-001-UNKNOWN-GROUP", "Group is not declared"))
    }

    /// A link, root or predecessor names a state that is not declared.
    #[must_use]
    pub fn unknown_state(referrer: impl Into<String>, state: impl Into<String>) -> Self {
        let referrer = referrer.into();
        let state = state.into();
        Self::new(format!("'{referrer}' references undeclared state '{state}'"))
            .with_states(vec![referrer, state])
            .with_error_info(ErrorInfo::new(
                "DFA-002-UNKNOWN-LINK",
                "Reference to an undeclared state",
            ))
    }

    /// A state is declared in more than one group.
    #[must_use]
    pub fn duplicate_state(state: impl Into<String>) -> Self {
        let state = state.into();
        Self::new(format!("State '{state}' is declared more than once"))
            .with_states(vec![state])
            .with_error_info(ErrorInfo::new("DFA-003-DUPLICATE", "Duplicate state declaration"))
    }

    /// A group's root or auto-trigger state belongs to another group.
    #[must_use]
    pub fn outside_group(group: impl Into<String>, state: impl Into<String>) -> Self {
        let group = group.into();
        let state = state.into();
        Self::new(format!("State '{state}' is not a member of group '{group}'"))
            .with_states(vec![state])
            .with_error_info(
                ErrorInfo::new("DFA-004-OUTSIDE-GROUP", "Group entry is not a member")
                    .with_context_entry("group", group),
            )
    }

    /// A link's target does not list the link's source as a predecessor.
    #[must_use]
    pub fn unlisted_predecessor(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self::new(format!("State '{to}' does not accept transitions from '{from}'"))
            .with_states(vec![from, to])
            .with_error_info(ErrorInfo::new(
                "DFA-005-PREV",
                "Link target does not list its source in prev",
            ))
    }

    /// A terminal state is declared with a lock, a fail link or a handler.
    #[must_use]
    pub fn invalid_terminal(state: impl Into<String>, reason: &str) -> Self {
        let state = state.into();
        Self::new(format!("Terminal state '{state}' {reason}"))
            .with_states(vec![state])
            .with_error_info(ErrorInfo::new("DFA-006-TERMINAL", "Invalid terminal state"))
    }

    /// The definition declares no groups.
    #[must_use]
    pub fn empty() -> Self {
        Self::new("Pipeline definition declares no DFA groups")
            .with_error_info(ErrorInfo::new("DFA-007-EMPTY", "Empty definition"))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("states".to_string(), serde_json::json!(self.states));
        if let Some(ref info) = self.error_info {
            let info_map: serde_json::Map<String, serde_json::Value> =
                info.to_dict().into_iter().collect();
            map.insert("error_info".to_string(), serde_json::Value::Object(info_map));
        }
        map
    }
}

/// Errors raised when a transition cannot be applied.
///
/// The build context is left untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The target state does not list the current state as a predecessor.
    #[error("Illegal transition from '{from}' to '{to}'")]
    IllegalTransition {
        /// The current state.
        from: String,
        /// The requested state.
        to: String,
    },

    /// The current state has no link for the outcome.
    #[error("State '{state}' has no '{outcome}' link")]
    MissingLink {
        /// The current state.
        state: String,
        /// The outcome that was reported.
        outcome: String,
    },

    /// A build was requested without target and the group has no auto-trigger state.
    #[error("Group '{group}' has no auto-trigger state")]
    NoAutoTrigger {
        /// The current group.
        group: String,
    },

    /// The requested group is not declared.
    #[error("Group '{group}' is not declared")]
    UnknownGroup {
        /// The requested group.
        group: String,
    },

    /// The requested state is not declared in the requested group.
    #[error("State '{state}' is not declared in group '{group}'")]
    UnknownState {
        /// The requested group.
        group: String,
        /// The requested state.
        state: String,
    },
}

impl TransitionError {
    /// Creates an illegal transition error.
    #[must_use]
    pub fn illegal(from: impl ToString, to: impl ToString) -> Self {
        Self::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::IllegalTransition { from, to } => {
                map.insert("type".to_string(), serde_json::json!("IllegalTransition"));
                map.insert("from".to_string(), serde_json::json!(from));
                map.insert("to".to_string(), serde_json::json!(to));
            }
            Self::MissingLink { state, outcome } => {
                map.insert("type".to_string(), serde_json::json!("MissingLink"));
                map.insert("state".to_string(), serde_json::json!(state));
                map.insert("outcome".to_string(), serde_json::json!(outcome));
            }
            Self::NoAutoTrigger { group } => {
                map.insert("type".to_string(), serde_json::json!("NoAutoTrigger"));
                map.insert("group".to_string(), serde_json::json!(group));
            }
            Self::UnknownGroup { group } => {
                map.insert("type".to_string(), serde_json::json!("UnknownGroup"));
                map.insert("group".to_string(), serde_json::json!(group));
            }
            Self::UnknownState { group, state } => {
                map.insert("type".to_string(), serde_json::json!("UnknownState"));
                map.insert("group".to_string(), serde_json::json!(group));
                map.insert("state".to_string(), serde_json::json!(state));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error raised when a build is requested while its identifier is locked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Build '{build_id}' is locked in state '{state}'")]
pub struct LockConflictError {
    /// The build identifier.
    pub build_id: String,
    /// The locking state.
    pub state: String,
}

impl LockConflictError {
    /// Creates a new lock conflict error.
    #[must_use]
    pub fn new(build_id: impl Into<String>, state: impl ToString) -> Self {
        Self {
            build_id: build_id.into(),
            state: state.to_string(),
        }
    }
}

/// Errors reported by workers.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker could not be built.
    #[error("Worker '{key}' failed to build: {message}")]
    Build {
        /// The worker key.
        key: String,
        /// The failure description.
        message: String,
    },

    /// An opaque collaborator failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkerError {
    /// Creates a build failure error.
    #[must_use]
    pub fn build(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Build {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The document is not valid JSON for the target type.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The file could not be read.
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        /// The file path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Provides default suggestions for definition error codes.
pub struct DefinitionSuggestions;

impl DefinitionSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "DFA-001-UNKNOWN-GROUP" => Some("Declare the group before targeting it."),
            "DFA-002-UNKNOWN-LINK" => Some(
                "Check next/fail/prev links for typos, or declare the missing state in a group.",
            ),
            "DFA-003-DUPLICATE" => Some("Each state belongs to exactly one group."),
            "DFA-004-OUTSIDE-GROUP" => {
                Some("A group's root and auto-trigger state must be declared in that group.")
            }
            "DFA-005-PREV" => Some(
                "Add the source to the target's prev list, or link to the target's group.",
            ),
            "DFA-006-TERMINAL" => Some(
                "Terminal states complete the build; they cannot lock, fail or run handlers.",
            ),
            "DFA-007-EMPTY" => Some("Add at least one group to the definition."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_creation() {
        let info = ErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this")
            .with_context_entry("state", "building");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this".to_string()));
        assert_eq!(info.context.get("state"), Some(&"building".to_string()));
    }

    #[test]
    fn test_definition_error_fills_suggestion() {
        let err = DefinitionError::unknown_state("consenting", "buidling");
        let info = err.error_info.as_ref().unwrap();

        assert_eq!(info.code, "DFA-002-UNKNOWN-LINK");
        assert!(info.fix_hint.is_some());
        assert_eq!(err.states, vec!["consenting", "buidling"]);
        assert!(err.to_string().contains("buidling"));
    }

    #[test]
    fn test_definition_error_to_dict() {
        let dict = DefinitionError::duplicate_state("complete").to_dict();
        assert_eq!(dict.get("message").unwrap(), "State 'complete' is declared more than once");
        assert!(dict.contains_key("error_info"));
    }

    #[test]
    fn test_transition_error_to_dict() {
        let err = TransitionError::illegal("complete", "building");
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "IllegalTransition");
        assert_eq!(dict.get("from").unwrap(), "complete");
        assert_eq!(dict.get("to").unwrap(), "building");
    }

    #[test]
    fn test_stackflow_error_predicates() {
        let locked: StackflowError = LockConflictError::new("router", "consenting").into();
        assert!(locked.is_lock_conflict());
        assert!(!locked.is_transition_violation());
        assert_eq!(locked.to_string(), "Build 'router' is locked in state 'consenting'");

        let illegal: StackflowError = TransitionError::illegal("a", "b").into();
        assert!(illegal.is_transition_violation());
    }

    #[test]
    fn test_worker_error_wraps_anyhow() {
        let err: WorkerError = anyhow::anyhow!("fetch failed").into();
        assert_eq!(err.to_string(), "fetch failed");

        let err = WorkerError::build("T", "template missing");
        assert!(err.to_string().contains("template missing"));
    }

    #[test]
    fn test_suggestions() {
        assert!(DefinitionSuggestions::get("DFA-005-PREV").is_some());
        assert!(DefinitionSuggestions::get("UNKNOWN").is_none());
    }
}
