//! Routes, navigation requests and the worker-chain diff.

use crate::consent::ConsentDenial;
use crate::stack::Stack;
use serde::{Deserialize, Serialize};

/// A resolved navigation target: a URL and the nested worker chain that
/// renders it, outermost first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// The target URL.
    pub url: String,
    /// Worker keys from the top-level worker down to the deepest child.
    pub chain: Vec<String>,
    /// Parameters handed to every worker built for the route.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Route {
    /// Creates a route without parameters.
    #[must_use]
    pub fn new<I, K>(url: impl Into<String>, chain: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            url: url.into(),
            chain: chain.into_iter().map(Into::into).collect(),
            params: serde_json::Value::Null,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Returns the chain as a stack with the deepest worker on top.
    #[must_use]
    pub fn key_stack(&self) -> Stack<String> {
        self.chain.iter().cloned().collect()
    }
}

/// How a navigation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    /// A new entry; the departing route goes on the back stack.
    #[default]
    Push,
    /// A back pop.
    Back,
    /// A forward pop.
    Forward,
    /// Replaces the current entry without recording it.
    Replace,
    /// Rebuilds the current route without asking for consent.
    Refresh,
}

/// Payload of a routing build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    /// Where to go.
    pub route: Route,
    /// How the navigation was requested.
    pub kind: NavigationKind,
}

/// How a navigation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// The route is now current.
    Navigated {
        /// The new URL.
        url: String,
        /// True if saved state was restored from history.
        restored: bool,
    },
    /// The route was already current; nothing happened.
    Unchanged,
    /// A worker refused to be torn down.
    Denied(ConsentDenial),
    /// A worker failed to build; the build was unwound.
    Failed {
        /// Key of the failing worker.
        worker: String,
        /// The worker's error message.
        error: String,
    },
    /// A newer navigation took over before this one finished.
    Superseded,
    /// The router was busy in a locked state.
    Rejected,
}

/// Where a new chain departs from the inflated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDiff {
    /// First position that is torn down and rebuilt.
    pub index: usize,
    /// True if the top-level worker changes, so nothing is kept.
    pub overhaul: bool,
}

impl ChainDiff {
    /// A diff that rebuilds everything.
    #[must_use]
    pub fn overhaul() -> Self {
        Self {
            index: 0,
            overhaul: true,
        }
    }

    /// Compares the inflated chain with the target chain.
    #[must_use]
    pub fn between(inflated: &[String], target: &[String]) -> Self {
        match (inflated.first(), target.first()) {
            (Some(current), Some(next)) if current == next => {
                let index = inflated
                    .iter()
                    .zip(target)
                    .position(|(current, next)| current != next)
                    .unwrap_or_else(|| inflated.len().min(target.len()));
                Self {
                    index,
                    overhaul: false,
                }
            }
            _ => Self::overhaul(),
        }
    }
}

/// What a navigation from one chain to another will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    /// The diff between the chains.
    pub diff: ChainDiff,
    /// Workers asked for consent, bottom of the stack first.
    pub consent: Vec<String>,
    /// Workers destroyed, in destruction order.
    pub destroy: Vec<String>,
    /// Workers built, in build order.
    pub build: Vec<String>,
}

impl RoutePlan {
    /// Plans a navigation from `inflated` to `target`.
    #[must_use]
    pub fn new(inflated: &[String], target: &[String]) -> Self {
        Self::with_diff(inflated, target, ChainDiff::between(inflated, target))
    }

    /// Plans a navigation with an explicit diff.
    #[must_use]
    pub fn with_diff(inflated: &[String], target: &[String], diff: ChainDiff) -> Self {
        Self {
            diff,
            consent: inflated.to_vec(),
            destroy: inflated.get(diff.index..).unwrap_or_default().to_vec(),
            build: target.get(diff.index..).unwrap_or_default().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn test_deeper_child_keeps_parents() {
        let plan = RoutePlan::new(&keys(&["T", "A"]), &keys(&["T", "A", "B"]));

        assert_eq!(plan.diff, ChainDiff { index: 2, overhaul: false });
        assert_eq!(plan.consent, keys(&["T", "A"]));
        assert!(plan.destroy.is_empty());
        assert_eq!(plan.build, keys(&["B"]));
    }

    #[test]
    fn test_new_top_level_worker_is_overhaul() {
        let plan = RoutePlan::new(&keys(&["T", "A", "B"]), &keys(&["T2"]));

        assert!(plan.diff.overhaul);
        assert_eq!(plan.consent, keys(&["T", "A", "B"]));
        assert_eq!(plan.destroy, keys(&["T", "A", "B"]));
        assert_eq!(plan.build, keys(&["T2"]));
    }

    #[test]
    fn test_sibling_swap() {
        let plan = RoutePlan::new(&keys(&["T", "A", "B"]), &keys(&["T", "C"]));

        assert_eq!(plan.diff.index, 1);
        assert_eq!(plan.destroy, keys(&["A", "B"]));
        assert_eq!(plan.build, keys(&["C"]));
    }

    #[test]
    fn test_shallower_target() {
        let plan = RoutePlan::new(&keys(&["T", "A", "B"]), &keys(&["T", "A"]));

        assert_eq!(plan.diff.index, 2);
        assert_eq!(plan.destroy, keys(&["B"]));
        assert!(plan.build.is_empty());
    }

    #[test]
    fn test_nothing_inflated() {
        let plan = RoutePlan::new(&[], &keys(&["T", "A"]));
        assert!(plan.diff.overhaul);
        assert!(plan.consent.is_empty());
        assert_eq!(plan.build, keys(&["T", "A"]));
    }

    #[test]
    fn test_key_stack_pops_deepest_first() {
        let mut stack = Route::new("/a/b", ["T", "A", "B"]).key_stack();
        assert_eq!(stack.pop().as_deref(), Some("B"));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(NavigationOutcome::Navigated {
            url: "/a".to_string(),
            restored: true,
        })
        .unwrap();
        assert_eq!(json["outcome"], "navigated");
        assert_eq!(json["restored"], true);
    }
}
