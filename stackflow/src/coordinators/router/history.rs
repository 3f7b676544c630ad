//! Bounded back/forward navigation history.

use super::route::{NavigationKind, Route};
use crate::consent::SavedState;
use crate::stack::Stack;
use serde::{Deserialize, Serialize};

/// A route left behind, with the state its workers handed over on consent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The route.
    pub route: Route,
    /// Saved state keyed by worker.
    #[serde(default)]
    pub saved_state: SavedState,
}

impl HistoryEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(route: Route, saved_state: SavedState) -> Self {
        Self { route, saved_state }
    }

    /// Returns the entry's URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.route.url
    }
}

/// Back and forward stacks, each holding at most `limit` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationHistory {
    back: Stack<HistoryEntry>,
    forward: Stack<HistoryEntry>,
    limit: usize,
}

impl NavigationHistory {
    /// Creates empty history.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            back: Stack::new(),
            forward: Stack::new(),
            limit,
        }
    }

    /// Returns the back stack.
    #[must_use]
    pub fn back(&self) -> &Stack<HistoryEntry> {
        &self.back
    }

    /// Returns the forward stack.
    #[must_use]
    pub fn forward(&self) -> &Stack<HistoryEntry> {
        &self.forward
    }

    /// Returns the entry a navigation to `url` restores, if any.
    ///
    /// Only a back or forward pop whose URL equals the top of the matching
    /// stack restores anything.
    #[must_use]
    pub fn restore_for(&self, kind: NavigationKind, url: &str) -> Option<&HistoryEntry> {
        let stack = match kind {
            NavigationKind::Back => &self.back,
            NavigationKind::Forward => &self.forward,
            _ => return None,
        };
        stack.peek().filter(|entry| entry.url() == url)
    }

    /// Records a committed navigation to `url`.
    ///
    /// `departing` is the route that was current before, with the state its
    /// workers saved. Returns true if the arrival popped a matching entry.
    pub fn commit(
        &mut self,
        kind: NavigationKind,
        departing: Option<HistoryEntry>,
        url: &str,
    ) -> bool {
        let matched = self.restore_for(kind, url).is_some();
        match (kind, matched) {
            (NavigationKind::Back, true) => {
                self.back.pop();
                self.record(departing, true);
            }
            (NavigationKind::Forward, true) => {
                self.forward.pop();
                self.record(departing, false);
            }
            (NavigationKind::Replace | NavigationKind::Refresh, _) => {}
            _ => {
                self.forward.clear();
                self.record(departing, false);
            }
        }
        matched
    }

    /// Clears both stacks.
    pub fn clear(&mut self) {
        self.back.clear();
        self.forward.clear();
    }

    fn record(&mut self, entry: Option<HistoryEntry>, onto_forward: bool) {
        let Some(entry) = entry else {
            return;
        };
        let stack = if onto_forward {
            &mut self.forward
        } else {
            &mut self.back
        };
        stack.push(entry);
        stack.retain_newest(self.limit);
    }
}
