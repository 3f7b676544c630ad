//! Panel requests and their outcomes.

use crate::consent::ConsentDenial;
use serde::{Deserialize, Serialize};

/// Payload of a panel build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum PanelRequest {
    /// Builds `key` on top of the open panels.
    Open {
        /// The panel key.
        key: String,
        /// Parameters handed to the panel.
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Closes one panel wherever it sits in the stack.
    Close {
        /// The panel key.
        key: String,
    },
    /// Closes every open panel, topmost first.
    CloseAll,
}

/// How a panel request ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PanelOutcome {
    /// The panel was built and is on top.
    Opened {
        /// The panel key.
        panel: String,
    },
    /// The panel was already open and moved to the top without a rebuild.
    Raised {
        /// The panel key.
        panel: String,
    },
    /// Panels were destroyed, in destruction order.
    Closed {
        /// Keys of the closed panels.
        panels: Vec<String>,
    },
    /// Nothing to do.
    Unchanged,
    /// A panel refused to close.
    Refused(ConsentDenial),
    /// The panel failed to build.
    Failed {
        /// The panel key.
        panel: String,
        /// The panel's error message.
        error: String,
    },
    /// A newer request on the same context took over.
    Superseded,
    /// The context was busy in a locked state.
    Rejected,
}
