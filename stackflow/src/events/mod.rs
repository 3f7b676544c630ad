//! Build lifecycle events.
//!
//! The engine reports what it does to an [`EventSink`] handed to it at
//! construction. There is no process-wide sink: two engines in the same
//! process can report to different sinks.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::BuildGeneration;
use serde_json::{json, Value};

/// Event type names emitted by the engine.
pub mod kinds {
    /// A build acquired its context and entered its first state.
    pub const BUILD_STARTED: &str = "build.started";
    /// A build request hit a locked context.
    pub const BUILD_REJECTED: &str = "build.rejected";
    /// A running build entered a state.
    pub const STATE_ENTERED: &str = "state.entered";
    /// A build reached a terminal state.
    pub const BUILD_COMPLETED: &str = "build.completed";
    /// A build's continuation was dropped because a newer build owns the context.
    pub const BUILD_SUPERSEDED: &str = "build.superseded";
}

/// Builds the common payload attached to every engine event.
pub(crate) fn build_payload(
    build_id: &str,
    generation: Option<BuildGeneration>,
    state: &str,
) -> Value {
    json!({
        "build_id": build_id,
        "generation": generation.map(BuildGeneration::value),
        "state": state,
        "timestamp": crate::utils::iso_timestamp(),
    })
}

/// Adds a field to an event payload built by [`build_payload`].
pub(crate) fn with_field(mut payload: Value, key: &str, value: Value) -> Value {
    if let Value::Object(ref mut map) = payload {
        map.insert(key.to_string(), value);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload_fields() {
        let payload = build_payload("router", Some(BuildGeneration::new(3)), "building");

        assert_eq!(payload["build_id"], "router");
        assert_eq!(payload["generation"], 3);
        assert_eq!(payload["state"], "building");
        assert!(payload["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_with_field() {
        let payload = with_field(build_payload("x", None, "complete"), "duration_ms", json!(1.5));
        assert_eq!(payload["duration_ms"], 1.5);
        assert!(payload["generation"].is_null());
    }
}
