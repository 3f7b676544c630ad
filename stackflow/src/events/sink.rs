//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Receives build lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Emits an event without blocking.
    ///
    /// The engine calls this from inside transitions, so implementations
    /// must not fail or wait.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// Drops every event. Engines start with this sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// Forwards events to `tracing`, tagged with their build identifier.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    ///
    /// `TRACE` and `DEBUG` log at debug level; every other level logs at info.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log_event(&self, event_type: &str, data: Option<&serde_json::Value>) {
        let build_id = data
            .and_then(|payload| payload.get("build_id"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if self.level >= Level::DEBUG {
            debug!(event = event_type, build_id, payload = ?data, "Engine event");
        } else {
            info!(event = event_type, build_id, payload = ?data, "Engine event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// Keeps every event in memory, for tests and debugging.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns events of exactly the given type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<Option<serde_json::Value>> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("build.started", None).await;
        sink.try_emit("build.completed", Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::new(Level::INFO);
        sink.emit("state.entered", Some(serde_json::json!({"state": "building"}))).await;
        sink.try_emit("build.rejected", None);
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_by_type() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("state.entered", Some(serde_json::json!({"state": "a"}))).await;
        sink.try_emit("state.entered", Some(serde_json::json!({"state": "b"})));
        sink.try_emit("build.completed", None);

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.event_types(),
            vec!["state.entered", "state.entered", "build.completed"]
        );
        assert_eq!(sink.events_of_type("state.entered").len(), 2);

        sink.clear();
        assert!(sink.is_empty());
    }
}
