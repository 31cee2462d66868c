//! Event sink trait and implementations.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, Level};

/// A lifecycle event of one pipeline's persisted state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Event type, one of [`event_types`](super::event_types).
    pub event_type: &'static str,
    /// Pipeline the event belongs to.
    pub pipeline_id: String,
    /// Event-specific payload.
    pub data: serde_json::Value,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(
        event_type: &'static str,
        pipeline_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            pipeline_id: pipeline_id.into(),
            data,
        }
    }
}

/// Receiver of rollback manager events.
///
/// Called synchronously from inside store operations, sometimes while the
/// pipeline lock is held, so implementations must return quickly and never fail.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &Event);
}

/// Discards every event. The manager's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &Event) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`; anything below INFO logs at DEBUG.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &Event) {
        if self.level >= Level::DEBUG {
            debug!(
                event_type = event.event_type,
                pipeline_id = %event.pipeline_id,
                data = %event.data,
                "Event: {}",
                event.event_type
            );
        } else {
            info!(
                event_type = event.event_type,
                pipeline_id = %event.pipeline_id,
                data = %event.data,
                "Event: {}",
                event.event_type
            );
        }
    }
}

/// Keeps every event in memory, for tests and embedding executors.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingEventSink {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Events of one pipeline.
    #[must_use]
    pub fn events_for(&self, pipeline_id: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drops everything collected so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_types;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_logging_sink_accepts_any_level() {
        let event = Event::new(event_types::ROLLBACK_STARTED, "p", serde_json::json!({"operations": 2}));
        LoggingEventSink::debug().emit(&event);
        LoggingEventSink::new(Level::WARN).emit(&event);
        NoOpEventSink.emit(&event);
    }

    #[test]
    fn test_collecting_sink_filters() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&Event::new(event_types::CHECKPOINT_CREATED, "a", serde_json::Value::Null));
        sink.emit(&Event::new(event_types::ROLLBACK_STARTED, "a", serde_json::Value::Null));
        sink.emit(&Event::new(
            event_types::ROLLBACK_COMPLETED,
            "b",
            serde_json::json!({"reverted": 2}),
        ));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("rollback.").len(), 2);
        assert_eq!(sink.events_for("a").len(), 2);
        assert_eq!(sink.events()[2].data["reverted"], 2);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = Event::new(event_types::CHECKPOINTS_CLEANED, "p", serde_json::json!({}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "checkpoint.cleaned");
        assert_eq!(json["pipeline_id"], "p");
    }
}
