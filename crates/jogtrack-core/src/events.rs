//! Event system for tracking and history notifications.
//!
//! The session controller and the history paginator report what happened as
//! events, so a UI can render from a subscription instead of being called
//! back into.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use jogtrack_types::{
    CompletedSession, LocationErrorKind, PositionSample, StoredSession, TrackingState,
};

/// Events emitted by the session controller.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TrackingEvent {
    /// A session started recording.
    Started { high_accuracy: bool },
    /// The location acquisition state changed.
    StateChanged {
        from: TrackingState,
        to: TrackingState,
    },
    /// A sample was appended to the path.
    Sample {
        sample: PositionSample,
        increment_meters: f64,
        distance_meters: f64,
    },
    /// One second of wall-clock time passed.
    Tick { elapsed_seconds: u64 },
    /// The location provider reported a failure.
    LocationError {
        kind: LocationErrorKind,
        message: String,
        terminal: bool,
    },
    /// The finished session was accepted by the backend.
    Saved { session: CompletedSession },
    /// The backend did not accept the finished session. The session is
    /// handed back so the caller can offer a manual retry.
    SaveFailed {
        session: CompletedSession,
        error: String,
    },
    /// The session was stopped with too few samples and was not saved.
    Discarded { samples: usize },
}

/// Events emitted while loading session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum HistoryEvent {
    /// A non-empty page was appended.
    PageLoaded {
        page: u32,
        sessions: Vec<StoredSession>,
    },
    /// The backend returned an empty page; nothing more will be fetched.
    Exhausted { page: u32 },
    /// Fetching a page failed; the same page is requested on the next trigger.
    FetchFailed { page: u32, error: String },
}

/// Default capacity of event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Broadcasts events to any number of receivers.
///
/// Sending never fails: with no receivers the event is dropped, and slow
/// receivers observe `RecvError::Lagged` rather than blocking the sender.
#[derive(Debug, Clone)]
pub struct EventDispatcher<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventDispatcher<E> {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: E) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_event_serialization() {
        let event = TrackingEvent::Tick { elapsed_seconds: 42 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"tick","elapsed_seconds":42}"#);

        let event = TrackingEvent::LocationError {
            kind: LocationErrorKind::Timeout,
            message: "slow".to_string(),
            terminal: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "location_error");
        assert_eq!(json["kind"], "Timeout");
    }

    #[test]
    fn test_tracking_event_roundtrip() {
        let event = TrackingEvent::StateChanged {
            from: TrackingState::AcquiringHighAccuracy,
            to: TrackingState::Tracking,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: TrackingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_history_event_serialization() {
        let event = HistoryEvent::Exhausted { page: 3 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"exhausted","page":3}"#);
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out() {
        let dispatcher = EventDispatcher::<TrackingEvent>::default();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(TrackingEvent::Discarded { samples: 1 });

        assert_eq!(a.recv().await.unwrap(), TrackingEvent::Discarded { samples: 1 });
        assert_eq!(b.recv().await.unwrap(), TrackingEvent::Discarded { samples: 1 });
    }

    #[test]
    fn test_dispatcher_without_receivers_drops_events() {
        let dispatcher = EventDispatcher::<HistoryEvent>::new(4);
        dispatcher.send(HistoryEvent::Exhausted { page: 1 });
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
