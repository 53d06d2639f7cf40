//! # Event Bus System
//!
//! Bridges native SDK callbacks to the core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The native sleep SDK reports everything asynchronously: session creation,
//! periodic uploads, interruptions, setup progress, user membership and
//! analysis results. Host adapters translate each named native callback into
//! a [`SleepEvent`] variant and publish it on the [`EventBus`]; the session
//! layer (and any interested application code) subscribes independently.
//!
//! The event type is a closed sum over the SDK's callback names, so handling
//! (or forgetting) an event is a compile-time-checked property of the
//! dispatcher, not a string-keyed lookup.
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │ Android/iOS  ├────────────>│           │   subscribe   ┌───────────────────┐
//! │ SDK adapter  │             │ EventBus  ├──────────────>│ ListenerRegistrar │
//! └──────────────┘             │(broadcast)│               └───────────────────┘
//!                              │           │   subscribe   ┌───────────────────┐
//!                              │           ├──────────────>│ Application code  │
//!                              └───────────┘               └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, SleepEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(SleepEvent::TrackingCreated {
//!     session_id: Some("session-1".to_string()),
//! })
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.name(), "onTrackingCreated");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `tokio::sync::broadcast` produces two receiver errors:
//!
//! - `RecvError::Lagged(n)`: the subscriber missed `n` events. Non-fatal;
//!   the subscriber keeps receiving new events. State reconciliation is
//!   last-writer-wins, so a lagged listener converges on the next event.
//! - `RecvError::Closed`: all senders dropped. Treated as shutdown.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Upload events arrive roughly once a minute during tracking; this is
/// generous even with debug-log events interleaved.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Type
// ============================================================================

/// Every event the native sleep SDK can emit, with its exact payload shape.
///
/// Variant names and [`name()`](SleepEvent::name) strings correspond 1:1 to
/// the native callback names so adapter code and SDK documentation line up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum SleepEvent {
    /// A user joined (or rejoined) during config initialization.
    UserJoined { user_id: String },
    /// Joining a user failed.
    UserJoinFailed { error: String },
    /// The user and their data were deleted.
    UserDeleted { user_id: String },
    /// A tracking session was created natively. The Android SDK attaches the
    /// session id here; iOS announces it only on close.
    TrackingCreated { session_id: Option<String> },
    /// A periodic audio-chunk upload completed. `sequence` counts uploads
    /// from the session start.
    TrackingUploaded { sequence: u32 },
    /// The tracking session ended and was finalized.
    TrackingClosed { session_id: String },
    /// Tracking aborted with a native error.
    TrackingFailed { error: String },
    /// Tracking paused transiently (e.g. call audio focus loss).
    TrackingInterrupted,
    /// A transient interruption ended.
    TrackingResumed,
    /// The microphone permission was denied at the native layer.
    MicPermissionDenied,
    /// Setup (model download) progress, 0-100.
    SetupInProgress { progress: u8 },
    /// Setup finished successfully.
    SetupDidComplete,
    /// Setup failed.
    SetupDidFail { error: String },
    /// An on-device analysis pass produced a session-shaped payload. Raw and
    /// unnormalized; the session layer normalizes and types it.
    AnalysisResult { payload: Value },
    /// Free-form diagnostic line from the native layer.
    DebugLog { message: String },
}

impl SleepEvent {
    /// The native callback name this event was translated from.
    pub fn name(&self) -> &'static str {
        match self {
            SleepEvent::UserJoined { .. } => "onUserJoined",
            SleepEvent::UserJoinFailed { .. } => "onUserJoinFailed",
            SleepEvent::UserDeleted { .. } => "onUserDeleted",
            SleepEvent::TrackingCreated { .. } => "onTrackingCreated",
            SleepEvent::TrackingUploaded { .. } => "onTrackingUploaded",
            SleepEvent::TrackingClosed { .. } => "onTrackingClosed",
            SleepEvent::TrackingFailed { .. } => "onTrackingFailed",
            SleepEvent::TrackingInterrupted => "onTrackingInterrupted",
            SleepEvent::TrackingResumed => "onTrackingResumed",
            SleepEvent::MicPermissionDenied => "onMicPermissionDenied",
            SleepEvent::SetupInProgress { .. } => "onSetupInProgress",
            SleepEvent::SetupDidComplete => "onSetupDidComplete",
            SleepEvent::SetupDidFail { .. } => "onSetupDidFail",
            SleepEvent::AnalysisResult { .. } => "onAnalysisResult",
            SleepEvent::DebugLog { .. } => "onDebugLog",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            SleepEvent::UserJoinFailed { .. }
            | SleepEvent::TrackingFailed { .. }
            | SleepEvent::SetupDidFail { .. } => EventSeverity::Error,
            SleepEvent::TrackingInterrupted | SleepEvent::MicPermissionDenied => {
                EventSeverity::Warning
            }
            SleepEvent::TrackingCreated { .. }
            | SleepEvent::TrackingClosed { .. }
            | SleepEvent::TrackingResumed
            | SleepEvent::SetupDidComplete
            | SleepEvent::UserJoined { .. }
            | SleepEvent::UserDeleted { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to [`SleepEvent`]s.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned per subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SleepEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when there are none.
    pub fn emit(&self, event: SleepEvent) -> Result<usize, SendError<SleepEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving all future events.
    pub fn subscribe(&self) -> Receiver<SleepEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&SleepEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// This is the ergonomic subscription surface for application code that only
/// cares about some events, the equivalent of listening to a single named
/// event on the native emitter.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, SleepEvent};
///
/// let bus = EventBus::new(100);
/// let _uploads = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, SleepEvent::TrackingUploaded { .. }));
/// ```
pub struct EventStream {
    receiver: Receiver<SleepEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<SleepEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter; only matching events are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SleepEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Restrict the stream to events whose [`SleepEvent::name`] matches the
    /// given native callback name.
    pub fn for_event(self, name: &'static str) -> Self {
        self.filter(move |event| event.name() == name)
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events, and `RecvError::Closed` once all senders are dropped.
    pub async fn recv(&mut self) -> Result<SleepEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            let Some(filter) = &self.filter else {
                return Ok(event);
            };
            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<SleepEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };
                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_subscription_counts() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(SleepEvent::TrackingResumed).is_err());
    }

    #[tokio::test]
    async fn all_subscribers_receive_the_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = SleepEvent::TrackingClosed {
            session_id: "session-9".to_string(),
        };
        bus.emit(event.clone()).ok();

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn stream_filter_skips_unrelated_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, SleepEvent::TrackingUploaded { .. }));

        bus.emit(SleepEvent::DebugLog {
            message: "noise".to_string(),
        })
        .ok();
        bus.emit(SleepEvent::TrackingUploaded { sequence: 4 }).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received, SleepEvent::TrackingUploaded { sequence: 4 });
    }

    #[tokio::test]
    async fn for_event_filters_by_native_name() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).for_event("onTrackingClosed");

        bus.emit(SleepEvent::TrackingResumed).ok();
        bus.emit(SleepEvent::TrackingClosed {
            session_id: "s".to_string(),
        })
        .ok();

        assert_eq!(stream.recv().await.unwrap().name(), "onTrackingClosed");
    }

    #[tokio::test]
    async fn lagged_subscriber_is_reported() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for sequence in 0..5 {
            bus.emit(SleepEvent::TrackingUploaded { sequence }).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn try_recv_on_empty_stream() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn event_names_match_native_callbacks() {
        assert_eq!(
            SleepEvent::TrackingCreated { session_id: None }.name(),
            "onTrackingCreated"
        );
        assert_eq!(SleepEvent::MicPermissionDenied.name(), "onMicPermissionDenied");
        assert_eq!(
            SleepEvent::AnalysisResult {
                payload: Value::Null
            }
            .name(),
            "onAnalysisResult"
        );
    }

    #[test]
    fn failure_events_are_error_severity() {
        let event = SleepEvent::TrackingFailed {
            error: "audio focus lost permanently".to_string(),
        };
        assert_eq!(event.severity(), EventSeverity::Error);
        assert_eq!(SleepEvent::TrackingResumed.severity(), EventSeverity::Info);
    }

    #[test]
    fn events_round_trip_through_serde() {
        let event = SleepEvent::SetupInProgress { progress: 42 };
        let json = serde_json::to_string(&event).unwrap();
        let back: SleepEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
