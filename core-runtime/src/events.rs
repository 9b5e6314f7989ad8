//! # Event Bus System
//!
//! Decoupled progress reporting for the sync engine using `tokio::sync::broadcast`.
//!
//! ```text
//! ┌────────────────┐    emit     ┌───────────┐
//! │ Refresh run    ├────────────>│           │    subscribe   ┌────────────┐
//! └────────────────┘             │ EventBus  ├───────────────>│ Subscriber │
//! ┌────────────────┐    emit     │           │                └────────────┘
//! │ Tracking retry ├────────────>│           │
//! └────────────────┘             └───────────┘
//! ```
//!
//! Emitting never blocks and never fails the emitter: with no subscribers the
//! event is simply dropped. Slow subscribers observe `RecvError::Lagged`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, RefreshEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Refresh(RefreshEvent::Started {
//!         run_id: "run-1".to_string(),
//!         total: 12,
//!         providers: 3,
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Default buffer size for the event bus
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event type carried by the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Metadata refresh run events
    Refresh(RefreshEvent),
    /// Tracker progress delivery events
    Tracking(TrackingEvent),
}

// ============================================================================
// Refresh Events
// ============================================================================

/// Events emitted by a metadata refresh run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RefreshEvent {
    /// Run started.
    Started {
        run_id: String,
        /// Entries in the snapshot being refreshed.
        total: u64,
        /// Number of provider partitions.
        providers: u64,
    },
    /// An entry started or finished.
    Progress {
        run_id: String,
        /// Ids of entries currently being fetched.
        in_flight: Vec<i64>,
        completed: u64,
        total: u64,
    },
    /// A single provider has an unusually long queue for this run.
    LargeProviderQueue {
        run_id: String,
        provider_id: i64,
        entry_count: u64,
    },
    /// Run finished, including cancelled runs.
    Finished {
        run_id: String,
        updated: u64,
        skipped: u64,
        failed: u64,
        cancelled: bool,
    },
}

// ============================================================================
// Tracking Events
// ============================================================================

/// Events emitted while mirroring progress to trackers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum TrackingEvent {
    /// Progress reached the remote tracker.
    Delivered { track_id: i64, progress: f64 },
    /// Push failed; the update is queued for the retry job.
    Deferred { track_id: i64, progress: f64 },
    /// Pending update dropped because its track no longer exists.
    Orphaned { track_id: i64 },
    /// Retry job exceeded its attempt budget.
    GaveUp { run_attempt_count: u32, pending: u64 },
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
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

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::default();
/// let refresh_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Refresh(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by [`recv`](Self::recv).
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> CoreEvent {
        CoreEvent::Refresh(RefreshEvent::Started {
            run_id: "run-1".to_string(),
            total: 12,
            providers: 3,
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(10);
        assert!(bus.emit(started()).is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.emit(started()).unwrap(), 2);
        assert_eq!(first.recv().await.unwrap(), started());
        assert_eq!(second.recv().await.unwrap(), started());
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Tracking(_)));

        bus.emit(started()).unwrap();
        bus.emit(CoreEvent::Tracking(TrackingEvent::Orphaned { track_id: 7 }))
            .unwrap();

        assert_eq!(
            stream.recv().await.unwrap(),
            CoreEvent::Tracking(TrackingEvent::Orphaned { track_id: 7 })
        );
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut subscriber = bus.subscribe();
        for _ in 0..5 {
            bus.emit(started()).unwrap();
        }
        assert!(matches!(
            subscriber.recv().await,
            Err(RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_serialization_is_tagged() {
        let json = serde_json::to_value(CoreEvent::Tracking(TrackingEvent::Delivered {
            track_id: 1,
            progress: 12.0,
        }))
        .unwrap();

        assert_eq!(json["type"], "Tracking");
        assert_eq!(json["payload"]["event"], "Delivered");
        assert_eq!(json["payload"]["track_id"], 1);
    }
}
