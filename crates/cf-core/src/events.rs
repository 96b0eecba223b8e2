//! Queue event system.
//!
//! The scheduler reports every job and bundle transition on an [`EventBus`].
//! Observers subscribe to a broadcast channel; a short history lets a late
//! observer see what just happened.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{BundleId, JobId};

/// Events kept for [`EventBus::recent_events`].
const HISTORY_LEN: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Job lifecycle -------------------------------------------------------
    JobQueued {
        job_id: JobId,
        file_name: String,
    },
    JobStarted {
        job_id: JobId,
    },
    JobProgress {
        job_id: JobId,
        progress: u8,
    },
    JobCompleted {
        job_id: JobId,
        output_name: String,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },
    JobRetried {
        job_id: JobId,
    },
    JobRemoved {
        job_id: JobId,
    },

    // -- Delivery ------------------------------------------------------------
    BundleDelivered {
        bundle_id: BundleId,
        name: String,
        /// Where the sink actually stored the delivery.
        location: String,
        job_count: usize,
    },
    BundleFailed {
        bundle_id: BundleId,
        name: String,
        error: String,
    },

    // -- Scheduler -----------------------------------------------------------
    QueueIdle,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out of queue events plus a short history for late observers.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    history: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// missing events. The history length is fixed at [`HISTORY_LEN`].
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            history: RwLock::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Record `payload` and fan it out. Never waits for receivers.
    pub fn publish(&self, payload: EventPayload) {
        let event = Event::new(payload);
        {
            let mut history = self.history.write();
            history.push_front(event.clone());
            history.truncate(HISTORY_LEN);
        }
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Up to `n` events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.history.read().iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        bus.publish(EventPayload::JobStarted { job_id });

        let event = rx.try_recv().unwrap();
        assert_matches!(event.payload, EventPayload::JobStarted { job_id: got } if got == job_id);
    }

    #[test]
    fn history_is_bounded() {
        let bus = EventBus::default();
        let job_id = JobId::new();
        for progress in 0..=100u8 {
            bus.publish(EventPayload::JobProgress { job_id, progress });
        }
        bus.publish(EventPayload::QueueIdle);

        let history = bus.recent_events(usize::MAX);
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history[0].payload, EventPayload::QueueIdle);
        // The two oldest progress events fell off.
        assert_matches!(
            history[HISTORY_LEN - 1].payload,
            EventPayload::JobProgress { progress: 2, .. }
        );
    }

    #[test]
    fn publishing_without_subscribers_still_records_history() {
        let bus = EventBus::new(4);
        bus.publish(EventPayload::JobFailed {
            job_id: JobId::new(),
            error: "decode failed".into(),
        });
        assert_eq!(bus.recent_events(10).len(), 1);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = EventPayload::BundleDelivered {
            bundle_id: BundleId::new(),
            name: "Pack-1.zip".into(),
            location: "/tmp/out/Pack-1_1.zip".into(),
            job_count: 10,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "bundle_delivered");
        assert_eq!(json["job_count"], 10);
        assert_eq!(json["location"], "/tmp/out/Pack-1_1.zip");

        let idle = serde_json::to_value(EventPayload::QueueIdle).unwrap();
        assert_eq!(idle["type"], "queue_idle");
    }
}
