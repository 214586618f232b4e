//! Non-blocking event fan-out.
//!
//! Observers subscribe to a broadcast channel with a bounded buffer. A
//! slow or disconnected observer lags and loses the oldest events; the
//! sender never waits. Execution therefore cannot be stalled by anyone
//! watching it.

use tokio::sync::broadcast;
use tracing::trace;

use maestro_core::events::ExecutionEvent;

/// Fan-out of progress events to external observers.
pub struct EventBroadcaster {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given per-observer buffer size.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Never blocks; an event with no observers is dropped.
    pub fn emit(&self, event: ExecutionEvent) {
        trace!(event = event.event_name(), "Broadcasting");
        let _ = self.tx.send(event);
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::types::{PlanId, StepId, Timestamp};
    use tokio::sync::broadcast::error::RecvError;

    fn step_event(plan_id: PlanId) -> ExecutionEvent {
        ExecutionEvent::StepStarted {
            plan_id,
            step_id: StepId::new(),
            tool: "click".to_string(),
            timestamp: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let broadcaster = EventBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let plan_id = PlanId::new();
        broadcaster.emit(step_event(plan_id));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "step-started");
        assert_eq!(event.plan_id(), plan_id);
    }

    #[tokio::test]
    async fn test_emit_without_observers_does_not_fail() {
        let broadcaster = EventBroadcaster::new(8);
        // No subscribers; emit is a silent drop, not an error.
        broadcaster.emit(step_event(PlanId::new()));
        assert_eq!(broadcaster.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_observers_each_get_a_copy() {
        let broadcaster = EventBroadcaster::new(8);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        broadcaster.emit(step_event(PlanId::new()));

        assert_eq!(rx1.recv().await.unwrap().event_name(), "step-started");
        assert_eq!(rx2.recv().await.unwrap().event_name(), "step-started");
    }

    #[tokio::test]
    async fn test_slow_observer_drops_oldest_but_catches_up() {
        let broadcaster = EventBroadcaster::new(2);
        let mut rx = broadcaster.subscribe();

        // Emit more than the buffer can hold while the observer sleeps.
        for _ in 0..5 {
            broadcaster.emit(step_event(PlanId::new()));
        }

        // The observer lagged: oldest events are gone, newest remain.
        match rx.recv().await {
            Err(RecvError::Lagged(missed)) => assert!(missed >= 1),
            other => panic!("expected lag, got {:?}", other),
        }
        assert!(rx.recv().await.is_ok());
    }
}
