//! Event types for the PetBuddy event system
//!
//! Provides shared event definitions and the EventBus used to notify
//! presentation layers about recognition progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Review workflow state for breed recognition
///
/// Initial state is `Idle`; `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Nothing requested yet (or cancelled / dismissed back to start)
    Idle,
    /// Waiting for the user to grant or decline consent
    ConsentPending,
    /// Recognition call in flight
    Running,
    /// Successful result waiting for accept/reject
    ResultReady,
    /// Result written into the record draft
    Accepted,
    /// Result discarded by the user
    Rejected,
    /// Recognition returned a non-fatal failure
    Failed,
}

impl WorkflowState {
    /// Terminal states accept no further events
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Accepted | WorkflowState::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::ConsentPending => "consent_pending",
            WorkflowState::Running => "running",
            WorkflowState::ResultReady => "result_ready",
            WorkflowState::Accepted => "accepted",
            WorkflowState::Rejected => "rejected",
            WorkflowState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PetBuddy event types
///
/// Events are broadcast via EventBus and can be serialized for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PetBuddyEvent {
    /// Review workflow moved between states
    RecognitionStateChanged {
        workflow_id: Uuid,
        old_state: WorkflowState,
        new_state: WorkflowState,
        timestamp: DateTime<Utc>,
    },

    /// A recognition attempt finished and was applied to its workflow
    ///
    /// Completions of cancelled attempts are never emitted.
    RecognitionCompleted {
        workflow_id: Uuid,
        attempt: u64,
        success: bool,
        species: Option<String>,
        breed: Option<String>,
        confidence: f32,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Classifier model became resident
    ModelLoaded {
        model_id: String,
        labels: usize,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for PetBuddyEvent
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PetBuddyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PetBuddyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PetBuddyEvent,
    ) -> Result<usize, broadcast::error::SendError<PetBuddyEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PetBuddyEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowState::Accepted.is_terminal());
        assert!(WorkflowState::Rejected.is_terminal());
        assert!(!WorkflowState::Failed.is_terminal());
        assert!(!WorkflowState::Running.is_terminal());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        let event = PetBuddyEvent::RecognitionStateChanged {
            workflow_id: Uuid::new_v4(),
            old_state: WorkflowState::Idle,
            new_state: WorkflowState::ConsentPending,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.capacity(), 8);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(PetBuddyEvent::ModelLoaded {
            model_id: "test-model".to_string(),
            labels: 3,
            elapsed_ms: 12,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PetBuddyEvent::ModelLoaded { model_id, labels, .. } => {
                assert_eq!(model_id, "test-model");
                assert_eq!(labels, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
