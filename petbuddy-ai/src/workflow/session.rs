//! Async driver for one review workflow
//!
//! Recognition runs in a spawned tokio task so the interactive side never
//! blocks. The task reports back over an mpsc channel tagged with its
//! `AttemptId`; the state machine discards anything that is not the current
//! attempt. Cancelling trips the attempt's `CancellationToken` but lets the
//! call run to completion, so a model load already underway still finishes
//! and benefits later attempts.

use super::state_machine::{
    AttemptId, Effect, ReviewWorkflow, StateTransition, WorkflowError, WorkflowEvent,
};
use crate::models::RecordDraft;
use crate::services::RecognitionService;
use crate::types::{RecognitionErrorKind, RecognitionRequest, RecognitionResult};
use chrono::Utc;
use petbuddy_common::{EventBus, PetBuddyEvent, WorkflowState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug)]
struct Completion {
    attempt: AttemptId,
    result: RecognitionResult,
}

#[derive(Debug)]
struct InFlight {
    attempt: AttemptId,
    cancel_token: CancellationToken,
}

/// Review workflow plus the machinery to run recognition in the background
///
/// Methods that may start recognition must be called from within a Tokio
/// runtime.
pub struct ReviewSession {
    workflow: ReviewWorkflow,
    service: RecognitionService,
    event_bus: Option<EventBus>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: Option<InFlight>,
}

impl ReviewSession {
    pub fn new(workflow: ReviewWorkflow, service: RecognitionService) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            workflow,
            service,
            event_bus: None,
            completions_tx,
            completions_rx,
            in_flight: None,
        }
    }

    /// Broadcast transitions and completions
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow.workflow_id()
    }

    pub fn state(&self) -> WorkflowState {
        self.workflow.state()
    }

    pub fn workflow(&self) -> &ReviewWorkflow {
        &self.workflow
    }

    pub fn draft(&self) -> &RecordDraft {
        self.workflow.draft()
    }

    pub fn into_draft(self) -> RecordDraft {
        self.workflow.into_draft()
    }

    pub fn request_recognition(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::RequestRecognition)
    }

    pub fn decline_consent(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::DeclineConsent)
    }

    /// Grant consent and start recognition in the background
    pub fn grant_consent(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::GrantConsent)
    }

    pub fn accept(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::Accept)
    }

    pub fn reject(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::Reject)
    }

    pub fn dismiss(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::Dismiss)
    }

    /// Return to Idle; a result still in flight will be ignored
    pub fn cancel(&mut self) -> Result<WorkflowState, WorkflowError> {
        self.apply(WorkflowEvent::Cancel)
    }

    /// Wait for the in-flight recognition to resolve
    ///
    /// Stale completions from cancelled attempts are drained and discarded.
    pub async fn wait_for_result(&mut self) -> Result<RecognitionResult, WorkflowError> {
        let current = self
            .workflow
            .current_attempt()
            .ok_or(WorkflowError::NoRecognitionInFlight)?;

        loop {
            // Sender half lives in self, so recv only yields None if that changes
            let completion = self
                .completions_rx
                .recv()
                .await
                .ok_or(WorkflowError::NoRecognitionInFlight)?;

            let is_current = completion.attempt == current;
            let result = completion.result.clone();
            self.complete(completion)?;
            if is_current {
                return Ok(result);
            }
        }
    }

    /// Apply whatever completions have already arrived, without waiting
    pub fn poll_completions(&mut self) -> Result<Vec<StateTransition>, WorkflowError> {
        let mut transitions = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            if let Some(transition) = self.complete(completion)? {
                transitions.push(transition);
            }
        }
        Ok(transitions)
    }

    fn complete(&mut self, completion: Completion) -> Result<Option<StateTransition>, WorkflowError> {
        let Completion { attempt, result } = completion;
        let summary = result.clone();

        let step = self
            .workflow
            .handle(WorkflowEvent::RecognitionFinished { attempt, result })?;
        let Some(transition) = step.transition else {
            return Ok(None);
        };

        if self.in_flight.as_ref().is_some_and(|f| f.attempt == attempt) {
            self.in_flight = None;
        }

        info!(
            workflow_id = %self.workflow.workflow_id(),
            attempt = attempt.0,
            success = summary.success,
            "Recognition attempt resolved"
        );
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PetBuddyEvent::RecognitionCompleted {
                workflow_id: self.workflow.workflow_id(),
                attempt: attempt.0,
                success: summary.success,
                species: summary.species.map(|s| s.to_string()),
                breed: summary.breed,
                confidence: summary.confidence,
                error: summary.error,
                timestamp: Utc::now(),
            });
        }
        self.announce(&transition);
        Ok(Some(transition))
    }

    fn apply(&mut self, event: WorkflowEvent) -> Result<WorkflowState, WorkflowError> {
        let step = self.workflow.handle(event).map_err(|e| {
            debug!(workflow_id = %self.workflow.workflow_id(), error = %e, "Workflow event rejected");
            e
        })?;

        if let Some(transition) = &step.transition {
            self.announce(transition);
        }
        match step.effect {
            Some(Effect::StartRecognition { attempt, request }) => self.spawn_recognition(attempt, request),
            Some(Effect::CancelRecognition { attempt }) => self.cancel_in_flight(attempt),
            None => {}
        }
        Ok(self.workflow.state())
    }

    fn spawn_recognition(&mut self, attempt: AttemptId, request: RecognitionRequest) {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let tx = self.completions_tx.clone();
        let service = self.service.clone();
        let workflow_id = self.workflow.workflow_id();

        tokio::spawn(async move {
            // Inner task isolates a panic in the pipeline from the reporting path
            let result = match tokio::spawn(async move { service.recognize_pet(request).await }).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(%workflow_id, attempt = attempt.0, error = %e, "Recognition task failed");
                    RecognitionResult::failed(RecognitionErrorKind::InferenceFailed)
                }
            };

            if token.is_cancelled() {
                debug!(%workflow_id, attempt = attempt.0, "Recognition finished after cancel, dropping result");
                return;
            }
            // Receiver gone means the session was dropped
            let _ = tx.send(Completion { attempt, result });
        });

        debug!(%workflow_id, attempt = attempt.0, "Recognition started");
        self.in_flight = Some(InFlight { attempt, cancel_token });
    }

    fn cancel_in_flight(&mut self, attempt: AttemptId) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel_token.cancel();
            info!(
                workflow_id = %self.workflow.workflow_id(),
                attempt = in_flight.attempt.0,
                "Recognition cancelled"
            );
        } else {
            debug!(workflow_id = %self.workflow.workflow_id(), attempt = attempt.0, "Cancel with nothing in flight");
        }
    }

    fn announce(&self, transition: &StateTransition) {
        debug!(
            workflow_id = %transition.workflow_id,
            from = %transition.old_state,
            to = %transition.new_state,
            "Workflow transition"
        );
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PetBuddyEvent::RecognitionStateChanged {
                workflow_id: transition.workflow_id,
                old_state: transition.old_state,
                new_state: transition.new_state,
                timestamp: transition.transitioned_at,
            });
        }
    }
}

impl std::fmt::Debug for ReviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewSession")
            .field("workflow", &self.workflow)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
