//! Review workflow state machine
//!
//! Idle → ConsentPending → Running → ResultReady → Accepted | Rejected,
//! with Running → Failed → Idle for unsuccessful recognitions and Cancel
//! returning any non-terminal state to Idle.
//!
//! Pure and synchronous: `handle` consumes one event, mutates the workflow,
//! and tells the caller which side effect to run. Recognition itself is driven
//! by [`super::ReviewSession`].

use crate::models::{RecordCategory, RecordDraft};
use crate::taxonomy::Species;
use crate::types::{RecognitionRequest, RecognitionResult};
use chrono::{DateTime, Utc};
use petbuddy_common::WorkflowState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Per-attempt epoch; completions tagged with an older id are stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why recognition cannot be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionFailure {
    #[error("no photo")]
    NoPhoto,
    #[error("only available for found-animal reports")]
    NotFoundReport,
}

/// Workflow errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// Request guard failed; workflow stays Idle
    #[error("{0}")]
    Precondition(PreconditionFailure),

    /// Event not valid in the current state
    #[error("Invalid transition: {event} in state {state}")]
    InvalidTransition {
        state: WorkflowState,
        event: &'static str,
    },

    /// A recognition call is already in flight
    #[error("Recognition already running")]
    AlreadyRunning,

    /// Waited for a result with nothing running
    #[error("No recognition in flight")]
    NoRecognitionInFlight,
}

/// User or system input to the workflow
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RequestRecognition,
    DeclineConsent,
    GrantConsent,
    RecognitionFinished {
        attempt: AttemptId,
        result: RecognitionResult,
    },
    Accept,
    Reject,
    Dismiss,
    Cancel,
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::RequestRecognition => "request_recognition",
            WorkflowEvent::DeclineConsent => "decline_consent",
            WorkflowEvent::GrantConsent => "grant_consent",
            WorkflowEvent::RecognitionFinished { .. } => "recognition_finished",
            WorkflowEvent::Accept => "accept",
            WorkflowEvent::Reject => "reject",
            WorkflowEvent::Dismiss => "dismiss",
            WorkflowEvent::Cancel => "cancel",
        }
    }
}

/// State transition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub workflow_id: Uuid,
    pub old_state: WorkflowState,
    pub new_state: WorkflowState,
    pub transitioned_at: DateTime<Utc>,
}

/// Side effect requested by a transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Run recognition off the interactive path and report back tagged with `attempt`
    StartRecognition {
        attempt: AttemptId,
        request: RecognitionRequest,
    },
    /// Abandon the in-flight call; its result will be discarded
    CancelRecognition { attempt: AttemptId },
}

/// Result of handling one event
#[derive(Debug, Clone, Default)]
pub struct Step {
    /// None when the event was absorbed without a state change (stale completion)
    pub transition: Option<StateTransition>,
    pub effect: Option<Effect>,
}

/// One review workflow over a record draft
#[derive(Debug, Clone)]
pub struct ReviewWorkflow {
    workflow_id: Uuid,
    state: WorkflowState,
    draft: RecordDraft,
    species_filter: Option<Species>,
    current_attempt: Option<AttemptId>,
    next_attempt: u64,
    last_result: Option<RecognitionResult>,
}

impl ReviewWorkflow {
    pub fn new(draft: RecordDraft) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            state: WorkflowState::Idle,
            draft,
            species_filter: None,
            current_attempt: None,
            next_attempt: 1,
            last_result: None,
        }
    }

    /// Restrict accepted results to one species
    pub fn with_species_filter(mut self, species: Species) -> Self {
        self.species_filter = Some(species);
        self
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn draft(&self) -> &RecordDraft {
        &self.draft
    }

    /// Edit the draft (attach a photo, change category) while no recognition
    /// is pending
    pub fn draft_mut(&mut self) -> Option<&mut RecordDraft> {
        matches!(self.state, WorkflowState::Idle).then_some(&mut self.draft)
    }

    pub fn into_draft(self) -> RecordDraft {
        self.draft
    }

    /// Attempt currently in flight (Running only)
    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.current_attempt
    }

    /// Result shown in ResultReady/Failed
    pub fn last_result(&self) -> Option<&RecognitionResult> {
        self.last_result.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Check the request guard without changing state
    pub fn check_preconditions(&self) -> Result<(), PreconditionFailure> {
        if !self.draft.has_photo() {
            return Err(PreconditionFailure::NoPhoto);
        }
        if self.draft.category != RecordCategory::Found {
            return Err(PreconditionFailure::NotFoundReport);
        }
        Ok(())
    }

    /// Apply one event
    pub fn handle(&mut self, event: WorkflowEvent) -> Result<Step, WorkflowError> {
        use WorkflowState::*;

        // Completions may outlive the review; they are dropped, never rejected
        let late_completion = matches!(event, WorkflowEvent::RecognitionFinished { .. });
        if self.state.is_terminal() && !late_completion {
            return Err(self.invalid(&event));
        }

        match (self.state, event) {
            (Idle, WorkflowEvent::RequestRecognition) => {
                self.check_preconditions()
                    .map_err(WorkflowError::Precondition)?;
                Ok(self.step_to(ConsentPending))
            }
            (ConsentPending, WorkflowEvent::DeclineConsent) => Ok(self.step_to(Idle)),
            (ConsentPending, WorkflowEvent::GrantConsent) => {
                let photo = self
                    .draft
                    .photo
                    .clone()
                    .filter(|p| !p.is_empty())
                    .ok_or(WorkflowError::Precondition(PreconditionFailure::NoPhoto))?;
                let attempt = AttemptId(self.next_attempt);
                self.next_attempt += 1;
                self.current_attempt = Some(attempt);
                self.last_result = None;

                let mut step = self.step_to(Running);
                step.effect = Some(Effect::StartRecognition {
                    attempt,
                    request: RecognitionRequest {
                        image: photo,
                        species_filter: self.species_filter,
                    },
                });
                Ok(step)
            }
            (Running, WorkflowEvent::RequestRecognition | WorkflowEvent::GrantConsent) => {
                Err(WorkflowError::AlreadyRunning)
            }
            (Running, WorkflowEvent::RecognitionFinished { attempt, result }) => {
                if self.current_attempt != Some(attempt) {
                    debug!(workflow_id = %self.workflow_id, %attempt, "Discarding stale recognition result");
                    return Ok(Step::default());
                }
                self.current_attempt = None;
                let next = if result.success { ResultReady } else { Failed };
                self.last_result = Some(result);
                Ok(self.step_to(next))
            }
            (_, WorkflowEvent::RecognitionFinished { attempt, .. }) => {
                debug!(workflow_id = %self.workflow_id, %attempt, state = %self.state, "Discarding late recognition result");
                Ok(Step::default())
            }
            (ResultReady, WorkflowEvent::Accept) => {
                let (species, breed, confidence) = match &self.last_result {
                    Some(RecognitionResult {
                        success: true,
                        species: Some(species),
                        breed: Some(breed),
                        confidence,
                        ..
                    }) => (*species, breed.clone(), *confidence),
                    _ => {
                        return Err(WorkflowError::InvalidTransition {
                            state: self.state,
                            event: "accept",
                        })
                    }
                };
                self.draft.apply_recognition(species, &breed, confidence);
                Ok(self.step_to(Accepted))
            }
            (ResultReady, WorkflowEvent::Reject) => Ok(self.step_to(Rejected)),
            (Failed, WorkflowEvent::Dismiss) => {
                self.last_result = None;
                Ok(self.step_to(Idle))
            }
            (_, WorkflowEvent::Cancel) => {
                let in_flight = self.current_attempt.take();
                self.last_result = None;
                let mut step = self.step_to(Idle);
                step.effect = in_flight.map(|attempt| Effect::CancelRecognition { attempt });
                Ok(step)
            }
            (_, event) => Err(self.invalid(&event)),
        }
    }

    fn step_to(&mut self, new_state: WorkflowState) -> Step {
        let transition = StateTransition {
            workflow_id: self.workflow_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        Step {
            transition: Some(transition),
            effect: None,
        }
    }

    fn invalid(&self, event: &WorkflowEvent) -> WorkflowError {
        WorkflowError::InvalidTransition {
            state: self.state,
            event: event.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecognitionErrorKind;

    fn found_with_photo() -> ReviewWorkflow {
        ReviewWorkflow::new(RecordDraft::new(RecordCategory::Found).with_photo(vec![0xFFu8, 0xD8, 0xFF]))
    }

    fn running(workflow: &mut ReviewWorkflow) -> AttemptId {
        workflow.handle(WorkflowEvent::RequestRecognition).unwrap();
        let step = workflow.handle(WorkflowEvent::GrantConsent).unwrap();
        match step.effect {
            Some(Effect::StartRecognition { attempt, .. }) => attempt,
            other => panic!("expected StartRecognition, got {:?}", other),
        }
    }

    fn finish(workflow: &mut ReviewWorkflow, attempt: AttemptId, result: RecognitionResult) -> Step {
        workflow
            .handle(WorkflowEvent::RecognitionFinished { attempt, result })
            .unwrap()
    }

    #[test]
    fn test_request_requires_photo() {
        let mut workflow = ReviewWorkflow::new(RecordDraft::new(RecordCategory::Found));
        let err = workflow.handle(WorkflowEvent::RequestRecognition).unwrap_err();
        assert_eq!(err, WorkflowError::Precondition(PreconditionFailure::NoPhoto));
        assert_eq!(err.to_string(), "no photo");
        assert_eq!(workflow.state(), WorkflowState::Idle);
    }

    #[test]
    fn test_request_rejected_for_missing_report() {
        let mut workflow =
            ReviewWorkflow::new(RecordDraft::new(RecordCategory::Missing).with_photo(vec![1u8]));
        let err = workflow.handle(WorkflowEvent::RequestRecognition).unwrap_err();
        assert_eq!(err.to_string(), "only available for found-animal reports");
        assert_eq!(workflow.state(), WorkflowState::Idle);
    }

    #[test]
    fn test_decline_consent_returns_to_idle() {
        let mut workflow = found_with_photo();
        workflow.handle(WorkflowEvent::RequestRecognition).unwrap();
        let step = workflow.handle(WorkflowEvent::DeclineConsent).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Idle);
        assert!(step.effect.is_none());
    }

    #[test]
    fn test_grant_consent_starts_recognition_with_photo() {
        let mut workflow = found_with_photo().with_species_filter(Species::Dog);
        workflow.handle(WorkflowEvent::RequestRecognition).unwrap();
        let step = workflow.handle(WorkflowEvent::GrantConsent).unwrap();

        assert_eq!(workflow.state(), WorkflowState::Running);
        let transition = step.transition.unwrap();
        assert_eq!(transition.old_state, WorkflowState::ConsentPending);
        assert_eq!(transition.new_state, WorkflowState::Running);
        match step.effect {
            Some(Effect::StartRecognition { attempt, request }) => {
                assert_eq!(attempt, AttemptId(1));
                assert_eq!(&*request.image, &[0xFF, 0xD8, 0xFF]);
                assert_eq!(request.species_filter, Some(Species::Dog));
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_running_rejects_second_request() {
        let mut workflow = found_with_photo();
        running(&mut workflow);
        assert_eq!(
            workflow.handle(WorkflowEvent::RequestRecognition).unwrap_err(),
            WorkflowError::AlreadyRunning
        );
        assert_eq!(
            workflow.handle(WorkflowEvent::GrantConsent).unwrap_err(),
            WorkflowError::AlreadyRunning
        );
        assert_eq!(workflow.state(), WorkflowState::Running);
    }

    #[test]
    fn test_success_then_accept_writes_draft() {
        let mut workflow = found_with_photo();
        let attempt = running(&mut workflow);
        finish(
            &mut workflow,
            attempt,
            RecognitionResult::recognized(Species::Dog, "golden_retriever", 0.83),
        );
        assert_eq!(workflow.state(), WorkflowState::ResultReady);

        workflow.handle(WorkflowEvent::Accept).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Accepted);
        let draft = workflow.draft();
        assert_eq!(draft.species, Some(Species::Dog));
        assert_eq!(draft.breed.as_deref(), Some("golden_retriever"));
        assert!(draft.description.contains("83%"));
    }

    #[test]
    fn test_reject_leaves_draft_untouched() {
        let mut workflow = found_with_photo();
        let attempt = running(&mut workflow);
        finish(
            &mut workflow,
            attempt,
            RecognitionResult::recognized(Species::Cat, "persian", 0.91),
        );
        workflow.handle(WorkflowEvent::Reject).unwrap();

        assert_eq!(workflow.state(), WorkflowState::Rejected);
        assert!(workflow.draft().species.is_none());
        assert!(workflow.draft().breed.is_none());
        assert!(workflow.draft().description.is_empty());
    }

    #[test]
    fn test_failure_then_dismiss() {
        let mut workflow = found_with_photo();
        let attempt = running(&mut workflow);
        finish(
            &mut workflow,
            attempt,
            RecognitionResult::failed(RecognitionErrorKind::ModelUnavailable),
        );
        assert_eq!(workflow.state(), WorkflowState::Failed);
        assert_eq!(
            workflow.last_result().and_then(|r| r.error.as_deref()),
            Some("model unavailable")
        );

        workflow.handle(WorkflowEvent::Dismiss).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Idle);
        assert!(workflow.last_result().is_none());
    }

    #[test]
    fn test_cancel_discards_late_result() {
        let mut workflow = found_with_photo();
        let attempt = running(&mut workflow);

        let step = workflow.handle(WorkflowEvent::Cancel).unwrap();
        assert!(matches!(
            step.effect,
            Some(Effect::CancelRecognition { attempt: a }) if a == attempt
        ));
        assert_eq!(workflow.state(), WorkflowState::Idle);

        let late = finish(
            &mut workflow,
            attempt,
            RecognitionResult::recognized(Species::Dog, "beagle", 0.99),
        );
        assert!(late.transition.is_none());
        assert_eq!(workflow.state(), WorkflowState::Idle);
        assert!(workflow.draft().breed.is_none());
    }

    #[test]
    fn test_stale_attempt_ignored_while_new_attempt_running() {
        let mut workflow = found_with_photo();
        let first = running(&mut workflow);
        workflow.handle(WorkflowEvent::Cancel).unwrap();
        let second = running(&mut workflow);
        assert!(second > first);

        let stale = finish(
            &mut workflow,
            first,
            RecognitionResult::recognized(Species::Dog, "beagle", 0.99),
        );
        assert!(stale.transition.is_none());
        assert_eq!(workflow.state(), WorkflowState::Running);

        finish(
            &mut workflow,
            second,
            RecognitionResult::recognized(Species::Cat, "persian", 0.91),
        );
        assert_eq!(workflow.state(), WorkflowState::ResultReady);
        assert_eq!(
            workflow.last_result().and_then(|r| r.breed.as_deref()),
            Some("persian")
        );
    }

    #[test]
    fn test_cancel_from_each_non_terminal_state() {
        let mut workflow = found_with_photo();
        workflow.handle(WorkflowEvent::Cancel).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Idle);

        workflow.handle(WorkflowEvent::RequestRecognition).unwrap();
        workflow.handle(WorkflowEvent::Cancel).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Idle);

        let attempt = running(&mut workflow);
        finish(
            &mut workflow,
            attempt,
            RecognitionResult::recognized(Species::Dog, "pug", 0.7),
        );
        workflow.handle(WorkflowEvent::Cancel).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Idle);
        assert!(workflow.draft().breed.is_none());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut workflow = found_with_photo();
        let attempt = running(&mut workflow);
        finish(
            &mut workflow,
            attempt,
            RecognitionResult::recognized(Species::Dog, "pug", 0.7),
        );
        workflow.handle(WorkflowEvent::Reject).unwrap();

        for event in [
            WorkflowEvent::Cancel,
            WorkflowEvent::RequestRecognition,
            WorkflowEvent::Accept,
        ] {
            assert!(matches!(
                workflow.handle(event),
                Err(WorkflowError::InvalidTransition { state: WorkflowState::Rejected, .. })
            ));
        }
    }

    #[test]
    fn test_cancelled_attempt_finishing_after_accept_is_ignored() {
        let mut workflow = found_with_photo();
        let first = running(&mut workflow);
        workflow.handle(WorkflowEvent::Cancel).unwrap();
        let second = running(&mut workflow);
        finish(
            &mut workflow,
            second,
            RecognitionResult::recognized(Species::Cat, "persian", 0.91),
        );
        workflow.handle(WorkflowEvent::Accept).unwrap();
        assert_eq!(workflow.state(), WorkflowState::Accepted);

        let late = workflow
            .handle(WorkflowEvent::RecognitionFinished {
                attempt: first,
                result: RecognitionResult::recognized(Species::Dog, "beagle", 0.99),
            })
            .unwrap();

        assert!(late.transition.is_none());
        assert!(late.effect.is_none());
        assert_eq!(workflow.state(), WorkflowState::Accepted);
        assert_eq!(workflow.draft().breed.as_deref(), Some("persian"));
    }

    #[test]
    fn test_out_of_order_events_are_invalid() {
        let mut workflow = found_with_photo();
        for event in [
            WorkflowEvent::GrantConsent,
            WorkflowEvent::Accept,
            WorkflowEvent::Dismiss,
        ] {
            assert!(matches!(
                workflow.handle(event),
                Err(WorkflowError::InvalidTransition { state: WorkflowState::Idle, .. })
            ));
        }
    }

    #[test]
    fn test_draft_editable_only_when_idle() {
        let mut workflow = ReviewWorkflow::new(RecordDraft::new(RecordCategory::Found));
        workflow.draft_mut().unwrap().photo = Some(vec![1u8, 2].into());
        workflow.handle(WorkflowEvent::RequestRecognition).unwrap();
        assert!(workflow.draft_mut().is_none());
    }
}
