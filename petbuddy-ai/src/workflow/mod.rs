//! Human review workflow around recognition
//!
//! `state_machine` is the pure FSM; `session` drives it with a background
//! recognition task and cancellation.

pub mod session;
pub mod state_machine;

pub use session::ReviewSession;
pub use state_machine::{
    AttemptId, Effect, PreconditionFailure, ReviewWorkflow, StateTransition, Step, WorkflowError,
    WorkflowEvent,
};
