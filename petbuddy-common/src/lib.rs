//! # PetBuddy Common Library
//!
//! Shared code for PetBuddy services including:
//! - Error and Result types
//! - Configuration file resolution and TOML helpers
//! - Event types (PetBuddyEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PetBuddyEvent, WorkflowState};
