//! petbuddy-ai library interface
//!
//! Species/breed recognition for found-animal reports: image preprocessing,
//! a lazily loaded classifier, a confidence gate, label → species taxonomy,
//! and the consent/review workflow that applies accepted results to a draft
//! record.

pub mod config;
pub mod models;
pub mod services;
pub mod taxonomy;
pub mod types;
pub mod workflow;

pub use crate::config::RecognitionConfig;
pub use crate::models::{RecordCategory, RecordDraft};
pub use crate::services::{ModelLoader, ModelManager, RecognitionService};
pub use crate::taxonomy::{CatalogTaxonomy, Species, SpeciesTaxonomy};
pub use crate::types::{RecognitionErrorKind, RecognitionRequest, RecognitionResult};
pub use crate::workflow::{ReviewSession, ReviewWorkflow, WorkflowError};

pub use petbuddy_common::WorkflowState;
