//! Data models shared with the record-creation collaborator

pub mod record_draft;

pub use record_draft::{provenance_note, RecordCategory, RecordDraft};
