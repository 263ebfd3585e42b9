//! Sync orchestration for the Rex assistant.
//!
//! Home of the multi-provider sync pipeline, the contact health validators
//! it scores with, and the OCR-text contact parser that feeds its
//! single-entity path.

mod health;
mod ocr_ingest;
mod orchestrator;
mod scope;

pub use health::{score_email, score_phone};
pub use ocr_ingest::{ContactTextParser, ParsedContact, UNKNOWN_CONTACT_NAME};
pub use orchestrator::{
    Disposition, EntityOutcome, ProviderFailure, SyncAdapters, SyncError, SyncReport, SyncService,
};
pub use scope::SyncScope;
