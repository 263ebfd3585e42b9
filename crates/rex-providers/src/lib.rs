//! Provider integrations for the Rex assistant.
//!
//! Defines the normalized [`EntityRecord`] model shared across CRM,
//! marketing, and enrichment systems, the [`ProviderAdapter`] trait every
//! integration implements, the six concrete adapters, and the OCR
//! collaborator seam used for document ingestion.

mod adapter;
mod constant_contact;
mod entities;
mod enrichment;
mod mailchimp;
mod ocr;
mod realnex;

pub use adapter::{Provider, ProviderAdapter, ProviderError, ProviderHttpConfig};
pub use constant_contact::{ConstantContactAdapter, DEFAULT_CONSTANT_CONTACT_API_BASE};
pub use entities::{EntityKind, EntityRecord};
pub use enrichment::{
    EnrichmentAdapter, DEFAULT_APOLLO_API_BASE, DEFAULT_SEAMLESS_API_BASE,
    DEFAULT_ZOOMINFO_API_BASE,
};
pub use mailchimp::{api_base_for_key, MailchimpAdapter};
pub use ocr::{DisabledTextExtractor, HttpTextExtractor, OcrError, TextExtractor};
pub use realnex::{contacts_csv, RealNexAdapter, DEFAULT_REALNEX_API_BASE};
