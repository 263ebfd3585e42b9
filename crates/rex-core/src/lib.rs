//! Foundational low-level utilities shared across Rex crates.
//!
//! Provides Unix-time helpers used by expiry checks and audit timestamps, and
//! the deterministic entity fingerprint used for duplicate detection.

pub mod fingerprint;
pub mod time_utils;

pub use fingerprint::entity_fingerprint;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix};
