//! SQLite-backed persistence for the Rex assistant.
//!
//! `RexStore` owns one connection to the state database and exposes the
//! keyed tables the rest of the system depends on: users, contacts, deals,
//! provider tokens (with a TTL side cache), per-user settings, append-only
//! audit logs, deal alerts, two-factor codes, webhooks, send credits, and
//! chat history. Every operation is scoped by `user_id`.

mod audit;
mod credentials;
mod engagement;
mod records;
mod store;

pub use credentials::TOKEN_CACHE_TTL_SECS;
pub use records::{
    ActivityLogEntry, AlertKind, ChatMessageRecord, ChatSender, ContactRecord, CreditDebit,
    DealAlertRecord, DealRecord, DealType, DuplicateLogEntry, HealthHistoryEntry,
    SendCreditsRecord, SettingsRecord, TwoFactorCodeRecord, UserRecord,
};
pub use store::RexStore;
