//! Persisted record types shared across Rex components.

use serde::{Deserialize, Serialize};

/// A registered broker account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub created_at: u64,
}

/// Contacts are unique per `(id, user_id)`; email and phone are optional
/// because provider fetches and OCR extraction frequently return partial
/// records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Deal classification; commercial leases and sales carry different
/// financial fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealType {
    Lease,
    Sale,
}

impl DealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::Lease => "lease",
            DealType::Sale => "sale",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lease" => Some(DealType::Lease),
            "sale" => Some(DealType::Sale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    /// ISO `YYYY-MM-DD`; validated at the boundary, stored verbatim.
    pub close_date: String,
    pub sq_ft: f64,
    pub rent_month: Option<f64>,
    pub sale_price: Option<f64>,
    pub deal_type: DealType,
}

/// Per-user configuration record, lazily created with defaults on first read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub user_id: String,
    pub subject_generator_enabled: bool,
    pub deal_alerts_enabled: bool,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    /// Delivery number for two-factor codes and SMS alerts; absence is a
    /// missing credential, never substituted with a placeholder.
    pub phone_number: Option<String>,
    pub realnex_group_id: Option<String>,
    pub mailchimp_audience_id: Option<String>,
    pub constant_contact_list_id: Option<String>,
    pub apollo_list_id: Option<String>,
    pub seamless_list_id: Option<String>,
    pub zoominfo_list_id: Option<String>,
}

impl SettingsRecord {
    /// Defaults applied when a user record is first read.
    pub fn default_for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            subject_generator_enabled: true,
            deal_alerts_enabled: true,
            email_notifications: false,
            sms_notifications: false,
            phone_number: None,
            realnex_group_id: None,
            mailchimp_audience_id: None,
            constant_contact_list_id: None,
            apollo_list_id: None,
            seamless_list_id: None,
            zoominfo_list_id: None,
        }
    }
}

/// Deal-alert classification; `Any` matches every deal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    LeaseComp,
    SaleComp,
    Any,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LeaseComp => "LeaseComp",
            AlertKind::SaleComp => "SaleComp",
            AlertKind::Any => "Any",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "leasecomp" | "lease" => Some(AlertKind::LeaseComp),
            "salecomp" | "sale" => Some(AlertKind::SaleComp),
            "any" => Some(AlertKind::Any),
            _ => None,
        }
    }

    pub fn matches(&self, deal_type: DealType) -> bool {
        match self {
            AlertKind::LeaseComp => deal_type == DealType::Lease,
            AlertKind::SaleComp => deal_type == DealType::Sale,
            AlertKind::Any => true,
        }
    }
}

/// A standing comp threshold; one row per `(user_id, kind)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealAlertRecord {
    pub user_id: String,
    pub kind: AlertKind,
    pub threshold: f64,
}

/// One detected duplicate event; append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateLogEntry {
    pub id: i64,
    pub user_id: String,
    pub fingerprint: String,
    pub entity_payload: String,
    pub created_at: u64,
}

/// One audited operation; append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub user_id: String,
    pub action: String,
    pub details: String,
    pub created_at: u64,
}

/// One contact health check; append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthHistoryEntry {
    pub id: i64,
    pub user_id: String,
    pub contact_id: String,
    pub email_score: u8,
    pub phone_score: u8,
    pub created_at: u64,
}

/// Which side of a chat turn produced a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Assistant,
}

impl ChatSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(ChatSender::User),
            "assistant" => Some(ChatSender::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub id: i64,
    pub user_id: String,
    pub sender: ChatSender,
    pub message: String,
    pub created_at: u64,
}

/// Campaign send entitlements for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCreditsRecord {
    pub user_id: String,
    pub email_credits: u64,
    pub has_msa: bool,
}

/// Outcome of one send-credit debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditDebit {
    /// The one-time MSA entitlement covered the send.
    Msa,
    /// One metered credit was consumed.
    Metered,
    /// No MSA and zero credits; nothing was debited.
    Insufficient,
}

/// Stored two-factor code for one user; a single live code, overwritten on
/// reissue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorCodeRecord {
    pub user_id: String,
    pub code: String,
    pub expires_at: u64,
}
