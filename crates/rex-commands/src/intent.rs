//! First-match-wins intent classification over free-text chat messages.
//!
//! The table is an explicit ordered list of `(Intent, matcher)` pairs so
//! precedence is visible in one place and every matcher stays testable in
//! isolation. More specific phrasings sit above more general ones; a subject
//! request that happens to mention a campaign must never fall through to the
//! campaign rules.

use serde::Serialize;

/// Enumerates supported `Intent` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SuggestSubject,
    DraftEmail,
    NegotiateDeal,
    PredictDeal,
    NotifyOnThreshold,
    SendCampaign,
    SyncData,
    Help,
    Dashboard,
    Identity,
    Fallback,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SuggestSubject => "suggest_subject",
            Intent::DraftEmail => "draft_email",
            Intent::NegotiateDeal => "negotiate_deal",
            Intent::PredictDeal => "predict_deal",
            Intent::NotifyOnThreshold => "notify_on_threshold",
            Intent::SendCampaign => "send_campaign",
            Intent::SyncData => "sync_data",
            Intent::Help => "help",
            Intent::Dashboard => "dashboard",
            Intent::Identity => "identity",
            Intent::Fallback => "fallback",
        }
    }
}

type IntentMatcher = fn(&str) -> bool;

/// Ordered rule table; evaluated top to bottom against the lowercased
/// message, first match wins.
pub const INTENT_RULES: &[(Intent, IntentMatcher)] = &[
    (Intent::SuggestSubject, matches_suggest_subject),
    (Intent::DraftEmail, matches_draft_email),
    (Intent::NegotiateDeal, matches_negotiate_deal),
    (Intent::PredictDeal, matches_predict_deal),
    (Intent::NotifyOnThreshold, matches_notify_on_threshold),
    (Intent::SendCampaign, matches_send_campaign),
    (Intent::SyncData, matches_sync_data),
    (Intent::Help, matches_help),
    (Intent::Dashboard, matches_dashboard),
    (Intent::Identity, matches_identity),
];

pub fn classify_intent(message: &str) -> Intent {
    let normalized = message.to_lowercase();
    for (intent, matcher) in INTENT_RULES {
        if matcher(&normalized) {
            return *intent;
        }
    }
    Intent::Fallback
}

pub fn matches_suggest_subject(text: &str) -> bool {
    text.contains("subject") && (text.contains("suggest") || text.contains("idea"))
}

pub fn matches_draft_email(text: &str) -> bool {
    (text.contains("draft") || text.contains("write") || text.contains("compose"))
        && (text.contains("email") || text.contains("campaign") || text.contains("blast"))
}

pub fn matches_negotiate_deal(text: &str) -> bool {
    text.contains("negotiate") || text.contains("counteroffer") || text.contains("counter offer")
}

pub fn matches_predict_deal(text: &str) -> bool {
    text.contains("predict") || text.contains("forecast")
}

pub fn matches_notify_on_threshold(text: &str) -> bool {
    (text.contains("notify") || text.contains("alert")) && (text.contains("over") || text.contains("above"))
}

pub fn matches_send_campaign(text: &str) -> bool {
    text.contains("realblast")
        || text.contains("real blast")
        || (text.contains("send") && (text.contains("campaign") || text.contains("mailchimp")))
}

pub fn matches_sync_data(text: &str) -> bool {
    text.contains("sync")
}

pub fn matches_help(text: &str) -> bool {
    text.contains("help") || text.contains("support") || text.contains("human")
}

pub fn matches_dashboard(text: &str) -> bool {
    text.contains("dashboard")
}

pub fn matches_identity(text: &str) -> bool {
    text.contains("who are you") || text.contains("what are you") || text.contains("your name")
}
