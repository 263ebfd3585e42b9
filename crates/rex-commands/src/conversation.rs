use std::collections::HashMap;
use std::sync::Mutex;

/// A flow that sits idle this long is abandoned on the next message.
pub const FLOW_IDLE_TIMEOUT_SECS: u64 = 600;

/// Outbound campaign channel for draft and send flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignChannel {
    RealBlast,
    Mailchimp,
}

impl CampaignChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignChannel::RealBlast => "realblast",
            CampaignChannel::Mailchimp => "mailchimp",
        }
    }

    /// Channel named in the message; campaign talk without a channel keyword
    /// goes through the CRM blast path.
    pub fn parse(text: &str) -> Self {
        let normalized = text.to_ascii_lowercase();
        if normalized.contains("mailchimp") {
            return CampaignChannel::Mailchimp;
        }
        CampaignChannel::RealBlast
    }

    pub fn target_prompt(&self) -> &'static str {
        match self {
            CampaignChannel::RealBlast => "RealBlast group id",
            CampaignChannel::Mailchimp => "Mailchimp audience id",
        }
    }
}

/// Collected slots for the draft-email flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftEmailSlots {
    pub channel: CampaignChannel,
    pub subject: Option<String>,
    pub target_id: Option<String>,
}

/// Where the send-campaign state machine is between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStage {
    Collecting,
    CodeSent,
    Authorized,
}

/// Collected slots for the send-campaign flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCampaignSlots {
    pub channel: CampaignChannel,
    pub target_id: Option<String>,
    pub content: Option<String>,
    pub stage: CampaignStage,
}

/// One multi-turn flow in progress for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveFlow {
    DraftEmail(DraftEmailSlots),
    SendCampaign(SendCampaignSlots),
}

struct ConversationState {
    flow: ActiveFlow,
    updated_unix: u64,
}

/// Per-user conversation state held by the dispatcher. Flows are taken out
/// for the duration of a turn and put back only if they are still waiting on
/// input, so the lock is never held across an await.
pub struct ConversationRegistry {
    states: Mutex<HashMap<String, ConversationState>>,
    idle_timeout_secs: u64,
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new(FLOW_IDLE_TIMEOUT_SECS)
    }
}

impl ConversationRegistry {
    pub fn new(idle_timeout_secs: u64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            idle_timeout_secs: idle_timeout_secs.max(1),
        }
    }

    fn states(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConversationState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Removes and returns the user's flow when it is still fresh. An idle
    /// flow is dropped silently; the caller dispatches the message as new.
    pub fn take_active(&self, user_id: &str, now_unix: u64) -> Option<ActiveFlow> {
        let state = self.states().remove(user_id)?;
        if now_unix.saturating_sub(state.updated_unix) > self.idle_timeout_secs {
            tracing::debug!(user_id, "conversation flow expired");
            return None;
        }
        Some(state.flow)
    }

    /// Stores (or replaces) the user's active flow.
    pub fn put(&self, user_id: &str, flow: ActiveFlow, now_unix: u64) {
        self.states().insert(
            user_id.to_string(),
            ConversationState {
                flow,
                updated_unix: now_unix,
            },
        );
    }
}
