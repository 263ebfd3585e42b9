//! The Rex chat command layer.
//!
//! Turns free-text broker messages into actions: intent classification, the
//! multi-turn draft and send-campaign flows, SMS-code authorization for
//! sends, deal-value prediction and alerting, and the report surfaces the
//! gateway exposes.

mod alerts;
mod conversation;
mod dispatcher;
mod intent;
mod phrases;
mod regression;
mod reports;
mod two_factor;

#[cfg(test)]
pub(crate) mod test_support;

pub use conversation::{CampaignChannel, ConversationRegistry, FLOW_IDLE_TIMEOUT_SECS};
pub use dispatcher::{CommandReply, CommandService};
pub use intent::{classify_intent, Intent};
pub use regression::{fit_line, predict_deal_amount, FittedLine};
pub use two_factor::{
    TwoFactorError, TwoFactorGate, TwoFactorOutcome, TWO_FACTOR_CODE_TTL_SECS,
};
