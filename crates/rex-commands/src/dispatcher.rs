//! Chat command dispatch: one message in, one reply out.
//!
//! `handle_message` records the user's side of the turn, resumes or abandons
//! any active multi-turn flow, routes fresh messages through the intent
//! table, records the assistant's side, and pings the user's webhook. Flow
//! state never survives an idle gap longer than ten minutes.

use std::sync::Arc;

use anyhow::Result;
use rex_ai::{CompletionClient, CompletionRequest};
use rex_core::current_unix_timestamp;
use rex_notify::{EmailTransport, SmsTransport, WebhookEvent, WebhookNotifier};
use rex_providers::Provider;
use rex_store::{AlertKind, ChatSender, CreditDebit, DealType, RexStore};
use rex_sync::{SyncError, SyncService};
use serde::Serialize;
use serde_json::json;

use crate::conversation::{
    ActiveFlow, CampaignChannel, CampaignStage, ConversationRegistry, DraftEmailSlots,
    SendCampaignSlots,
};
use crate::intent::{classify_intent, Intent};
use crate::phrases::{parse_alert_kind, parse_deal_type, parse_sync_scope, PhraseParsers};
use crate::regression::predict_deal_amount;
use crate::two_factor::{TwoFactorError, TwoFactorGate, TwoFactorOutcome};

pub(crate) const SUPPORT_EMAIL: &str = "support@rexassistant.io";

const INSUFFICIENT_CREDITS_REPLY: &str =
    "You're out of send credits and there's no MSA on file. Top up your credits to send campaigns.";
const DASHBOARD_REPLY: &str =
    "Open the Rex dashboard in your browser for deals, campaigns, and sync history at a glance.";
const IDENTITY_REPLY: &str = "I'm Rex, your commercial real estate assistant. I draft campaigns, \
     sync your CRM, predict deal values, and keep an eye on your deal alerts.";
const FALLBACK_REPLY: &str = "I didn't catch that. I can draft emails, send campaigns, sync CRM \
     data, predict deal values, set deal alerts, or hand you to a human.";

/// One assistant reply: the full answer plus a short line for voice playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub answer: String,
    pub tts: String,
}

impl CommandReply {
    pub fn plain(answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self {
            tts: answer.clone(),
            answer,
        }
    }

    pub fn spoken(answer: impl Into<String>, tts: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            tts: tts.into(),
        }
    }
}

enum SubjectSuggestion {
    Suggested(String),
    Disabled,
    Unavailable,
}

struct Counteroffer {
    amount: f64,
    confidence: u8,
    explanation: String,
}

/// Dependency-injected command dispatcher. Construct once in the CLI and
/// share behind an `Arc`; every handle is either `Arc`ed or internally
/// synchronized.
pub struct CommandService {
    pub(crate) store: Arc<RexStore>,
    pub(crate) completion: Arc<dyn CompletionClient>,
    pub(crate) sync: Arc<SyncService>,
    pub(crate) two_factor: TwoFactorGate,
    pub(crate) sms: Arc<dyn SmsTransport>,
    pub(crate) email: Arc<dyn EmailTransport>,
    pub(crate) webhook: WebhookNotifier,
    pub(crate) conversations: ConversationRegistry,
    pub(crate) parsers: PhraseParsers,
}

impl CommandService {
    pub fn new(
        store: Arc<RexStore>,
        completion: Arc<dyn CompletionClient>,
        sync: Arc<SyncService>,
        sms: Arc<dyn SmsTransport>,
        email: Arc<dyn EmailTransport>,
        webhook: WebhookNotifier,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            two_factor: TwoFactorGate::new(Arc::clone(&store), Arc::clone(&sms)),
            parsers: PhraseParsers::new()?,
            conversations: ConversationRegistry::default(),
            store,
            completion,
            sync,
            sms,
            email,
            webhook,
        })
    }

    /// Handles one chat turn for `user_id` and returns the assistant reply.
    pub async fn handle_message(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(CommandReply::plain(
                "Say something I can act on, like \"sync my contacts\".",
            ));
        }
        let now = current_unix_timestamp();
        self.store
            .append_chat_message(user_id, ChatSender::User, message)?;

        let intent = classify_intent(message);
        let reply = match (self.conversations.take_active(user_id, now), intent) {
            (
                Some(ActiveFlow::DraftEmail(slots)),
                Intent::Fallback | Intent::SuggestSubject | Intent::DraftEmail,
            ) => {
                self.continue_draft_email(user_id, message, slots, intent)
                    .await?
            }
            (Some(ActiveFlow::SendCampaign(slots)), Intent::Fallback | Intent::SendCampaign) => {
                self.continue_send_campaign(user_id, message, slots).await?
            }
            (previous, intent) => {
                if previous.is_some() {
                    tracing::debug!(
                        user_id,
                        intent = intent.as_str(),
                        "abandoning active flow for a new intent"
                    );
                }
                self.dispatch(user_id, message, intent).await?
            }
        };

        self.store
            .append_chat_message(user_id, ChatSender::Assistant, &reply.answer)?;
        self.notify_webhook(user_id, &reply.answer).await;
        Ok(reply)
    }

    async fn dispatch(
        &self,
        user_id: &str,
        message: &str,
        intent: Intent,
    ) -> Result<CommandReply> {
        tracing::debug!(user_id, intent = intent.as_str(), "dispatching command");
        match intent {
            Intent::SuggestSubject => self.handle_suggest_subject(user_id).await,
            Intent::DraftEmail => self.start_draft_email(user_id, message).await,
            Intent::NegotiateDeal => self.handle_negotiate_deal(user_id, message).await,
            Intent::PredictDeal => self.handle_predict_deal(user_id, message).await,
            Intent::NotifyOnThreshold => self.handle_notify_on_threshold(user_id, message),
            Intent::SendCampaign => self.start_send_campaign(user_id, message).await,
            Intent::SyncData => self.handle_sync_data(user_id, message).await,
            Intent::Help => self.handle_help(user_id),
            Intent::Dashboard => Ok(CommandReply::plain(DASHBOARD_REPLY)),
            Intent::Identity => Ok(CommandReply::plain(IDENTITY_REPLY)),
            Intent::Fallback => Ok(CommandReply::plain(FALLBACK_REPLY)),
        }
    }

    async fn handle_suggest_subject(&self, user_id: &str) -> Result<CommandReply> {
        match self.generate_subject(user_id).await? {
            SubjectSuggestion::Suggested(subject) => {
                self.store.log_activity(
                    user_id,
                    "suggest_subject",
                    &json!({ "subject": subject }).to_string(),
                )?;
                Ok(CommandReply::plain(format!("How about: \"{subject}\"")))
            }
            SubjectSuggestion::Disabled => Ok(CommandReply::plain(
                "Subject suggestions are turned off in your settings; provide your own subject.",
            )),
            SubjectSuggestion::Unavailable => Ok(CommandReply::plain(
                "I couldn't come up with a subject just now; provide your own subject.",
            )),
        }
    }

    async fn generate_subject(&self, user_id: &str) -> Result<SubjectSuggestion> {
        let settings = self.store.settings(user_id)?;
        if !settings.subject_generator_enabled {
            return Ok(SubjectSuggestion::Disabled);
        }
        let request = CompletionRequest::from_prompts(
            "You are a commercial real estate marketing assistant.",
            "Suggest one short, compelling subject line for a CRE marketing email. \
             Reply with the subject only.",
        );
        match self.completion.complete(request).await {
            Ok(response) => {
                let subject = response.text.trim().trim_matches('"').to_string();
                if subject.is_empty() {
                    return Ok(SubjectSuggestion::Unavailable);
                }
                Ok(SubjectSuggestion::Suggested(subject))
            }
            Err(error) => {
                tracing::warn!(user_id, error = %error, "subject generation failed");
                Ok(SubjectSuggestion::Unavailable)
            }
        }
    }

    async fn start_draft_email(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let slots = DraftEmailSlots {
            channel: CampaignChannel::parse(message),
            subject: self.parsers.quoted_text(message),
            target_id: self.parsers.target_id(message),
        };
        self.advance_draft_email(user_id, slots).await
    }

    async fn advance_draft_email(
        &self,
        user_id: &str,
        slots: DraftEmailSlots,
    ) -> Result<CommandReply> {
        let now = current_unix_timestamp();
        if slots.subject.is_none() {
            self.conversations
                .put(user_id, ActiveFlow::DraftEmail(slots), now);
            return Ok(CommandReply::plain(
                "What subject line should the campaign use? Say \"suggest a subject\" if you \
                 want one generated.",
            ));
        }
        if slots.target_id.is_none() {
            let prompt = format!(
                "Which {} should this go to? Reply with the id.",
                slots.channel.target_prompt()
            );
            self.conversations
                .put(user_id, ActiveFlow::DraftEmail(slots), now);
            return Ok(CommandReply::plain(prompt));
        }
        self.finish_draft_email(user_id, slots).await
    }

    async fn continue_draft_email(
        &self,
        user_id: &str,
        message: &str,
        mut slots: DraftEmailSlots,
        intent: Intent,
    ) -> Result<CommandReply> {
        if intent == Intent::SuggestSubject {
            return match self.generate_subject(user_id).await? {
                SubjectSuggestion::Suggested(subject) => {
                    slots.subject = Some(subject.clone());
                    if slots.target_id.is_none() {
                        let prompt = format!(
                            "How about: \"{subject}\". Which {} should this go to?",
                            slots.channel.target_prompt()
                        );
                        self.conversations.put(
                            user_id,
                            ActiveFlow::DraftEmail(slots),
                            current_unix_timestamp(),
                        );
                        Ok(CommandReply::plain(prompt))
                    } else {
                        self.finish_draft_email(user_id, slots).await
                    }
                }
                SubjectSuggestion::Disabled => {
                    self.conversations.put(
                        user_id,
                        ActiveFlow::DraftEmail(slots),
                        current_unix_timestamp(),
                    );
                    Ok(CommandReply::plain(
                        "Subject suggestions are turned off in your settings; provide your own \
                         subject.",
                    ))
                }
                SubjectSuggestion::Unavailable => {
                    self.conversations.put(
                        user_id,
                        ActiveFlow::DraftEmail(slots),
                        current_unix_timestamp(),
                    );
                    Ok(CommandReply::plain(
                        "I couldn't come up with a subject just now; provide your own subject.",
                    ))
                }
            };
        }
        if intent == Intent::DraftEmail {
            // Restated request; re-harvest the inline slots and reprompt.
            return self.start_draft_email(user_id, message).await;
        }
        if slots.subject.is_none() {
            let subject = self
                .parsers
                .quoted_text(message)
                .unwrap_or_else(|| message.to_string());
            slots.subject = Some(subject);
            return self.advance_draft_email(user_id, slots).await;
        }
        if slots.target_id.is_none() {
            if message.to_ascii_lowercase().contains("mailchimp") {
                slots.channel = CampaignChannel::Mailchimp;
            }
            match self
                .parsers
                .target_id(message)
                .or_else(|| single_token(message))
            {
                Some(id) => {
                    slots.target_id = Some(id);
                    return self.advance_draft_email(user_id, slots).await;
                }
                None => {
                    let prompt = format!(
                        "I still need a {}; reply with just the id.",
                        slots.channel.target_prompt()
                    );
                    self.conversations.put(
                        user_id,
                        ActiveFlow::DraftEmail(slots),
                        current_unix_timestamp(),
                    );
                    return Ok(CommandReply::plain(prompt));
                }
            }
        }
        self.finish_draft_email(user_id, slots).await
    }

    async fn finish_draft_email(
        &self,
        user_id: &str,
        slots: DraftEmailSlots,
    ) -> Result<CommandReply> {
        let subject = slots.subject.clone().unwrap_or_default();
        let target = slots.target_id.clone().unwrap_or_default();
        let request = CompletionRequest::from_prompts(
            "You are a commercial real estate marketing copywriter.",
            format!(
                "Draft a short marketing email for a {} campaign. Subject: \"{subject}\". \
                 Keep it under 150 words and end with a call to action.",
                slots.channel.as_str()
            ),
        );
        match self.completion.complete(request).await {
            Ok(response) => {
                self.store.log_activity(
                    user_id,
                    "draft_email",
                    &json!({ "channel": slots.channel.as_str(), "target_id": target }).to_string(),
                )?;
                let answer = format!(
                    "Here's a draft for \"{subject}\" aimed at {target}:\n\n{}",
                    response.text.trim()
                );
                Ok(CommandReply::spoken(
                    answer,
                    format!("Here's your draft for {subject}."),
                ))
            }
            Err(error) => {
                tracing::warn!(user_id, error = %error, "campaign draft failed");
                Ok(CommandReply::plain(
                    "I couldn't draft the campaign copy just now. Try again in a moment.",
                ))
            }
        }
    }

    async fn handle_negotiate_deal(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let Some(offer) = self.parsers.offer_amount(message) else {
            return Ok(CommandReply::plain(
                "Tell me the offer so I can counter, e.g. \"negotiate a lease of 4200 sq ft \
                 offered at $52,000\".",
            ));
        };
        let deal_type = parse_deal_type(message);
        let sq_ft = self.parsers.square_feet(message);
        let counter = self
            .request_counteroffer(user_id, deal_type, sq_ft, offer)
            .await;
        self.store.log_activity(
            user_id,
            "negotiate_deal",
            &json!({ "offer": offer, "counteroffer": counter.amount }).to_string(),
        )?;
        Ok(CommandReply::plain(format!(
            "Counteroffer: ${:.2} (confidence {}%). {}",
            counter.amount, counter.confidence, counter.explanation
        )))
    }

    async fn request_counteroffer(
        &self,
        user_id: &str,
        deal_type: Option<DealType>,
        sq_ft: Option<f64>,
        offer: f64,
    ) -> Counteroffer {
        let descriptor = match (deal_type, sq_ft) {
            (Some(t), Some(s)) => format!("a {} deal of {s:.0} sq ft", t.as_str()),
            (Some(t), None) => format!("a {} deal", t.as_str()),
            (None, Some(s)) => format!("a deal of {s:.0} sq ft"),
            (None, None) => "a deal".to_string(),
        };
        let request = CompletionRequest::from_prompts(
            "You are a commercial real estate negotiation assistant.",
            format!(
                "The other side offered ${offer:.2} on {descriptor}. Propose a counteroffer. \
                 Reply in exactly this form: Counteroffer: $N / Confidence: P% / Explanation: \
                 one sentence."
            ),
        );
        match self.completion.complete(request).await {
            Ok(response) => match parse_counteroffer(&response.text) {
                Some(counter) => counter,
                None => {
                    tracing::warn!(user_id, "counteroffer reply did not match the expected form");
                    fallback_counteroffer(offer)
                }
            },
            Err(error) => {
                tracing::warn!(user_id, error = %error, "counteroffer request failed");
                fallback_counteroffer(offer)
            }
        }
    }

    async fn handle_predict_deal(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let Some(deal_type) = parse_deal_type(message) else {
            return Ok(CommandReply::plain(
                "Tell me whether to predict a lease or a sale, e.g. \"predict lease value for \
                 4200 sq ft\".",
            ));
        };
        let Some(sq_ft) = self.parsers.square_feet(message) else {
            return Ok(CommandReply::plain(
                "I need the square footage, e.g. \"predict lease value for 4200 sq ft\".",
            ));
        };
        let deals = self.store.list_deals_of_type(user_id, deal_type)?;
        let Some(predicted) = predict_deal_amount(&deals, sq_ft) else {
            return Ok(CommandReply::plain(format!(
                "I need at least two {} deals with square footage on file before I can predict. \
                 Add more history and try again.",
                deal_type.as_str()
            )));
        };
        self.store.log_activity(
            user_id,
            "predict_deal",
            &json!({ "deal_type": deal_type.as_str(), "sq_ft": sq_ft, "predicted": predicted })
                .to_string(),
        )?;
        let fired = self
            .evaluate_deal_alerts(user_id, deal_type, predicted)
            .await?;
        let mut answer = format!(
            "Your {} history puts {sq_ft:.0} sq ft at about ${predicted:.2}.",
            deal_type.as_str()
        );
        if fired > 0 {
            answer.push_str(&format!(
                " That tripped {fired} of your deal alerts; notifications are on the way."
            ));
        }
        Ok(CommandReply::plain(answer))
    }

    fn handle_notify_on_threshold(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let Some(threshold) = self.parsers.threshold_amount(message) else {
            return Ok(CommandReply::plain(
                "Give me a threshold, e.g. \"alert me when a lease goes over $5,000\".",
            ));
        };
        let kind = parse_alert_kind(message);
        self.store.upsert_deal_alert(user_id, kind, threshold)?;
        self.store.log_activity(
            user_id,
            "notify_on_threshold",
            &json!({ "kind": kind.as_str(), "threshold": threshold }).to_string(),
        )?;
        let scope_word = match kind {
            AlertKind::LeaseComp => "lease ",
            AlertKind::SaleComp => "sale ",
            AlertKind::Any => "",
        };
        Ok(CommandReply::plain(format!(
            "Done. I'll flag any {scope_word}deal above ${threshold:.2}."
        )))
    }

    async fn start_send_campaign(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let credits = self.store.send_credits(user_id)?;
        if !credits.has_msa && credits.email_credits == 0 {
            self.store.log_activity(
                user_id,
                "send_campaign_blocked",
                &json!({ "reason": "insufficient_credits" }).to_string(),
            )?;
            return Ok(CommandReply::plain(INSUFFICIENT_CREDITS_REPLY));
        }
        let channel = CampaignChannel::parse(message);
        let settings = self.store.settings(user_id)?;
        let default_target = match channel {
            CampaignChannel::RealBlast => settings.realnex_group_id.clone(),
            CampaignChannel::Mailchimp => settings.mailchimp_audience_id.clone(),
        };
        let slots = SendCampaignSlots {
            channel,
            target_id: self.parsers.target_id(message).or(default_target),
            content: self.parsers.quoted_text(message),
            stage: CampaignStage::Collecting,
        };
        self.advance_send_campaign(user_id, slots).await
    }

    async fn advance_send_campaign(
        &self,
        user_id: &str,
        mut slots: SendCampaignSlots,
    ) -> Result<CommandReply> {
        let now = current_unix_timestamp();
        if slots.target_id.is_none() {
            let prompt = format!(
                "Which {} should I send to? Reply with the id.",
                slots.channel.target_prompt()
            );
            self.conversations
                .put(user_id, ActiveFlow::SendCampaign(slots), now);
            return Ok(CommandReply::plain(prompt));
        }
        if slots.content.is_none() {
            self.conversations
                .put(user_id, ActiveFlow::SendCampaign(slots), now);
            return Ok(CommandReply::plain(
                "What should the campaign say? Put the copy in quotes.",
            ));
        }
        match self.two_factor.issue(user_id).await {
            Ok(true) => {
                slots.stage = CampaignStage::CodeSent;
                self.conversations
                    .put(user_id, ActiveFlow::SendCampaign(slots), now);
                Ok(CommandReply::plain(
                    "I texted you a 6-digit confirmation code. Reply with it to send the \
                     campaign.",
                ))
            }
            Ok(false) => Ok(CommandReply::plain(
                "I couldn't deliver your confirmation code. Check the phone number in your \
                 settings and try again.",
            )),
            Err(TwoFactorError::MissingPhoneNumber) => Ok(CommandReply::plain(
                "Add a mobile number in your settings first; campaign sends need SMS \
                 confirmation.",
            )),
            Err(TwoFactorError::Store(error)) => Err(error),
        }
    }

    async fn continue_send_campaign(
        &self,
        user_id: &str,
        message: &str,
        mut slots: SendCampaignSlots,
    ) -> Result<CommandReply> {
        match slots.stage {
            CampaignStage::Collecting => {
                if slots.target_id.is_none() {
                    if message.to_ascii_lowercase().contains("mailchimp") {
                        slots.channel = CampaignChannel::Mailchimp;
                    }
                    match self
                        .parsers
                        .target_id(message)
                        .or_else(|| single_token(message))
                    {
                        Some(id) => slots.target_id = Some(id),
                        None => {
                            let prompt = format!(
                                "I still need the {}; reply with just the id.",
                                slots.channel.target_prompt()
                            );
                            self.conversations.put(
                                user_id,
                                ActiveFlow::SendCampaign(slots),
                                current_unix_timestamp(),
                            );
                            return Ok(CommandReply::plain(prompt));
                        }
                    }
                } else if slots.content.is_none() {
                    let content = self
                        .parsers
                        .quoted_text(message)
                        .unwrap_or_else(|| message.to_string());
                    slots.content = Some(content);
                }
                self.advance_send_campaign(user_id, slots).await
            }
            CampaignStage::CodeSent => match self.two_factor.verify(user_id, message)? {
                TwoFactorOutcome::Verified => {
                    slots.stage = CampaignStage::Authorized;
                    self.execute_campaign_send(user_id, slots).await
                }
                TwoFactorOutcome::Invalid => Ok(CommandReply::plain(
                    "That code doesn't match. Start the campaign again to get a fresh one.",
                )),
                TwoFactorOutcome::Expired => Ok(CommandReply::plain(
                    "That code expired. Start the campaign again to get a fresh one.",
                )),
                TwoFactorOutcome::Missing => Ok(CommandReply::plain(
                    "There's no confirmation code outstanding. Start the campaign again.",
                )),
            },
            CampaignStage::Authorized => self.execute_campaign_send(user_id, slots).await,
        }
    }

    async fn execute_campaign_send(
        &self,
        user_id: &str,
        slots: SendCampaignSlots,
    ) -> Result<CommandReply> {
        let target = slots.target_id.clone().unwrap_or_default();
        let content = slots.content.clone().unwrap_or_default();
        let debit_note = match self.store.debit_send_credit(user_id)? {
            CreditDebit::Insufficient => {
                return Ok(CommandReply::plain(INSUFFICIENT_CREDITS_REPLY));
            }
            CreditDebit::Msa => "Your MSA covered this send.".to_string(),
            CreditDebit::Metered => {
                let remaining = self.store.send_credits(user_id)?.email_credits;
                format!("1 send credit used; {remaining} left.")
            }
        };

        let send_error = match slots.channel {
            CampaignChannel::RealBlast => {
                match self.store.token(user_id, Provider::RealNex.as_str())? {
                    Some(token) => self
                        .sync
                        .realnex_adapter()
                        .send_real_blast(&token, &target, &content)
                        .await
                        .err()
                        .map(|e| e.to_string()),
                    None => Some("missing realnex token; save it in settings".to_string()),
                }
            }
            CampaignChannel::Mailchimp => {
                match self.store.token(user_id, Provider::Mailchimp.as_str())? {
                    Some(token) => {
                        let subject = campaign_subject(&content);
                        self.sync
                            .mailchimp_adapter()
                            .send_campaign(&token, &target, &subject, &content)
                            .await
                            .err()
                            .map(|e| e.to_string())
                    }
                    None => Some("missing mailchimp token; save it in settings".to_string()),
                }
            }
        };

        let (action, id_key) = match slots.channel {
            CampaignChannel::RealBlast => ("send_realblast", "group_id"),
            CampaignChannel::Mailchimp => ("send_mailchimp_campaign", "audience_id"),
        };
        match send_error {
            None => {
                self.store.log_activity(
                    user_id,
                    action,
                    &json!({ id_key: target, "status": "sent" }).to_string(),
                )?;
                self.send_confirmations(user_id, &target).await;
                Ok(CommandReply::spoken(
                    format!("Campaign is on its way to {target}. {debit_note}"),
                    "Your campaign is on its way.",
                ))
            }
            Some(error) => {
                tracing::error!(
                    user_id,
                    channel = slots.channel.as_str(),
                    error = %error,
                    "campaign send failed"
                );
                self.store.log_activity(
                    user_id,
                    action,
                    &json!({ id_key: target, "status": "failed", "error": error }).to_string(),
                )?;
                Ok(CommandReply::plain(format!(
                    "The {} send failed: {error}",
                    slots.channel.as_str()
                )))
            }
        }
    }

    async fn send_confirmations(&self, user_id: &str, target: &str) {
        let settings = match self.store.settings(user_id) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(user_id, error = %error, "settings lookup for confirmations failed");
                return;
            }
        };
        let body = format!("Your Rex campaign to {target} was sent.");
        if settings.sms_notifications {
            if let Some(phone) = settings.phone_number.as_deref() {
                if let Err(error) = self.sms.send_sms(phone, &body).await {
                    tracing::warn!(user_id, error = %error, "campaign sms confirmation failed");
                }
            }
        }
        if settings.email_notifications {
            match self.store.user(user_id) {
                Ok(Some(user)) => {
                    if let Err(error) = self.email.send_email(&user.email, "Campaign sent", &body).await
                    {
                        tracing::warn!(user_id, error = %error, "campaign email confirmation failed");
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(user_id, error = %error, "user lookup for confirmations failed");
                }
            }
        }
    }

    async fn handle_sync_data(&self, user_id: &str, message: &str) -> Result<CommandReply> {
        let scope = parse_sync_scope(message);
        self.store.log_activity(
            user_id,
            "sync_requested",
            &json!({ "scope": scope.as_str() }).to_string(),
        )?;
        match self.sync.sync(user_id, scope).await {
            Ok(report) => Ok(CommandReply::spoken(
                report.summary(),
                format!("Sync finished for {scope}."),
            )),
            Err(SyncError::MissingCredential { what }) => Ok(CommandReply::plain(format!(
                "I can't sync yet: {what} is missing. Save it in settings and try again."
            ))),
            Err(error @ SyncError::CrmPush { .. }) => Ok(CommandReply::plain(format!(
                "Sync stopped early: {error}."
            ))),
            Err(error) => {
                tracing::error!(user_id, error = %error, "sync command failed");
                Ok(CommandReply::plain(
                    "Sync failed unexpectedly. Try again shortly.",
                ))
            }
        }
    }

    fn handle_help(&self, user_id: &str) -> Result<CommandReply> {
        self.store.log_activity(user_id, "escalate_to_human", "{}")?;
        Ok(CommandReply::plain(format!(
            "I've flagged this for a human teammate. You can also reach us directly at \
             {SUPPORT_EMAIL}."
        )))
    }

    async fn notify_webhook(&self, user_id: &str, answer: &str) {
        let url = match self.store.webhook_url(user_id) {
            Ok(Some(url)) => url,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(user_id, error = %error, "webhook lookup failed");
                return;
            }
        };
        let event = WebhookEvent {
            event: "assistant_reply".to_string(),
            user_id: user_id.to_string(),
            occurred_unix: current_unix_timestamp(),
            detail: json!({ "answer": answer }),
        };
        if let Err(error) = self.webhook.notify(&url, &event).await {
            tracing::warn!(user_id, error = %error, "assistant reply webhook failed");
        }
    }
}

/// Mailchimp requires a subject line; the first line of the copy stands in.
fn campaign_subject(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let subject: String = first_line.chars().take(78).collect();
    if subject.is_empty() {
        return "Update from your broker".to_string();
    }
    subject
}

fn single_token(message: &str) -> Option<String> {
    let trimmed = message.trim().trim_end_matches(|c| c == '.' || c == '!');
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return None;
    }
    Some(trimmed.to_string())
}

fn fallback_counteroffer(offer: f64) -> Counteroffer {
    Counteroffer {
        amount: offer * 1.1,
        confidence: 75,
        explanation: "Based on comparable activity, a ten percent uplift is a defensible \
             starting position."
            .to_string(),
    }
}

fn parse_counteroffer(text: &str) -> Option<Counteroffer> {
    let amount = parse_leading_amount(section_before_slash(text, "Counteroffer:")?)?;
    let confidence_digits: String = section_before_slash(text, "Confidence:")?
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let confidence: u8 = confidence_digits.parse().ok()?;
    let explanation_start = text.find("Explanation:")? + "Explanation:".len();
    let explanation = text[explanation_start..].trim().to_string();
    if explanation.is_empty() {
        return None;
    }
    Some(Counteroffer {
        amount,
        confidence: confidence.min(100),
        explanation,
    })
}

fn section_before_slash<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find('/').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn parse_leading_amount(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_start_matches('$').trim_start();
    let digits: String = cleaned
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let digits = digits.replace(',', "");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
