//! Deal alert evaluation: compares a deal value against the user's saved
//! thresholds and fans out webhook, SMS, and email notifications.

use anyhow::Result;
use rex_core::current_unix_timestamp;
use rex_notify::WebhookEvent;
use rex_store::{DealAlertRecord, DealType};
use serde_json::json;

use crate::dispatcher::CommandService;

impl CommandService {
    /// Evaluates every saved alert against `value` and notifies each match.
    /// Returns how many alerts fired. Called after deal creation and after a
    /// prediction, so a quiet deal book stays quiet.
    pub async fn evaluate_deal_alerts(
        &self,
        user_id: &str,
        deal_type: DealType,
        value: f64,
    ) -> Result<usize> {
        let settings = self.store.settings(user_id)?;
        if !settings.deal_alerts_enabled {
            return Ok(0);
        }
        let alerts = self.store.deal_alerts(user_id)?;
        let webhook_url = self.store.webhook_url(user_id)?;
        let mut fired = 0usize;
        for alert in &alerts {
            if !alert_fires(alert, deal_type, value) {
                continue;
            }
            fired += 1;
            let body = format!(
                "Deal alert: a {} at ${value:.2} crossed your ${:.2} threshold.",
                deal_type.as_str(),
                alert.threshold
            );
            if let Some(url) = webhook_url.as_deref() {
                let event = WebhookEvent {
                    event: "deal_alert".to_string(),
                    user_id: user_id.to_string(),
                    occurred_unix: current_unix_timestamp(),
                    detail: json!({
                        "kind": alert.kind.as_str(),
                        "threshold": alert.threshold,
                        "value": value,
                    }),
                };
                if let Err(error) = self.webhook.notify(url, &event).await {
                    tracing::warn!(user_id, error = %error, "deal alert webhook failed");
                }
            }
            if settings.sms_notifications {
                if let Some(phone) = settings.phone_number.as_deref() {
                    if let Err(error) = self.sms.send_sms(phone, &body).await {
                        tracing::warn!(user_id, error = %error, "deal alert sms failed");
                    }
                }
            }
            if settings.email_notifications {
                if let Some(user) = self.store.user(user_id)? {
                    if let Err(error) =
                        self.email.send_email(&user.email, "Deal alert", &body).await
                    {
                        tracing::warn!(user_id, error = %error, "deal alert email failed");
                    }
                }
            }
            self.store.log_activity(
                user_id,
                "deal_alert_fired",
                &json!({
                    "kind": alert.kind.as_str(),
                    "threshold": alert.threshold,
                    "value": value,
                })
                .to_string(),
            )?;
        }
        Ok(fired)
    }
}

/// An alert fires only strictly above its threshold and only for its kind.
fn alert_fires(alert: &DealAlertRecord, deal_type: DealType, value: f64) -> bool {
    alert.kind.matches(deal_type) && value > alert.threshold
}
