//! On-demand summaries: AI market insights over the user's deal book and a
//! plain-text rendering of recent activity.

use anyhow::Result;
use chrono::DateTime;
use rex_ai::CompletionRequest;
use rex_store::{ActivityLogEntry, DealRecord};
use std::fmt::Write as _;

use crate::dispatcher::CommandService;

const INSIGHTS_UNAVAILABLE: &str =
    "Market insights aren't available right now. Try again in a few minutes.";
const NO_DATA_FOR_INSIGHTS: &str =
    "No deals or activity on file yet. Close a deal or run a sync, then ask again.";

impl CommandService {
    /// Two-to-three sentences of analyst commentary over the user's recent
    /// deals and activity. Degrades to a canned line when the model is
    /// unavailable rather than surfacing an error to the chat surface.
    pub async fn market_insights(&self, user_id: &str) -> Result<String> {
        let deals = self.store.list_deals(user_id)?;
        let activity = self.store.recent_activity(user_id, 5)?;
        if deals.is_empty() && activity.is_empty() {
            return Ok(NO_DATA_FOR_INSIGHTS.to_string());
        }
        let data = insight_data(&deals, &activity);
        let request = CompletionRequest::from_prompts(
            "You are a commercial real estate market analyst.",
            format!(
                "Based on this broker's recent deals and account activity, offer two to three \
                 sentences of market insight. Be concrete and avoid hedging.\n\n{data}"
            ),
        );
        match self.completion.complete(request).await {
            Ok(response) => {
                let text = response.text.trim().to_string();
                if text.is_empty() {
                    return Ok(INSIGHTS_UNAVAILABLE.to_string());
                }
                Ok(text)
            }
            Err(error) => {
                tracing::warn!(user_id, error = %error, "market insights request failed");
                Ok(INSIGHTS_UNAVAILABLE.to_string())
            }
        }
    }

    /// Human-readable report of the user's ten most recent account actions.
    pub fn render_activity_report(&self, user_id: &str) -> Result<String> {
        let entries = self.store.recent_activity(user_id, 10)?;
        if entries.is_empty() {
            return Ok("No recorded activity yet.".to_string());
        }
        let mut report = String::from("Your recent activity:\n");
        for entry in &entries {
            let _ = writeln!(
                report,
                "{}  {}  {}",
                format_timestamp(entry.created_at),
                entry.action,
                entry.details
            );
        }
        Ok(report.trim_end().to_string())
    }
}

fn insight_data(deals: &[DealRecord], activity: &[ActivityLogEntry]) -> String {
    let mut data = String::from("Recent deals:\n");
    if deals.is_empty() {
        data.push_str("(none)\n");
    }
    // Listing is oldest close date first; the newest five matter here.
    for deal in deals.iter().rev().take(5) {
        let _ = writeln!(
            data,
            "- {} of {:.0} sq ft for ${:.2}, closed {}",
            deal.deal_type.as_str(),
            deal.sq_ft,
            deal.amount,
            deal.close_date
        );
    }
    data.push_str("Recent activity:\n");
    if activity.is_empty() {
        data.push_str("(none)\n");
    }
    for entry in activity {
        let _ = writeln!(data, "- {} {}", entry.action, entry.details);
    }
    data
}

fn format_timestamp(unix: u64) -> String {
    DateTime::from_timestamp(unix as i64, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{command_harness, ScriptedCompletion, TEST_USER};
    use rex_notify::DisabledSmsTransport;
    use rex_store::DealType;
    use std::sync::Arc;

    #[test]
    fn unit_timestamps_render_as_utc_minutes() {
        assert_eq!(format_timestamp(1_756_000_000), "2025-08-24 01:46 UTC");
    }

    #[tokio::test]
    async fn functional_insights_need_some_data_on_file() {
        let h = command_harness(ScriptedCompletion::failing(), Arc::new(DisabledSmsTransport));
        let insights = h.service.market_insights(TEST_USER).await.expect("insights");
        assert!(insights.contains("No deals or activity"));
    }

    #[tokio::test]
    async fn functional_insights_feed_deals_and_activity_to_the_model() {
        let completion = ScriptedCompletion::with_replies(vec![Ok(
            "Lease velocity is up; hold pricing on the south corridor.".to_string(),
        )]);
        let h = command_harness(completion, Arc::new(DisabledSmsTransport));
        h.store
            .upsert_deal(&rex_store::DealRecord {
                id: "d-1".to_string(),
                user_id: TEST_USER.to_string(),
                amount: 4_500.0,
                close_date: "2026-02-14".to_string(),
                sq_ft: 2_000.0,
                rent_month: Some(375.0),
                sale_price: None,
                deal_type: DealType::Lease,
            })
            .expect("deal");

        let insights = h.service.market_insights(TEST_USER).await.expect("insights");
        assert!(insights.contains("Lease velocity"));
    }

    #[tokio::test]
    async fn functional_insights_degrade_when_the_model_is_down() {
        let h = command_harness(ScriptedCompletion::failing(), Arc::new(DisabledSmsTransport));
        h.store
            .log_activity(TEST_USER, "sync_requested", "{\"scope\":\"contacts\"}")
            .expect("activity");
        let insights = h.service.market_insights(TEST_USER).await.expect("insights");
        assert!(insights.contains("aren't available"));
    }

    #[tokio::test]
    async fn functional_activity_report_lists_newest_first() {
        let h = command_harness(ScriptedCompletion::failing(), Arc::new(DisabledSmsTransport));
        assert_eq!(
            h.service.render_activity_report(TEST_USER).expect("report"),
            "No recorded activity yet."
        );

        h.store
            .log_activity(TEST_USER, "sync_requested", "{\"scope\":\"contacts\"}")
            .expect("first");
        h.store
            .log_activity(TEST_USER, "send_realblast", "{\"group_id\":\"grp-7\"}")
            .expect("second");

        let report = h.service.render_activity_report(TEST_USER).expect("report");
        assert!(report.starts_with("Your recent activity:"));
        let sync_at = report.find("sync_requested").expect("sync line");
        let blast_at = report.find("send_realblast").expect("blast line");
        assert!(blast_at < sync_at);
        assert!(report.contains("UTC"));
    }
}
