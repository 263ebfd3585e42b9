//! End-to-end campaign-send checks across the command layer, two-factor
//! gate, SMS transport, credit ledger, and the RealNex adapter.

use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;
use rex_ai::{
    CompletionClient, CompletionRequest, CompletionResponse, CompletionUsage, RexAiError,
};
use rex_commands::CommandService;
use rex_notify::{
    DisabledEmailTransport, DisabledSmsTransport, HttpSmsTransport, SmsTransport,
    SmsTransportConfig, WebhookNotifier,
};
use rex_providers::{
    ConstantContactAdapter, MailchimpAdapter, Provider, ProviderHttpConfig, RealNexAdapter,
};
use rex_store::RexStore;
use rex_sync::{SyncAdapters, SyncService};
use tempfile::TempDir;

const USER: &str = "user-1";

struct StubCompletion;

#[async_trait]
impl CompletionClient for StubCompletion {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, RexAiError> {
        Ok(CompletionResponse {
            text: "stub copy".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: CompletionUsage::default(),
        })
    }
}

struct CampaignHarness {
    store: Arc<RexStore>,
    service: CommandService,
    crm: MockServer,
    sms: MockServer,
    _tempdir: TempDir,
}

fn campaign_harness(live_sms: bool) -> CampaignHarness {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        RexStore::open(&tempdir.path().join("rex-state.sqlite3")).expect("open store"),
    );
    store.ensure_user(USER, "broker@rexassistant.io").expect("seed user");

    let crm = MockServer::start();
    let sms = MockServer::start();
    let config = |base: String| ProviderHttpConfig::new(base, 5_000);
    let sync = Arc::new(SyncService::new(
        Arc::clone(&store),
        SyncAdapters {
            realnex: RealNexAdapter::new(config(crm.base_url())).expect("realnex adapter"),
            mailchimp: MailchimpAdapter::new(config(crm.base_url())).expect("mailchimp adapter"),
            constant_contact: ConstantContactAdapter::new(config(crm.base_url()))
                .expect("constant contact adapter"),
            enrichment: Vec::new(),
        },
    ));
    let sms_arc: Arc<dyn SmsTransport> = if live_sms {
        Arc::new(
            HttpSmsTransport::new(SmsTransportConfig {
                endpoint: format!("{}/sms", sms.base_url()),
                api_key: "sms-key".to_string(),
                from_number: "+15550009999".to_string(),
                request_timeout_ms: 5_000,
            })
            .expect("sms transport"),
        )
    } else {
        Arc::new(DisabledSmsTransport)
    };
    let service = CommandService::new(
        Arc::clone(&store),
        Arc::new(StubCompletion),
        sync,
        sms_arc,
        Arc::new(DisabledEmailTransport),
        WebhookNotifier::new(2_000).expect("webhook notifier"),
    )
    .expect("command service");
    CampaignHarness {
        store,
        service,
        crm,
        sms,
        _tempdir: tempdir,
    }
}

fn seed_campaign_account(store: &RexStore, credits: u64) {
    store.set_send_credits(USER, credits, false).expect("credits");
    store
        .save_token(USER, Provider::RealNex.as_str(), "rn-jwt")
        .expect("save token");
    let mut settings = store.settings(USER).expect("settings");
    settings.phone_number = Some("+15550001111".to_string());
    store.update_settings(&settings).expect("update settings");
}

#[tokio::test]
async fn integration_campaign_confirms_code_debits_credit_and_sends() {
    let harness = campaign_harness(true);
    seed_campaign_account(&harness.store, 2);
    let code_sms = harness.sms.mock(|when, then| {
        when.method(POST).path("/sms");
        then.status(202).json_body(serde_json::json!({"queued": true}));
    });
    let blast = harness.crm.mock(|when, then| {
        when.method(POST)
            .path("/RealBlasts")
            .json_body_includes(
                serde_json::json!({"group_id": "grp-1", "content": "Open house Friday"})
                    .to_string(),
            );
        then.status(200).json_body(serde_json::json!({"queued": true}));
    });

    let challenge = harness
        .service
        .handle_message(USER, r#"send a realblast to group grp-1 saying "Open house Friday""#)
        .await
        .expect("challenge turn");
    assert!(challenge.answer.contains("confirmation code"));
    code_sms.assert();
    let code = harness
        .store
        .two_factor_code(USER)
        .expect("code lookup")
        .expect("code stored")
        .code;

    let sent = harness
        .service
        .handle_message(USER, &code)
        .await
        .expect("send turn");
    assert!(sent.answer.contains("on its way"));
    assert!(sent.answer.contains("1 left"));
    blast.assert();
    assert_eq!(
        harness
            .store
            .count_activity(USER, "send_realblast")
            .expect("activity count"),
        1
    );
    let credits = harness.store.send_credits(USER).expect("credits");
    assert_eq!(credits.email_credits, 1);
    assert_eq!(
        harness.store.two_factor_code(USER).expect("code lookup"),
        None
    );
}

#[tokio::test]
async fn integration_expired_code_rejects_and_resets_the_flow() {
    let harness = campaign_harness(true);
    seed_campaign_account(&harness.store, 2);
    harness.sms.mock(|when, then| {
        when.method(POST).path("/sms");
        then.status(202).json_body(serde_json::json!({"queued": true}));
    });

    let challenge = harness
        .service
        .handle_message(USER, r#"send a realblast to group grp-1 saying "Open house Friday""#)
        .await
        .expect("challenge turn");
    assert!(challenge.answer.contains("confirmation code"));

    // Force the outstanding code past its deadline.
    harness
        .store
        .store_two_factor_code(USER, "123456", 1)
        .expect("plant expired code");
    let rejected = harness
        .service
        .handle_message(USER, "123456")
        .await
        .expect("expired turn");
    assert!(rejected.answer.contains("expired"));

    // The flow is gone; the same digits now land in the fallback.
    let fallback = harness
        .service
        .handle_message(USER, "123456")
        .await
        .expect("fallback turn");
    assert!(fallback.answer.contains("didn't catch that"));
    assert_eq!(
        harness
            .store
            .count_activity(USER, "send_realblast")
            .expect("activity count"),
        0
    );
}

#[tokio::test]
async fn integration_undeliverable_code_keeps_the_campaign_unsent() {
    let harness = campaign_harness(false);
    seed_campaign_account(&harness.store, 2);

    let reply = harness
        .service
        .handle_message(USER, r#"send a realblast to group grp-1 saying "Open house Friday""#)
        .await
        .expect("challenge turn");
    assert!(reply.answer.contains("couldn't deliver"));
    assert_eq!(
        harness
            .store
            .count_activity(USER, "send_realblast")
            .expect("activity count"),
        0
    );
}

#[tokio::test]
async fn integration_missing_phone_number_blocks_the_challenge() {
    let harness = campaign_harness(true);
    harness.store.set_send_credits(USER, 2, false).expect("credits");
    harness
        .store
        .save_token(USER, Provider::RealNex.as_str(), "rn-jwt")
        .expect("save token");

    let reply = harness
        .service
        .handle_message(USER, r#"send a realblast to group grp-1 saying "Open house Friday""#)
        .await
        .expect("challenge turn");
    assert!(reply.answer.contains("mobile number"));
    assert_eq!(
        harness.store.two_factor_code(USER).expect("code lookup"),
        None
    );
}
