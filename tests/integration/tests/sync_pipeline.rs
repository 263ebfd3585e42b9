//! End-to-end sync-pipeline checks across the store, orchestrator, and
//! provider adapters: first pass pushes, re-runs only log duplicates, CRM
//! failures abort, and marketing failures degrade without aborting.

use std::sync::Arc;

use httpmock::prelude::*;
use rex_providers::{
    ConstantContactAdapter, MailchimpAdapter, Provider, ProviderHttpConfig, RealNexAdapter,
};
use rex_store::{ContactRecord, RexStore};
use rex_sync::{Disposition, SyncAdapters, SyncError, SyncScope, SyncService};
use tempfile::TempDir;

const USER: &str = "user-1";

struct SyncHarness {
    store: Arc<RexStore>,
    sync: SyncService,
    crm: MockServer,
    marketing: MockServer,
    _tempdir: TempDir,
}

fn sync_harness() -> SyncHarness {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        RexStore::open(&tempdir.path().join("rex-state.sqlite3")).expect("open store"),
    );
    store.ensure_user(USER, "broker@rexassistant.io").expect("seed user");

    let crm = MockServer::start();
    let marketing = MockServer::start();
    let config = |base: String| ProviderHttpConfig::new(base, 5_000);
    let sync = SyncService::new(
        Arc::clone(&store),
        SyncAdapters {
            realnex: RealNexAdapter::new(config(crm.base_url())).expect("realnex adapter"),
            mailchimp: MailchimpAdapter::new(config(marketing.base_url()))
                .expect("mailchimp adapter"),
            constant_contact: ConstantContactAdapter::new(config(marketing.base_url()))
                .expect("constant contact adapter"),
            enrichment: Vec::new(),
        },
    );
    SyncHarness {
        store,
        sync,
        crm,
        marketing,
        _tempdir: tempdir,
    }
}

fn seed_crm_credentials(store: &RexStore) {
    store
        .save_token(USER, Provider::RealNex.as_str(), "rn-jwt")
        .expect("save token");
    let mut settings = store.settings(USER).expect("settings");
    settings.realnex_group_id = Some("grp-1".to_string());
    store.update_settings(&settings).expect("update settings");
}

fn seed_local_contact(store: &RexStore) {
    store
        .upsert_contact(&ContactRecord {
            id: "c-1".to_string(),
            user_id: USER.to_string(),
            name: "Jane Doe".to_string(),
            email: Some("jane@acmecre.com".to_string()),
            phone: Some("212-555-0100".to_string()),
        })
        .expect("upsert contact");
}

#[tokio::test]
async fn integration_first_pass_pushes_and_rerun_only_logs_duplicates() {
    let harness = sync_harness();
    seed_crm_credentials(&harness.store);
    seed_local_contact(&harness.store);
    let push = harness.crm.mock(|when, then| {
        when.method(POST)
            .path("/contacts")
            .header("authorization", "Bearer rn-jwt")
            .json_body_includes(serde_json::json!({"name": "Jane Doe"}).to_string());
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });

    let first = harness
        .sync
        .sync(USER, SyncScope::Contacts)
        .await
        .expect("first pass");
    assert_eq!(first.candidates, 1);
    assert_eq!(first.crm_pushes, 1);
    assert_eq!(first.duplicates_skipped, 0);
    assert_eq!(first.entities[0].disposition, Disposition::Pushed);
    push.assert();
    assert_eq!(
        harness
            .store
            .count_activity(USER, "sync_realnex_contact")
            .expect("activity count"),
        1
    );
    assert_eq!(harness.store.count_duplicates(USER).expect("dup count"), 0);
    assert_eq!(
        harness.store.recent_health(USER, 10).expect("health").len(),
        1
    );

    let rerun = harness
        .sync
        .sync(USER, SyncScope::Contacts)
        .await
        .expect("rerun");
    assert_eq!(rerun.candidates, 1);
    assert_eq!(rerun.crm_pushes, 0);
    assert_eq!(rerun.duplicates_skipped, 1);
    assert_eq!(rerun.entities[0].disposition, Disposition::Duplicate);
    // Still exactly one upstream write after the second pass.
    push.assert_calls(1);
    assert_eq!(
        harness
            .store
            .count_activity(USER, "sync_realnex_contact")
            .expect("activity count"),
        1
    );
    assert_eq!(harness.store.count_duplicates(USER).expect("dup count"), 1);
}

#[tokio::test]
async fn integration_crm_failure_aborts_and_leaves_the_contact_retryable() {
    let harness = sync_harness();
    seed_crm_credentials(&harness.store);
    seed_local_contact(&harness.store);
    let mut failing = harness.crm.mock(|when, then| {
        when.method(POST).path("/contacts");
        then.status(502).body("upstream maintenance");
    });

    let error = harness
        .sync
        .sync(USER, SyncScope::Contacts)
        .await
        .expect_err("502 aborts the pass");
    match error {
        SyncError::CrmPush { label, .. } => assert_eq!(label, "Jane Doe"),
        other => panic!("expected CrmPush, got {other:?}"),
    }
    assert_eq!(
        harness
            .store
            .count_activity(USER, "sync_realnex_contact")
            .expect("activity count"),
        0
    );
    assert_eq!(harness.store.count_duplicates(USER).expect("dup count"), 0);

    // A recovered CRM picks the same contact up on the next pass.
    failing.delete();
    harness.crm.mock(|when, then| {
        when.method(POST).path("/contacts");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });
    let retry = harness
        .sync
        .sync(USER, SyncScope::Contacts)
        .await
        .expect("retry pass");
    assert_eq!(retry.crm_pushes, 1);
}

#[tokio::test]
async fn integration_marketing_failure_degrades_without_aborting() {
    let harness = sync_harness();
    seed_crm_credentials(&harness.store);
    seed_local_contact(&harness.store);
    harness
        .store
        .save_token(USER, Provider::Mailchimp.as_str(), "mc-key-us1")
        .expect("save mailchimp token");
    let mut settings = harness.store.settings(USER).expect("settings");
    settings.mailchimp_audience_id = Some("aud-1".to_string());
    harness.store.update_settings(&settings).expect("update settings");

    harness.crm.mock(|when, then| {
        when.method(POST).path("/contacts");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });
    let member_push = harness.marketing.mock(|when, then| {
        when.method(POST).path("/lists/aud-1/members");
        then.status(500).body("audience locked");
    });

    let report = harness
        .sync
        .sync(USER, SyncScope::Contacts)
        .await
        .expect("pass completes despite marketing failure");
    member_push.assert();
    assert_eq!(report.crm_pushes, 1);
    assert_eq!(report.marketing_pushes, 0);
    assert_eq!(report.marketing_failures.len(), 1);
    assert_eq!(report.marketing_failures[0].provider, "mailchimp");
    assert!(report.summary().contains("1 marketing pushes failed"));
}

#[tokio::test]
async fn integration_crm_scope_pushes_without_marketing_fan_out() {
    let harness = sync_harness();
    seed_crm_credentials(&harness.store);
    seed_local_contact(&harness.store);
    harness
        .store
        .save_token(USER, Provider::Mailchimp.as_str(), "mc-key-us1")
        .expect("save mailchimp token");
    let mut settings = harness.store.settings(USER).expect("settings");
    settings.mailchimp_audience_id = Some("aud-1".to_string());
    harness.store.update_settings(&settings).expect("update settings");

    harness.crm.mock(|when, then| {
        when.method(POST).path("/contacts");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });
    let member_push = harness.marketing.mock(|when, then| {
        when.method(POST).path("/lists/aud-1/members");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });

    let report = harness
        .sync
        .sync(USER, SyncScope::Crm)
        .await
        .expect("crm pass");
    assert_eq!(report.crm_pushes, 1);
    assert_eq!(report.marketing_pushes, 0);
    member_push.assert_calls(0);
}
