//! Full-stack chat checks: an HTTP client talks to the gateway, the gateway
//! dispatches through the command layer, and the command layer calls a real
//! `OpenAiCompletionClient` pointed at a mocked chat-completions endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use rex_ai::{OpenAiCompletionClient, OpenAiCompletionConfig, DEFAULT_COMPLETION_MODEL};
use rex_commands::CommandService;
use rex_gateway::{
    build_gateway_router, GatewayAuthMode, GatewayServices, RexGatewayConfig, RexGatewayState,
};
use rex_notify::{DisabledEmailTransport, DisabledSmsTransport, WebhookNotifier};
use rex_providers::{
    ConstantContactAdapter, DisabledTextExtractor, MailchimpAdapter, ProviderHttpConfig,
    RealNexAdapter, TextExtractor,
};
use rex_store::RexStore;
use rex_sync::{SyncAdapters, SyncService};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

const USER: &str = "user-1";
const GATEWAY_TOKEN: &str = "gw-secret";
const MODEL_KEY: &str = "test-model-key";

struct AssistantStack {
    addr: SocketAddr,
    store: Arc<RexStore>,
    ai: MockServer,
    _providers: MockServer,
    _tempdir: TempDir,
    _server: tokio::task::JoinHandle<()>,
}

/// Boots the whole backend: store, sync adapters, the real OpenAI-compatible
/// completion client aimed at `ai`, and the gateway in token-auth mode.
async fn assistant_stack(max_retries: u32) -> AssistantStack {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        RexStore::open(&tempdir.path().join("rex-state.sqlite3")).expect("open store"),
    );
    store.ensure_user(USER, "broker@rexassistant.io").expect("seed user");

    let ai = MockServer::start();
    let completion = Arc::new(
        OpenAiCompletionClient::new(OpenAiCompletionConfig {
            api_base: ai.base_url(),
            api_key: MODEL_KEY.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            request_timeout_ms: 5_000,
            max_retries,
        })
        .expect("completion client"),
    );

    let providers = MockServer::start();
    let provider_config = |base: String| ProviderHttpConfig::new(base, 5_000);
    let sync = Arc::new(SyncService::new(
        Arc::clone(&store),
        SyncAdapters {
            realnex: RealNexAdapter::new(provider_config(providers.base_url()))
                .expect("realnex adapter"),
            mailchimp: MailchimpAdapter::new(provider_config(providers.base_url()))
                .expect("mailchimp adapter"),
            constant_contact: ConstantContactAdapter::new(provider_config(providers.base_url()))
                .expect("constant contact adapter"),
            enrichment: Vec::new(),
        },
    ));
    let commands = Arc::new(
        CommandService::new(
            Arc::clone(&store),
            completion,
            Arc::clone(&sync),
            Arc::new(DisabledSmsTransport),
            Arc::new(DisabledEmailTransport),
            WebhookNotifier::new(2_000).expect("webhook notifier"),
        )
        .expect("command service"),
    );
    let extractor: Arc<dyn TextExtractor> = Arc::new(DisabledTextExtractor);
    let services = GatewayServices {
        store: Arc::clone(&store),
        commands,
        sync,
        extractor,
        webhook: WebhookNotifier::new(2_000).expect("webhook notifier"),
    };
    let config = RexGatewayConfig {
        bind: "127.0.0.1:0".to_string(),
        auth_mode: GatewayAuthMode::Token,
        auth_token: Some(GATEWAY_TOKEN.to_string()),
        rate_limit_window_seconds: 60,
        rate_limit_max_requests: 1_000,
    };
    let state = Arc::new(RexGatewayState::new(&config, services).expect("gateway state"));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let app = build_gateway_router(state);
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    AssistantStack {
        addr,
        store,
        ai,
        _providers: providers,
        _tempdir: tempdir,
        _server: server,
    }
}

#[tokio::test]
async fn integration_chat_subject_request_round_trips_through_the_model() {
    let stack = assistant_stack(2).await;
    let completions = stack.ai.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("authorization", format!("Bearer {MODEL_KEY}"));
        then.status(200).json_body(serde_json::json!({
            "choices": [{
                "message": { "content": "Spring Market Update" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 42, "completion_tokens": 6, "total_tokens": 48 }
        }));
    });
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/api/chat", stack.addr))
        .bearer_auth(GATEWAY_TOKEN)
        .json(&serde_json::json!({
            "user_id": USER,
            "message": "suggest a subject for my realblast"
        }))
        .send()
        .await
        .expect("chat request");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    let answer = body["answer"].as_str().expect("answer text");
    assert!(answer.contains("How about: \"Spring Market Update\""));
    completions.assert();
    assert_eq!(
        stack
            .store
            .count_activity(USER, "suggest_subject")
            .expect("activity count"),
        1
    );

    // Both sides of the turn are in the transcript, newest first.
    let history = client
        .get(format!("http://{}/api/chat-history/{USER}", stack.addr))
        .bearer_auth(GATEWAY_TOKEN)
        .send()
        .await
        .expect("history request");
    assert_eq!(history.status(), 200);
    let body: Value = history.json().await.expect("json");
    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "assistant");
    assert_eq!(messages[1]["sender"], "user");
    assert_eq!(messages[1]["message"], "suggest a subject for my realblast");
}

#[tokio::test]
async fn integration_unauthenticated_chat_never_reaches_the_model() {
    let stack = assistant_stack(2).await;
    let completions = stack.ai.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(serde_json::json!({
            "choices": [{
                "message": { "content": "unreachable" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2 }
        }));
    });
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/api/chat", stack.addr))
        .json(&serde_json::json!({
            "user_id": USER,
            "message": "suggest a subject for my realblast"
        }))
        .send()
        .await
        .expect("chat request");
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["code"], "unauthorized");
    completions.assert_calls(0);
    assert!(stack
        .store
        .recent_chat_messages(USER, 10)
        .expect("history")
        .is_empty());
}

#[tokio::test]
async fn integration_model_outage_degrades_to_a_canned_reply() {
    let stack = assistant_stack(0).await;
    let completions = stack.ai.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(500).body("upstream outage");
    });
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/api/chat", stack.addr))
        .bearer_auth(GATEWAY_TOKEN)
        .json(&serde_json::json!({
            "user_id": USER,
            "message": "suggest a subject for my realblast"
        }))
        .send()
        .await
        .expect("chat request");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    let answer = body["answer"].as_str().expect("answer text");
    assert!(answer.contains("couldn't come up with a subject"));
    completions.assert();
    assert_eq!(
        stack
            .store
            .count_activity(USER, "suggest_subject")
            .expect("activity count"),
        0
    );
}
