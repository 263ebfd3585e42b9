//! Shared fixtures for command-layer tests: a scripted completion client and
//! a fully wired `CommandService` over mocked providers and a tempdir store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use httpmock::MockServer;
use rex_ai::{CompletionClient, CompletionRequest, CompletionResponse, CompletionUsage, RexAiError};
use rex_notify::{DisabledEmailTransport, SmsTransport, WebhookNotifier};
use rex_providers::{
    ConstantContactAdapter, MailchimpAdapter, ProviderHttpConfig, RealNexAdapter,
};
use rex_store::RexStore;
use rex_sync::{SyncAdapters, SyncService};
use tempfile::TempDir;

use crate::dispatcher::CommandService;

pub(crate) const TEST_USER: &str = "user-1";

/// Completion stub that replays a scripted sequence of outcomes; once the
/// script runs out every call fails, which doubles as an "AI offline" stand-in.
pub(crate) struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedCompletion {
    pub(crate) fn with_replies(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self::with_replies(Vec::new())
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, RexAiError> {
        let next = match self.replies.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        match next {
            Some(Ok(text)) => Ok(CompletionResponse {
                text,
                finish_reason: Some("stop".to_string()),
                usage: CompletionUsage::default(),
            }),
            Some(Err(detail)) => Err(RexAiError::InvalidResponse(detail)),
            None => Err(RexAiError::InvalidResponse(
                "scripted completion exhausted".to_string(),
            )),
        }
    }
}

pub(crate) struct CommandHarness {
    pub(crate) store: Arc<RexStore>,
    pub(crate) service: CommandService,
    pub(crate) realnex: MockServer,
    pub(crate) marketing: MockServer,
    _tempdir: TempDir,
}

/// Wires a `CommandService` against mock provider servers and a fresh store
/// with `TEST_USER` already present.
pub(crate) fn command_harness(
    completion: ScriptedCompletion,
    sms: Arc<dyn SmsTransport>,
) -> CommandHarness {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        RexStore::open(&tempdir.path().join("rex-state.sqlite3")).expect("open store"),
    );
    store
        .ensure_user(TEST_USER, "broker@rexassistant.io")
        .expect("seed user");

    let realnex = MockServer::start();
    let marketing = MockServer::start();
    let config = |base: String| ProviderHttpConfig::new(base, 5_000);
    let sync = Arc::new(SyncService::new(
        Arc::clone(&store),
        SyncAdapters {
            realnex: RealNexAdapter::new(config(realnex.base_url())).expect("realnex adapter"),
            mailchimp: MailchimpAdapter::new(config(marketing.base_url()))
                .expect("mailchimp adapter"),
            constant_contact: ConstantContactAdapter::new(config(marketing.base_url()))
                .expect("constant contact adapter"),
            enrichment: Vec::new(),
        },
    ));
    let service = CommandService::new(
        Arc::clone(&store),
        Arc::new(completion),
        sync,
        sms,
        Arc::new(DisabledEmailTransport),
        WebhookNotifier::new(2_000).expect("webhook notifier"),
    )
    .expect("command service");

    CommandHarness {
        store,
        service,
        realnex,
        marketing,
        _tempdir: tempdir,
    }
}
