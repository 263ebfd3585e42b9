//! The `rex` binary: parses configuration, wires the store and every
//! collaborator, and serves the HTTP gateway until interrupted.

mod args;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rex_ai::{CompletionClient, OpenAiCompletionClient, OpenAiCompletionConfig};
use rex_commands::CommandService;
use rex_gateway::{run_gateway_server, GatewayAuthMode, GatewayServices, RexGatewayConfig};
use rex_notify::{
    DisabledEmailTransport, DisabledSmsTransport, EmailTransport, EmailTransportConfig,
    HttpEmailTransport, HttpSmsTransport, SmsTransport, SmsTransportConfig, WebhookNotifier,
};
use rex_providers::{
    ConstantContactAdapter, DisabledTextExtractor, EnrichmentAdapter, HttpTextExtractor,
    MailchimpAdapter, ProviderHttpConfig, RealNexAdapter, TextExtractor,
};
use rex_store::RexStore;
use rex_sync::{SyncAdapters, SyncService};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::args::Cli;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let auth_mode = cli.gateway_auth_mode.as_gateway_mode();
    if auth_mode == GatewayAuthMode::Token
        && cli
            .gateway_auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .is_none()
    {
        bail!("--gateway-auth-token is required when --gateway-auth-mode=token");
    }
    let Some(ai_api_key) = cli
        .ai_api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
    else {
        bail!("an AI API key is required; set --ai-api-key or REX_AI_API_KEY");
    };

    let store = Arc::new(RexStore::open(&cli.state_db)?);
    tracing::info!(path = %cli.state_db.display(), "state database ready");

    let completion: Arc<dyn CompletionClient> = Arc::new(
        OpenAiCompletionClient::new(OpenAiCompletionConfig {
            api_base: cli.ai_api_base.clone(),
            api_key: ai_api_key.to_string(),
            model: cli.ai_model.clone(),
            request_timeout_ms: cli.ai_request_timeout_ms,
            max_retries: cli.ai_max_retries,
        })
        .context("completion client construction failed")?,
    );

    let provider_config =
        |base: &str| ProviderHttpConfig::new(base.to_string(), cli.provider_timeout_ms);
    let adapters = SyncAdapters {
        realnex: RealNexAdapter::new(provider_config(&cli.realnex_api_base))
            .context("realnex adapter construction failed")?,
        mailchimp: MailchimpAdapter::new(provider_config(&cli.mailchimp_api_base))
            .context("mailchimp adapter construction failed")?,
        constant_contact: ConstantContactAdapter::new(provider_config(
            &cli.constant_contact_api_base,
        ))
        .context("constant contact adapter construction failed")?,
        enrichment: vec![
            EnrichmentAdapter::apollo(provider_config(&cli.apollo_api_base))
                .context("apollo adapter construction failed")?,
            EnrichmentAdapter::seamless(provider_config(&cli.seamless_api_base))
                .context("seamless adapter construction failed")?,
            EnrichmentAdapter::zoominfo(provider_config(&cli.zoominfo_api_base))
                .context("zoominfo adapter construction failed")?,
        ],
    };
    let sync = Arc::new(SyncService::new(Arc::clone(&store), adapters));

    let sms: Arc<dyn SmsTransport> = match cli.sms_endpoint.as_deref() {
        Some(endpoint) => Arc::new(
            HttpSmsTransport::new(SmsTransportConfig {
                endpoint: endpoint.to_string(),
                api_key: cli.sms_api_key.clone().unwrap_or_default(),
                from_number: cli.sms_from_number.clone().unwrap_or_default(),
                request_timeout_ms: cli.notify_timeout_ms,
            })
            .context("sms transport construction failed")?,
        ),
        None => Arc::new(DisabledSmsTransport),
    };
    let email: Arc<dyn EmailTransport> = match cli.email_endpoint.as_deref() {
        Some(endpoint) => Arc::new(
            HttpEmailTransport::new(EmailTransportConfig {
                endpoint: endpoint.to_string(),
                api_key: cli.email_api_key.clone().unwrap_or_default(),
                from_address: cli.email_from_address.clone().unwrap_or_default(),
                request_timeout_ms: cli.notify_timeout_ms,
            })
            .context("email transport construction failed")?,
        ),
        None => Arc::new(DisabledEmailTransport),
    };
    let extractor: Arc<dyn TextExtractor> = match cli.ocr_endpoint.as_deref() {
        Some(endpoint) => Arc::new(
            HttpTextExtractor::new(
                endpoint,
                cli.ocr_api_key.as_deref().unwrap_or_default(),
                cli.provider_timeout_ms,
            )
            .context("ocr extractor construction failed")?,
        ),
        None => Arc::new(DisabledTextExtractor),
    };

    let commands = Arc::new(
        CommandService::new(
            Arc::clone(&store),
            completion,
            Arc::clone(&sync),
            sms,
            email,
            WebhookNotifier::new(cli.webhook_timeout_ms)
                .context("webhook notifier construction failed")?,
        )
        .context("command parser construction failed")?,
    );

    let config = RexGatewayConfig {
        bind: cli.gateway_bind.clone(),
        auth_mode,
        auth_token: cli.gateway_auth_token.clone(),
        rate_limit_window_seconds: cli.gateway_rate_limit_window_seconds,
        rate_limit_max_requests: cli.gateway_rate_limit_max_requests,
    };
    let services = GatewayServices {
        store,
        commands,
        sync,
        extractor,
        webhook: WebhookNotifier::new(cli.webhook_timeout_ms)
            .context("webhook notifier construction failed")?,
    };
    run_gateway_server(config, services).await
}
