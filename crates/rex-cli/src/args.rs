use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use rex_ai::{DEFAULT_COMPLETION_MODEL, DEFAULT_OPENAI_API_BASE};
use rex_gateway::GatewayAuthMode;
use rex_providers::{
    DEFAULT_APOLLO_API_BASE, DEFAULT_CONSTANT_CONTACT_API_BASE, DEFAULT_REALNEX_API_BASE,
    DEFAULT_SEAMLESS_API_BASE, DEFAULT_ZOOMINFO_API_BASE,
};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliGatewayAuthMode {
    Token,
    Open,
}

impl CliGatewayAuthMode {
    pub fn as_gateway_mode(self) -> GatewayAuthMode {
        match self {
            CliGatewayAuthMode::Token => GatewayAuthMode::Token,
            CliGatewayAuthMode::Open => GatewayAuthMode::Open,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "rex",
    about = "Commercial real estate assistant backend: chat commands, CRM sync, campaigns",
    version
)]
/// Public struct `Cli` used across Rex components.
pub struct Cli {
    #[arg(
        long = "state-db",
        env = "REX_STATE_DB",
        default_value = ".rex/rex-state.sqlite3",
        help = "Path to the SQLite state database; parent directories are created on open"
    )]
    pub state_db: PathBuf,

    #[arg(
        long = "ai-api-base",
        env = "REX_AI_API_BASE",
        default_value = DEFAULT_OPENAI_API_BASE,
        help = "Base URL for the OpenAI-compatible chat-completions API"
    )]
    pub ai_api_base: String,

    #[arg(
        long = "ai-api-key",
        env = "REX_AI_API_KEY",
        hide_env_values = true,
        help = "API key for the completion API; required to start"
    )]
    pub ai_api_key: Option<String>,

    #[arg(
        long = "ai-model",
        env = "REX_AI_MODEL",
        default_value = DEFAULT_COMPLETION_MODEL,
        help = "Model identifier sent with every completion request"
    )]
    pub ai_model: String,

    #[arg(
        long = "ai-request-timeout-ms",
        env = "REX_AI_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for completion calls"
    )]
    pub ai_request_timeout_ms: u64,

    #[arg(
        long = "ai-max-retries",
        env = "REX_AI_MAX_RETRIES",
        default_value_t = 2,
        help = "Retry budget for retriable completion failures (0 disables retries)"
    )]
    pub ai_max_retries: u32,

    #[arg(
        long = "realnex-api-base",
        env = "REX_REALNEX_API_BASE",
        default_value = DEFAULT_REALNEX_API_BASE,
        help = "RealNex CRM API base"
    )]
    pub realnex_api_base: String,

    #[arg(
        long = "mailchimp-api-base",
        env = "REX_MAILCHIMP_API_BASE",
        default_value = "",
        help = "Mailchimp API base; leave empty to derive the datacenter base from each stored key"
    )]
    pub mailchimp_api_base: String,

    #[arg(
        long = "constant-contact-api-base",
        env = "REX_CONSTANT_CONTACT_API_BASE",
        default_value = DEFAULT_CONSTANT_CONTACT_API_BASE,
        help = "Constant Contact API base"
    )]
    pub constant_contact_api_base: String,

    #[arg(
        long = "apollo-api-base",
        env = "REX_APOLLO_API_BASE",
        default_value = DEFAULT_APOLLO_API_BASE,
        help = "Apollo enrichment API base"
    )]
    pub apollo_api_base: String,

    #[arg(
        long = "seamless-api-base",
        env = "REX_SEAMLESS_API_BASE",
        default_value = DEFAULT_SEAMLESS_API_BASE,
        help = "Seamless enrichment API base"
    )]
    pub seamless_api_base: String,

    #[arg(
        long = "zoominfo-api-base",
        env = "REX_ZOOMINFO_API_BASE",
        default_value = DEFAULT_ZOOMINFO_API_BASE,
        help = "ZoomInfo enrichment API base"
    )]
    pub zoominfo_api_base: String,

    #[arg(
        long = "provider-timeout-ms",
        env = "REX_PROVIDER_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for CRM, marketing, and enrichment calls"
    )]
    pub provider_timeout_ms: u64,

    #[arg(
        long = "ocr-endpoint",
        env = "REX_OCR_ENDPOINT",
        help = "HTTP OCR extractor endpoint; omit to disable document ingestion"
    )]
    pub ocr_endpoint: Option<String>,

    #[arg(
        long = "ocr-api-key",
        env = "REX_OCR_API_KEY",
        hide_env_values = true,
        help = "Bearer key sent to the OCR extractor"
    )]
    pub ocr_api_key: Option<String>,

    #[arg(
        long = "sms-endpoint",
        env = "REX_SMS_ENDPOINT",
        help = "SMS gateway endpoint; omit to disable SMS delivery (two-factor sends will fail)"
    )]
    pub sms_endpoint: Option<String>,

    #[arg(
        long = "sms-api-key",
        env = "REX_SMS_API_KEY",
        hide_env_values = true,
        help = "Bearer key sent to the SMS gateway"
    )]
    pub sms_api_key: Option<String>,

    #[arg(
        long = "sms-from-number",
        env = "REX_SMS_FROM_NUMBER",
        requires = "sms_endpoint",
        help = "Sender number forwarded to the SMS gateway"
    )]
    pub sms_from_number: Option<String>,

    #[arg(
        long = "email-endpoint",
        env = "REX_EMAIL_ENDPOINT",
        help = "Email gateway endpoint; omit to disable email delivery"
    )]
    pub email_endpoint: Option<String>,

    #[arg(
        long = "email-api-key",
        env = "REX_EMAIL_API_KEY",
        hide_env_values = true,
        help = "Bearer key sent to the email gateway"
    )]
    pub email_api_key: Option<String>,

    #[arg(
        long = "email-from-address",
        env = "REX_EMAIL_FROM_ADDRESS",
        requires = "email_endpoint",
        help = "Sender address forwarded to the email gateway"
    )]
    pub email_from_address: Option<String>,

    #[arg(
        long = "notify-timeout-ms",
        env = "REX_NOTIFY_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for SMS and email gateway calls"
    )]
    pub notify_timeout_ms: u64,

    #[arg(
        long = "webhook-timeout-ms",
        env = "REX_WEBHOOK_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for registered webhook deliveries"
    )]
    pub webhook_timeout_ms: u64,

    #[arg(
        long = "gateway-bind",
        env = "REX_GATEWAY_BIND",
        default_value = "127.0.0.1:8080",
        help = "Socket address for the HTTP gateway (host:port)"
    )]
    pub gateway_bind: String,

    #[arg(
        long = "gateway-auth-mode",
        env = "REX_GATEWAY_AUTH_MODE",
        value_enum,
        default_value_t = CliGatewayAuthMode::Token,
        help = "Gateway auth mode: token or open"
    )]
    pub gateway_auth_mode: CliGatewayAuthMode,

    #[arg(
        long = "gateway-auth-token",
        env = "REX_GATEWAY_AUTH_TOKEN",
        hide_env_values = true,
        help = "Shared bearer token required when --gateway-auth-mode=token"
    )]
    pub gateway_auth_token: Option<String>,

    #[arg(
        long = "gateway-rate-limit-window-seconds",
        env = "REX_GATEWAY_RATE_LIMIT_WINDOW_SECONDS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Rate-limit window size in seconds"
    )]
    pub gateway_rate_limit_window_seconds: u64,

    #[arg(
        long = "gateway-rate-limit-max-requests",
        env = "REX_GATEWAY_RATE_LIMIT_MAX_REQUESTS",
        default_value_t = 120,
        value_parser = parse_positive_usize,
        help = "Maximum accepted requests per auth principal within one rate-limit window"
    )]
    pub gateway_rate_limit_max_requests: usize,
}
