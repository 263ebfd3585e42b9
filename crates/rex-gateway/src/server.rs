//! The Rex HTTP surface: chat and sync entry points plus the account,
//! CRM-record, alerting, OCR, and reporting routes the dashboard consumes.
//! Every handler authorizes and rate-limits through the shared guard before
//! touching a service.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDate;
use rex_commands::CommandService;
use rex_core::current_unix_timestamp;
use rex_notify::{WebhookEvent, WebhookNotifier};
use rex_providers::{EntityRecord, OcrError, Provider, TextExtractor};
use rex_store::{AlertKind, ContactRecord, DealRecord, DealType, RexStore, SettingsRecord};
use rex_sync::{ContactTextParser, SyncError, SyncScope, SyncService};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::auth::{GatewayAuthMode, GatewayGuard};
use crate::error::ApiError;

const STATUS_ENDPOINT: &str = "/api/status";
const CHAT_ENDPOINT: &str = "/api/chat";
const SYNC_ENDPOINT: &str = "/api/sync";
const USERS_ENDPOINT: &str = "/api/users";
const TOKENS_ENDPOINT: &str = "/api/tokens";
const SETTINGS_ENDPOINT: &str = "/api/settings/{user_id}";
const CONTACTS_ENDPOINT: &str = "/api/contacts";
const CONTACTS_OF_USER_ENDPOINT: &str = "/api/contacts/{user_id}";
const CONTACT_ENTRY_ENDPOINT: &str = "/api/contacts/{user_id}/{contact_id}";
const DEALS_ENDPOINT: &str = "/api/deals";
const DEALS_OF_USER_ENDPOINT: &str = "/api/deals/{user_id}";
const DEAL_ENTRY_ENDPOINT: &str = "/api/deals/{user_id}/{deal_id}";
const DEAL_ALERTS_ENDPOINT: &str = "/api/deal-alerts";
const DEAL_ALERTS_OF_USER_ENDPOINT: &str = "/api/deal-alerts/{user_id}";
const WEBHOOKS_ENDPOINT: &str = "/api/webhooks";
const WEBHOOK_TEST_ENDPOINT: &str = "/api/webhooks/test";
const OCR_ENDPOINT: &str = "/api/ocr";
const DUPLICATES_ENDPOINT: &str = "/api/duplicates/{user_id}";
const HEALTH_HISTORY_ENDPOINT: &str = "/api/health-history/{user_id}";
const MARKET_INSIGHTS_ENDPOINT: &str = "/api/market-insights/{user_id}";
const ACTIVITY_REPORT_ENDPOINT: &str = "/api/activity-report/{user_id}";
const CHAT_HISTORY_ENDPOINT: &str = "/api/chat-history/{user_id}";

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 100;

/// Gateway runtime configuration, normally filled from the CLI.
#[derive(Debug, Clone)]
pub struct RexGatewayConfig {
    pub bind: String,
    pub auth_mode: GatewayAuthMode,
    pub auth_token: Option<String>,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: usize,
}

/// Service handles the gateway dispatches into.
pub struct GatewayServices {
    pub store: Arc<RexStore>,
    pub commands: Arc<CommandService>,
    pub sync: Arc<SyncService>,
    pub extractor: Arc<dyn TextExtractor>,
    pub webhook: WebhookNotifier,
}

/// Shared state behind every route handler.
pub struct RexGatewayState {
    store: Arc<RexStore>,
    commands: Arc<CommandService>,
    sync: Arc<SyncService>,
    extractor: Arc<dyn TextExtractor>,
    webhook: WebhookNotifier,
    ocr_contacts: ContactTextParser,
    guard: GatewayGuard,
}

impl RexGatewayState {
    pub fn new(
        config: &RexGatewayConfig,
        services: GatewayServices,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            store: services.store,
            commands: services.commands,
            sync: services.sync,
            extractor: services.extractor,
            webhook: services.webhook,
            ocr_contacts: ContactTextParser::new()?,
            guard: GatewayGuard::new(
                config.auth_mode,
                config.auth_token.clone(),
                config.rate_limit_window_seconds,
                config.rate_limit_max_requests,
            ),
        })
    }
}

/// Binds the configured address and serves until ctrl-c.
pub async fn run_gateway_server(config: RexGatewayConfig, services: GatewayServices) -> Result<()> {
    let bind_addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid gateway bind address '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind rex gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(
        addr = %local_addr,
        auth_mode = config.auth_mode.as_str(),
        "rex gateway listening"
    );

    let state = Arc::new(RexGatewayState::new(&config, services).context("gateway state")?);
    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("rex gateway server exited unexpectedly")
}

pub fn build_gateway_router(state: Arc<RexGatewayState>) -> Router {
    Router::new()
        .route(STATUS_ENDPOINT, get(handle_status))
        .route(CHAT_ENDPOINT, post(handle_chat))
        .route(SYNC_ENDPOINT, post(handle_sync))
        .route(USERS_ENDPOINT, post(handle_create_user))
        .route(TOKENS_ENDPOINT, post(handle_save_token))
        .route(
            SETTINGS_ENDPOINT,
            get(handle_get_settings).put(handle_update_settings),
        )
        .route(CONTACTS_ENDPOINT, post(handle_create_contact))
        .route(CONTACTS_OF_USER_ENDPOINT, get(handle_list_contacts))
        .route(CONTACT_ENTRY_ENDPOINT, delete(handle_delete_contact))
        .route(DEALS_ENDPOINT, post(handle_create_deal))
        .route(DEALS_OF_USER_ENDPOINT, get(handle_list_deals))
        .route(DEAL_ENTRY_ENDPOINT, delete(handle_delete_deal))
        .route(DEAL_ALERTS_ENDPOINT, post(handle_create_deal_alert))
        .route(DEAL_ALERTS_OF_USER_ENDPOINT, get(handle_list_deal_alerts))
        .route(WEBHOOKS_ENDPOINT, post(handle_register_webhook))
        .route(WEBHOOK_TEST_ENDPOINT, post(handle_test_webhook))
        .route(OCR_ENDPOINT, post(handle_ocr_ingest))
        .route(DUPLICATES_ENDPOINT, get(handle_duplicates))
        .route(HEALTH_HISTORY_ENDPOINT, get(handle_health_history))
        .route(MARKET_INSIGHTS_ENDPOINT, get(handle_market_insights))
        .route(ACTIVITY_REPORT_ENDPOINT, get(handle_activity_report))
        .route(CHAT_HISTORY_ENDPOINT, get(handle_chat_history))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    user_id: String,
    scope: String,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    user_id: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct SaveTokenRequest {
    user_id: String,
    service: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct CreateContactRequest {
    user_id: String,
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateDealRequest {
    user_id: String,
    id: String,
    amount: f64,
    close_date: String,
    sq_ft: f64,
    #[serde(default)]
    rent_month: Option<f64>,
    #[serde(default)]
    sale_price: Option<f64>,
    deal_type: String,
}

#[derive(Debug, Deserialize)]
struct CreateDealAlertRequest {
    user_id: String,
    kind: String,
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct RegisterWebhookRequest {
    user_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TestWebhookRequest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct OcrIngestRequest {
    user_id: String,
    file_base64: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    limit: Option<u32>,
}

fn required(value: &str, code: &'static str, what: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(code, format!("{what} must not be blank")));
    }
    Ok(trimmed.to_string())
}

async fn handle_status(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    Ok(Json(json!({
        "status": "ok",
        "traffic": state.guard.report(),
    })))
}

async fn handle_chat(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let reply = state
        .commands
        .handle_message(&user_id, &request.message)
        .await
        .map_err(|error| {
            tracing::error!(user_id, error = %error, "chat turn failed");
            ApiError::internal("chat turn failed")
        })?;
    Ok(Json(json!({ "answer": reply.answer, "tts": reply.tts })))
}

async fn handle_sync(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let Some(scope) = SyncScope::parse(&request.scope) else {
        return Err(ApiError::bad_request(
            "invalid_scope",
            format!(
                "unknown sync scope '{}'; expected contacts, companies, properties, spaces, crm, or all",
                request.scope
            ),
        ));
    };
    match state.sync.sync(&user_id, scope).await {
        Ok(report) => Ok(Json(json!({
            "summary": report.summary(),
            "report": report,
        }))),
        Err(error @ SyncError::MissingCredential { .. }) => Err(ApiError::bad_request(
            "missing_credential",
            error.to_string(),
        )),
        Err(error @ SyncError::CrmPush { .. }) => Err(ApiError::gateway_failure(
            "crm_push_failed",
            error.to_string(),
        )),
        Err(error) => {
            tracing::error!(user_id, error = %error, "sync run failed");
            Err(ApiError::internal("sync run failed"))
        }
    }
}

async fn handle_create_user(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let email = required(&request.email, "missing_email", "email")?;
    let user = state
        .store
        .ensure_user(&user_id, &email)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "user": user })))
}

async fn handle_save_token(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<SaveTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let secret = required(&request.secret, "missing_secret", "secret")?;
    let Some(service) = Provider::parse(&request.service) else {
        return Err(ApiError::bad_request(
            "unknown_service",
            format!(
                "unknown service '{}'; expected realnex, mailchimp, constant_contact, apollo, seamless, or zoominfo",
                request.service
            ),
        ));
    };
    state
        .store
        .save_token(&user_id, service.as_str(), &secret)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "status": "saved", "service": service.as_str() })))
}

async fn handle_get_settings(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<SettingsRecord>, ApiError> {
    state.guard.admit(&headers)?;
    let settings = state.store.settings(&user_id).map_err(ApiError::from_store)?;
    Ok(Json(settings))
}

async fn handle_update_settings(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(settings): Json<SettingsRecord>,
) -> Result<Json<SettingsRecord>, ApiError> {
    state.guard.admit(&headers)?;
    if settings.user_id != user_id {
        return Err(ApiError::bad_request(
            "user_id_mismatch",
            "settings user_id does not match the route",
        ));
    }
    state
        .store
        .update_settings(&settings)
        .map_err(ApiError::from_store)?;
    let stored = state.store.settings(&user_id).map_err(ApiError::from_store)?;
    Ok(Json(stored))
}

async fn handle_list_contacts(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let contacts = state
        .store
        .list_contacts(&user_id)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "contacts": contacts })))
}

async fn handle_create_contact(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<CreateContactRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let name = required(&request.name, "missing_name", "name")?;
    let email = request.email.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let phone = request.phone.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let id = match request.id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(id) => id.to_string(),
        None => local_contact_id(&name, email, phone),
    };
    let contact = ContactRecord {
        id,
        user_id: user_id.clone(),
        name,
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
    };
    state
        .store
        .upsert_contact(&contact)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "contact": contact })))
}

async fn handle_delete_contact(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path((user_id, contact_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let removed = state
        .store
        .delete_contact(&user_id, &contact_id)
        .map_err(ApiError::from_store)?;
    if !removed {
        return Err(ApiError::not_found(
            "contact_not_found",
            format!("no contact '{contact_id}' for user '{user_id}'"),
        ));
    }
    Ok(Json(json!({ "deleted": true })))
}

async fn handle_list_deals(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let deals = state.store.list_deals(&user_id).map_err(ApiError::from_store)?;
    Ok(Json(json!({ "deals": deals })))
}

async fn handle_create_deal(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<CreateDealRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let id = required(&request.id, "missing_deal_id", "deal id")?;
    let Some(deal_type) = DealType::parse(&request.deal_type) else {
        return Err(ApiError::bad_request(
            "invalid_deal_type",
            format!("unknown deal type '{}'; expected lease or sale", request.deal_type),
        ));
    };
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(ApiError::bad_request(
            "invalid_amount",
            "amount must be a positive number",
        ));
    }
    let close_date = request.close_date.trim().to_string();
    if NaiveDate::parse_from_str(&close_date, "%Y-%m-%d").is_err() {
        return Err(ApiError::bad_request(
            "invalid_close_date",
            "close_date must be an ISO date (YYYY-MM-DD)",
        ));
    }
    let deal = DealRecord {
        id,
        user_id: user_id.clone(),
        amount: request.amount,
        close_date,
        sq_ft: request.sq_ft,
        rent_month: request.rent_month,
        sale_price: request.sale_price,
        deal_type,
    };
    state.store.upsert_deal(&deal).map_err(ApiError::from_store)?;
    let alerts_fired = state
        .commands
        .evaluate_deal_alerts(&user_id, deal_type, deal.amount)
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "deal": deal, "alerts_fired": alerts_fired })))
}

async fn handle_delete_deal(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path((user_id, deal_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let removed = state
        .store
        .delete_deal(&user_id, &deal_id)
        .map_err(ApiError::from_store)?;
    if !removed {
        return Err(ApiError::not_found(
            "deal_not_found",
            format!("no deal '{deal_id}' for user '{user_id}'"),
        ));
    }
    Ok(Json(json!({ "deleted": true })))
}

async fn handle_list_deal_alerts(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let alerts = state
        .store
        .deal_alerts(&user_id)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "alerts": alerts })))
}

async fn handle_create_deal_alert(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<CreateDealAlertRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let Some(kind) = AlertKind::parse(&request.kind) else {
        return Err(ApiError::bad_request(
            "invalid_alert_kind",
            format!(
                "unknown alert kind '{}'; expected LeaseComp, SaleComp, or Any",
                request.kind
            ),
        ));
    };
    if !request.threshold.is_finite() || request.threshold <= 0.0 {
        return Err(ApiError::bad_request(
            "invalid_threshold",
            "threshold must be a positive number",
        ));
    }
    state
        .store
        .upsert_deal_alert(&user_id, kind, request.threshold)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({
        "alert": { "user_id": user_id, "kind": kind.as_str(), "threshold": request.threshold },
    })))
}

async fn handle_register_webhook(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterWebhookRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let url = request.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::bad_request(
            "invalid_webhook_url",
            "webhook url must start with http:// or https://",
        ));
    }
    state
        .store
        .register_webhook(&user_id, url)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "status": "registered", "url": url })))
}

async fn handle_test_webhook(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<TestWebhookRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let Some(url) = state
        .store
        .webhook_url(&user_id)
        .map_err(ApiError::from_store)?
    else {
        return Err(ApiError::not_found(
            "webhook_not_registered",
            "no webhook registered for this user",
        ));
    };
    let event = WebhookEvent {
        event: "webhook_test".to_string(),
        user_id: user_id.clone(),
        occurred_unix: current_unix_timestamp(),
        detail: json!({ "note": "test delivery from the rex gateway" }),
    };
    state.webhook.notify(&url, &event).await.map_err(|error| {
        ApiError::gateway_failure("webhook_delivery_failed", error.to_string())
    })?;
    Ok(Json(json!({ "status": "delivered", "url": url })))
}

async fn handle_ocr_ingest(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Json(request): Json<OcrIngestRequest>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let user_id = required(&request.user_id, "missing_user_id", "user_id")?;
    let mime_type = required(&request.mime_type, "missing_mime_type", "mime_type")?;
    let bytes = BASE64
        .decode(request.file_base64.trim())
        .map_err(|_| ApiError::bad_request("invalid_base64", "file_base64 is not valid base64"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("empty_file", "decoded file is empty"));
    }
    let text = match state.extractor.extract(&bytes, &mime_type).await {
        Ok(text) => text,
        Err(OcrError::Disabled) => {
            return Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "ocr_disabled",
                "ocr extraction is not configured",
            ));
        }
        Err(error) => {
            tracing::warn!(user_id, error = %error, "ocr extraction failed");
            return Err(ApiError::gateway_failure(
                "ocr_failed",
                "ocr extraction failed",
            ));
        }
    };
    let parsed = state.ocr_contacts.contacts_from_text(&text);
    if parsed.is_empty() {
        return Ok(Json(json!({
            "contacts": [],
            "note": "no contacts recognized in the document",
        })));
    }

    let mut results = Vec::with_capacity(parsed.len());
    for contact in &parsed {
        let entity = EntityRecord::Contact {
            id: None,
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            company: None,
        };
        let record = ContactRecord {
            id: local_contact_id(&contact.name, contact.email.as_deref(), contact.phone.as_deref()),
            user_id: user_id.clone(),
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
        };
        state
            .store
            .upsert_contact(&record)
            .map_err(ApiError::from_store)?;
        let (outcome, detail) = match state.sync.sync_entity(&user_id, &entity).await {
            Ok(disposition) => (json!(disposition), None),
            Err(SyncError::MissingCredential { what }) => (
                json!("saved_locally"),
                Some(format!("{what} is missing; contact was not pushed")),
            ),
            Err(error) => {
                tracing::warn!(user_id, error = %error, "ocr contact push failed");
                (json!("saved_locally"), Some(error.to_string()))
            }
        };
        results.push(json!({
            "id": record.id,
            "name": record.name,
            "email": record.email,
            "phone": record.phone,
            "outcome": outcome,
            "detail": detail,
        }));
    }
    state
        .store
        .log_activity(
            &user_id,
            "ocr_ingest",
            &json!({ "contacts": results.len() }).to_string(),
        )
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "contacts": results })))
}

async fn handle_duplicates(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let total = state
        .store
        .count_duplicates(&user_id)
        .map_err(ApiError::from_store)?;
    let recent = state
        .store
        .recent_duplicates(&user_id, DEFAULT_HISTORY_LIMIT)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "total": total, "recent": recent })))
}

async fn handle_health_history(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let history = state
        .store
        .recent_health(&user_id, DEFAULT_HISTORY_LIMIT)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "history": history })))
}

async fn handle_market_insights(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let insights = state
        .commands
        .market_insights(&user_id)
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "insights": insights })))
}

async fn handle_activity_report(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let report = state
        .commands
        .render_activity_report(&user_id)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "report": report })))
}

async fn handle_chat_history(
    State(state): State<Arc<RexGatewayState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    state.guard.admit(&headers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let messages = state
        .store
        .recent_chat_messages(&user_id, limit)
        .map_err(ApiError::from_store)?;
    Ok(Json(json!({ "messages": messages })))
}

/// Deterministic local id for contacts that arrive without one; re-ingesting
/// the same person lands on the same row.
fn local_contact_id(name: &str, email: Option<&str>, phone: Option<&str>) -> String {
    let entity = EntityRecord::Contact {
        id: None,
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        company: None,
    };
    let fingerprint = entity.fingerprint();
    format!("c-{}", &fingerprint[..12])
}
