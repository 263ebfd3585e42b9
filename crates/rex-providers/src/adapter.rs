use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::EntityRecord;

/// Public enum `Provider` used across Rex components.
///
/// `as_str` doubles as the token-store service key for each system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    RealNex,
    Mailchimp,
    ConstantContact,
    Apollo,
    Seamless,
    ZoomInfo,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealNex => "realnex",
            Self::Mailchimp => "mailchimp",
            Self::ConstantContact => "constant_contact",
            Self::Apollo => "apollo",
            Self::Seamless => "seamless",
            Self::ZoomInfo => "zoominfo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "realnex" => Some(Self::RealNex),
            "mailchimp" => Some(Self::Mailchimp),
            "constant_contact" | "constantcontact" => Some(Self::ConstantContact),
            "apollo" => Some(Self::Apollo),
            "seamless" => Some(Self::Seamless),
            "zoominfo" => Some(Self::ZoomInfo),
            _ => None,
        }
    }

    /// The system of record. Push failures here abort a sync.
    pub fn is_crm(&self) -> bool {
        matches!(self, Self::RealNex)
    }

    /// Best-effort campaign/list targets.
    pub fn is_marketing(&self) -> bool {
        matches!(self, Self::Mailchimp | Self::ConstantContact)
    }

    /// Read-only contact sources.
    pub fn is_enrichment(&self) -> bool {
        matches!(self, Self::Apollo | Self::Seamless | Self::ZoomInfo)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Public enum `ProviderError` used across Rex components.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned status {status}: {body}")]
    HttpStatus {
        provider: Provider,
        status: u16,
        body: String,
    },
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: Provider,
        operation: &'static str,
    },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Trait contract for `ProviderAdapter` behavior.
///
/// `fetch` returns normalized records; an HTTP-layer failure is a
/// `ProviderError`, never an empty vec, so callers can tell degradation from
/// genuinely zero results. `push` writes one entity under the caller's
/// resolved group/list.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch(
        &self,
        credential: &str,
        group_id: &str,
    ) -> Result<Vec<EntityRecord>, ProviderError>;

    async fn push(
        &self,
        credential: &str,
        entity: &EntityRecord,
        group_id: &str,
    ) -> Result<(), ProviderError>;
}

/// Shared HTTP transport config for the adapters.
#[derive(Debug, Clone)]
pub struct ProviderHttpConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl ProviderHttpConfig {
    pub fn new(api_base: impl Into<String>, request_timeout_ms: u64) -> Self {
        Self {
            api_base: api_base.into(),
            request_timeout_ms,
        }
    }
}

pub(crate) fn provider_http_client(
    request_timeout_ms: u64,
) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("rex-providers"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let http = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(request_timeout_ms.max(1)))
        .build()?;
    Ok(http)
}

pub(crate) fn trimmed_base(api_base: &str) -> String {
    api_base.trim_end_matches('/').to_string()
}

/// Reads the status line; non-2xx becomes `HttpStatus` carrying the body,
/// since the provider body is usually the only useful diagnostic.
pub(crate) async fn ensure_success(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::HttpStatus {
        provider,
        status,
        body,
    })
}
