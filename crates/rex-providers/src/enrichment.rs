use async_trait::async_trait;
use serde::Deserialize;

use crate::adapter::{
    ensure_success, provider_http_client, trimmed_base, Provider, ProviderAdapter, ProviderError,
    ProviderHttpConfig,
};
use crate::entities::EntityRecord;

pub const DEFAULT_APOLLO_API_BASE: &str = "https://api.apollo.io/v1";
pub const DEFAULT_SEAMLESS_API_BASE: &str = "https://api.seamless.ai/v1";
pub const DEFAULT_ZOOMINFO_API_BASE: &str = "https://api.zoominfo.com/v1";

/// Read-only adapter over the contact-enrichment providers. They all expose
/// the same bearer-authenticated contact listing, so one adapter covers the
/// three of them; pushes are rejected as unsupported.
pub struct EnrichmentAdapter {
    provider: Provider,
    http: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct EnrichmentListResponse {
    #[serde(default)]
    contacts: Vec<EnrichmentContactWire>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EnrichmentContactWire {
    id: Option<String>,
    name: String,
    first_name: String,
    last_name: String,
    company: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

impl EnrichmentContactWire {
    fn into_record(self) -> EntityRecord {
        let name = if self.name.trim().is_empty() {
            format!("{} {}", self.first_name, self.last_name)
                .trim()
                .to_string()
        } else {
            self.name
        };
        EntityRecord::Contact {
            id: self.id,
            name,
            email: self.email.filter(|value| !value.is_empty()),
            phone: self.phone.filter(|value| !value.is_empty()),
            company: self.company.filter(|value| !value.is_empty()),
        }
    }
}

impl EnrichmentAdapter {
    fn build(provider: Provider, config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            provider,
            http: provider_http_client(config.request_timeout_ms)?,
            api_base: trimmed_base(&config.api_base),
        })
    }

    pub fn apollo(config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        Self::build(Provider::Apollo, config)
    }

    pub fn seamless(config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        Self::build(Provider::Seamless, config)
    }

    pub fn zoominfo(config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        Self::build(Provider::ZoomInfo, config)
    }
}

#[async_trait]
impl ProviderAdapter for EnrichmentAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch(
        &self,
        credential: &str,
        group_id: &str,
    ) -> Result<Vec<EntityRecord>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/contacts", self.api_base))
            .query(&[("list_id", group_id)])
            .bearer_auth(credential)
            .send()
            .await?;
        let response = ensure_success(self.provider, response).await?;
        let parsed: EnrichmentListResponse = serde_json::from_str(&response.text().await?)?;
        Ok(parsed
            .contacts
            .into_iter()
            .map(EnrichmentContactWire::into_record)
            .collect())
    }

    async fn push(
        &self,
        _credential: &str,
        _entity: &EntityRecord,
        _group_id: &str,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.provider,
            operation: "push",
        })
    }
}
