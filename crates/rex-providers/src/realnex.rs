use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::{
    ensure_success, provider_http_client, trimmed_base, Provider, ProviderAdapter, ProviderError,
    ProviderHttpConfig,
};
use crate::entities::EntityRecord;

pub const DEFAULT_REALNEX_API_BASE: &str = "https://sync.realnex.com/api/v1/Crm";

/// CRM adapter (system of record). Fetches and pushes CRM entities, sends
/// RealBlast campaigns, and batch-imports contacts via the CSV endpoint.
pub struct RealNexAdapter {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct RealNexListResponse {
    #[serde(default)]
    value: Vec<RealNexContactWire>,
}

#[derive(Deserialize)]
struct RealNexContactWire {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "fullName")]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    company: Option<String>,
}

impl RealNexContactWire {
    fn into_record(self) -> EntityRecord {
        EntityRecord::Contact {
            id: self.key.or(self.id),
            name: self.full_name.or(self.name).unwrap_or_default(),
            email: self.email,
            phone: self.phone,
            company: self.company,
        }
    }
}

fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Renders contact records into the CSV layout the RealNex `ImportData`
/// endpoint ingests. Non-contact records are skipped.
pub fn contacts_csv(entities: &[EntityRecord]) -> String {
    let mut lines = vec!["Full Name,First Name,Last Name,Company,Work Phone,Email".to_string()];
    for entity in entities {
        if let EntityRecord::Contact {
            name,
            email,
            phone,
            company,
            ..
        } = entity
        {
            let (first, last) = split_name(name);
            lines.push(
                [
                    name.as_str(),
                    first.as_str(),
                    last.as_str(),
                    company.as_deref().unwrap_or_default(),
                    phone.as_deref().unwrap_or_default(),
                    email.as_deref().unwrap_or_default(),
                ]
                .iter()
                .map(|field| csv_escape(field))
                .collect::<Vec<_>>()
                .join(","),
            );
        }
    }
    let mut csv = lines.join("\n");
    csv.push('\n');
    csv
}

impl RealNexAdapter {
    pub fn new(config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: provider_http_client(config.request_timeout_ms)?,
            api_base: trimmed_base(&config.api_base),
        })
    }

    fn push_payload(entity: &EntityRecord, group_id: &str) -> (&'static str, serde_json::Value) {
        match entity {
            EntityRecord::Contact {
                name,
                email,
                phone,
                company,
                ..
            } => (
                "contacts",
                json!({
                    "name": name,
                    "email": email,
                    "phone": phone,
                    "company": company,
                    "group_id": group_id,
                    "source": "rex-assistant",
                }),
            ),
            EntityRecord::Company {
                name,
                website,
                address,
                city,
                ..
            } => (
                "companies",
                json!({
                    "name": name,
                    "website": website,
                    "address": address,
                    "city": city,
                    "group_id": group_id,
                }),
            ),
            EntityRecord::Property {
                name,
                address,
                city,
                postal_code,
                sq_ft,
                ..
            } => (
                "properties",
                json!({
                    "name": name,
                    "address": address,
                    "city": city,
                    "postal_code": postal_code,
                    "sq_ft": sq_ft,
                    "group_id": group_id,
                }),
            ),
            EntityRecord::Space {
                property_address,
                floor,
                suite,
                sq_ft,
                rent_month,
                ..
            } => (
                "spaces",
                json!({
                    "property_address": property_address,
                    "floor": floor,
                    "suite": suite,
                    "sq_ft": sq_ft,
                    "rent_month": rent_month,
                    "group_id": group_id,
                }),
            ),
        }
    }

    /// Sends a RealBlast marketing campaign to a contact group.
    pub async fn send_real_blast(
        &self,
        credential: &str,
        group_id: &str,
        content: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(format!("{}/RealBlasts", self.api_base))
            .bearer_auth(credential)
            .json(&json!({ "group_id": group_id, "content": content }))
            .send()
            .await?;
        ensure_success(Provider::RealNex, response).await?;
        Ok(())
    }

    /// Batch-imports contacts through the CSV `ImportData` endpoint.
    pub async fn import_contacts_csv(
        &self,
        credential: &str,
        csv: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(format!("{}/ImportData", self.api_base))
            .bearer_auth(credential)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(csv.to_string())
            .send()
            .await?;
        ensure_success(Provider::RealNex, response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for RealNexAdapter {
    fn provider(&self) -> Provider {
        Provider::RealNex
    }

    async fn fetch(
        &self,
        credential: &str,
        group_id: &str,
    ) -> Result<Vec<EntityRecord>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/contacts", self.api_base))
            .bearer_auth(credential)
            .query(&[("group", group_id)])
            .send()
            .await?;
        let response = ensure_success(Provider::RealNex, response).await?;
        let raw = response.text().await?;
        let parsed: RealNexListResponse = serde_json::from_str(&raw)?;
        Ok(parsed
            .value
            .into_iter()
            .map(RealNexContactWire::into_record)
            .collect())
    }

    async fn push(
        &self,
        credential: &str,
        entity: &EntityRecord,
        group_id: &str,
    ) -> Result<(), ProviderError> {
        let (path, payload) = Self::push_payload(entity, group_id);
        let response = self
            .http
            .post(format!("{}/{path}", self.api_base))
            .bearer_auth(credential)
            .json(&payload)
            .send()
            .await?;
        ensure_success(Provider::RealNex, response).await?;
        Ok(())
    }
}
