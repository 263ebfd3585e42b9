use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::{
    ensure_success, provider_http_client, trimmed_base, Provider, ProviderAdapter, ProviderError,
    ProviderHttpConfig,
};
use crate::entities::EntityRecord;

pub const DEFAULT_CONSTANT_CONTACT_API_BASE: &str = "https://api.cc.email/v3";

/// Marketing adapter for Constant Contact lists. Auth is a bearer token.
pub struct ConstantContactAdapter {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct ContactListResponse {
    #[serde(default)]
    contacts: Vec<ContactWire>,
}

#[derive(Deserialize)]
struct ContactWire {
    #[serde(default)]
    contact_id: Option<String>,
    #[serde(default)]
    email_address: EmailAddressWire,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Deserialize, Default)]
struct EmailAddressWire {
    #[serde(default)]
    address: String,
}

impl ConstantContactAdapter {
    pub fn new(config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: provider_http_client(config.request_timeout_ms)?,
            api_base: trimmed_base(&config.api_base),
        })
    }
}

#[async_trait]
impl ProviderAdapter for ConstantContactAdapter {
    fn provider(&self) -> Provider {
        Provider::ConstantContact
    }

    async fn fetch(
        &self,
        credential: &str,
        group_id: &str,
    ) -> Result<Vec<EntityRecord>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/contacts", self.api_base))
            .query(&[("lists", group_id)])
            .bearer_auth(credential)
            .send()
            .await?;
        let response = ensure_success(Provider::ConstantContact, response).await?;
        let parsed: ContactListResponse = serde_json::from_str(&response.text().await?)?;
        Ok(parsed
            .contacts
            .into_iter()
            .map(|contact| {
                let name = format!("{} {}", contact.first_name, contact.last_name)
                    .trim()
                    .to_string();
                let email = Some(contact.email_address.address)
                    .filter(|address| !address.is_empty());
                EntityRecord::Contact {
                    id: contact.contact_id,
                    name,
                    email,
                    phone: None,
                    company: None,
                }
            })
            .collect())
    }

    async fn push(
        &self,
        credential: &str,
        entity: &EntityRecord,
        group_id: &str,
    ) -> Result<(), ProviderError> {
        let EntityRecord::Contact { name, email, .. } = entity else {
            return Err(ProviderError::Unsupported {
                provider: Provider::ConstantContact,
                operation: "non-contact push",
            });
        };
        let Some(email) = email.as_deref().filter(|value| !value.is_empty()) else {
            return Err(ProviderError::InvalidPayload(
                "constant contact members require an email address".to_string(),
            ));
        };
        let mut parts = name.split_whitespace();
        let first_name = parts.next().unwrap_or_default();
        let last_name = parts.collect::<Vec<_>>().join(" ");

        let response = self
            .http
            .post(format!("{}/contacts", self.api_base))
            .bearer_auth(credential)
            .json(&json!({
                "email_address": {
                    "address": email,
                    "permission_to_send": "implicit",
                },
                "first_name": first_name,
                "last_name": last_name,
                "list_memberships": [group_id],
            }))
            .send()
            .await?;
        ensure_success(Provider::ConstantContact, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn adapter_for(server: &MockServer) -> ConstantContactAdapter {
        ConstantContactAdapter::new(ProviderHttpConfig::new(server.base_url(), 5_000)).unwrap()
    }

    #[tokio::test]
    async fn functional_push_sends_implicit_permission_and_list_membership() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/contacts")
                .header("authorization", "Bearer cc-token")
                .json_body_includes(
                    serde_json::json!({
                        "email_address": {
                            "address": "jane@x.com",
                            "permission_to_send": "implicit"
                        },
                        "first_name": "Jane",
                        "last_name": "Doe",
                        "list_memberships": ["list-9"]
                    })
                    .to_string(),
                );
            then.status(201)
                .json_body(serde_json::json!({"contact_id": "cc-1"}));
        });

        let adapter = adapter_for(&server);
        adapter
            .push(
                "cc-token",
                &EntityRecord::Contact {
                    id: None,
                    name: "Jane Doe".to_string(),
                    email: Some("jane@x.com".to_string()),
                    phone: None,
                    company: None,
                },
                "list-9",
            )
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn functional_fetch_filters_by_list_and_parses_contacts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/contacts")
                .query_param("lists", "list-9");
            then.status(200).json_body(serde_json::json!({
                "contacts": [
                    {
                        "contact_id": "cc-1",
                        "email_address": {"address": "jane@x.com"},
                        "first_name": "Jane",
                        "last_name": "Doe"
                    }
                ]
            }));
        });

        let adapter = adapter_for(&server);
        let records = adapter.fetch("cc-token", "list-9").await.unwrap();
        mock.assert();
        assert_eq!(
            records,
            vec![EntityRecord::Contact {
                id: Some("cc-1".to_string()),
                name: "Jane Doe".to_string(),
                email: Some("jane@x.com".to_string()),
                phone: None,
                company: None,
            }]
        );
    }

    #[tokio::test]
    async fn unit_push_requires_email_address() {
        let server = MockServer::start();
        let adapter = adapter_for(&server);
        let error = adapter
            .push(
                "cc-token",
                &EntityRecord::Contact {
                    id: None,
                    name: "No Email".to_string(),
                    email: None,
                    phone: None,
                    company: None,
                },
                "list-9",
            )
            .await
            .expect_err("missing email should be rejected");
        assert!(matches!(error, ProviderError::InvalidPayload(_)));
    }
}
