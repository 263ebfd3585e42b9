use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::{
    ensure_success, provider_http_client, trimmed_base, Provider, ProviderAdapter, ProviderError,
    ProviderHttpConfig,
};
use crate::entities::EntityRecord;

const CAMPAIGN_FROM_NAME: &str = "Rex Assistant";
const CAMPAIGN_REPLY_TO: &str = "noreply@example.com";

/// Derives the datacenter-specific API base from a Mailchimp API key, which
/// carries its datacenter as a suffix ("...-us21").
pub fn api_base_for_key(api_key: &str) -> String {
    let datacenter = api_key.rsplit('-').next().unwrap_or_default();
    if datacenter.is_empty() || datacenter == api_key {
        return "https://us1.api.mailchimp.com/3.0".to_string();
    }
    format!("https://{datacenter}.api.mailchimp.com/3.0")
}

/// Marketing adapter for Mailchimp audiences and campaigns. Auth is HTTP
/// Basic with the API key as the password, per the Mailchimp v3 API.
pub struct MailchimpAdapter {
    http: reqwest::Client,
    api_base: Option<String>,
}

#[derive(Deserialize)]
struct MemberListResponse {
    #[serde(default)]
    members: Vec<MemberWire>,
}

#[derive(Deserialize)]
struct MemberWire {
    #[serde(default)]
    id: Option<String>,
    email_address: String,
    #[serde(default)]
    merge_fields: MergeFields,
}

#[derive(Deserialize, Default)]
struct MergeFields {
    #[serde(default, rename = "FNAME")]
    first_name: String,
    #[serde(default, rename = "LNAME")]
    last_name: String,
}

#[derive(Deserialize)]
struct CampaignCreated {
    id: String,
}

fn merge_fields_for(name: &str) -> serde_json::Value {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default();
    let last = parts.collect::<Vec<_>>().join(" ");
    json!({ "FNAME": first, "LNAME": last })
}

impl MailchimpAdapter {
    /// `config.api_base` may be empty, in which case the base is derived per
    /// call from the credential's datacenter suffix.
    pub fn new(config: ProviderHttpConfig) -> Result<Self, ProviderError> {
        let api_base = if config.api_base.trim().is_empty() {
            None
        } else {
            Some(trimmed_base(&config.api_base))
        };
        Ok(Self {
            http: provider_http_client(config.request_timeout_ms)?,
            api_base,
        })
    }

    fn resolved_base(&self, credential: &str) -> String {
        match &self.api_base {
            Some(base) => base.clone(),
            None => api_base_for_key(credential),
        }
    }

    /// Creates a regular campaign for the audience, sets its HTML content,
    /// and triggers the send. Returns the campaign id.
    pub async fn send_campaign(
        &self,
        credential: &str,
        audience_id: &str,
        subject: &str,
        html: &str,
    ) -> Result<String, ProviderError> {
        let base = self.resolved_base(credential);

        let create = self
            .http
            .post(format!("{base}/campaigns"))
            .basic_auth("rex", Some(credential))
            .json(&json!({
                "type": "regular",
                "recipients": { "list_id": audience_id },
                "settings": {
                    "subject_line": subject,
                    "from_name": CAMPAIGN_FROM_NAME,
                    "reply_to": CAMPAIGN_REPLY_TO,
                },
            }))
            .send()
            .await?;
        let create = ensure_success(Provider::Mailchimp, create).await?;
        let created: CampaignCreated = serde_json::from_str(&create.text().await?)?;

        let content = self
            .http
            .put(format!("{base}/campaigns/{}/content", created.id))
            .basic_auth("rex", Some(credential))
            .json(&json!({ "html": html }))
            .send()
            .await?;
        ensure_success(Provider::Mailchimp, content).await?;

        let send = self
            .http
            .post(format!("{base}/campaigns/{}/actions/send", created.id))
            .basic_auth("rex", Some(credential))
            .send()
            .await?;
        ensure_success(Provider::Mailchimp, send).await?;

        Ok(created.id)
    }
}

#[async_trait]
impl ProviderAdapter for MailchimpAdapter {
    fn provider(&self) -> Provider {
        Provider::Mailchimp
    }

    async fn fetch(
        &self,
        credential: &str,
        group_id: &str,
    ) -> Result<Vec<EntityRecord>, ProviderError> {
        let base = self.resolved_base(credential);
        let response = self
            .http
            .get(format!("{base}/lists/{group_id}/members"))
            .basic_auth("rex", Some(credential))
            .send()
            .await?;
        let response = ensure_success(Provider::Mailchimp, response).await?;
        let parsed: MemberListResponse = serde_json::from_str(&response.text().await?)?;
        Ok(parsed
            .members
            .into_iter()
            .map(|member| {
                let name = format!(
                    "{} {}",
                    member.merge_fields.first_name, member.merge_fields.last_name
                )
                .trim()
                .to_string();
                EntityRecord::Contact {
                    id: member.id,
                    name,
                    email: Some(member.email_address),
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
                provider: Provider::Mailchimp,
                operation: "non-contact push",
            });
        };
        let Some(email) = email.as_deref().filter(|value| !value.is_empty()) else {
            return Err(ProviderError::InvalidPayload(
                "mailchimp members require an email address".to_string(),
            ));
        };

        let base = self.resolved_base(credential);
        let response = self
            .http
            .post(format!("{base}/lists/{group_id}/members"))
            .basic_auth("rex", Some(credential))
            .json(&json!({
                "email_address": email,
                "status": "subscribed",
                "merge_fields": merge_fields_for(name),
            }))
            .send()
            .await?;
        ensure_success(Provider::Mailchimp, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn adapter_for(server: &MockServer) -> MailchimpAdapter {
        MailchimpAdapter::new(ProviderHttpConfig::new(server.base_url(), 5_000)).unwrap()
    }

    #[test]
    fn unit_api_base_derived_from_key_datacenter_suffix() {
        assert_eq!(
            api_base_for_key("abc123-us21"),
            "https://us21.api.mailchimp.com/3.0"
        );
        assert_eq!(
            api_base_for_key("nodatacenter"),
            "https://us1.api.mailchimp.com/3.0"
        );
    }

    #[tokio::test]
    async fn functional_push_subscribes_member_with_merge_fields() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/lists/aud-1/members")
                .json_body_includes(
                    serde_json::json!({
                        "email_address": "jane@x.com",
                        "status": "subscribed",
                        "merge_fields": {"FNAME": "Jane", "LNAME": "Doe"}
                    })
                    .to_string(),
                );
            then.status(200).json_body(serde_json::json!({"id": "m-1"}));
        });

        let adapter = adapter_for(&server);
        adapter
            .push(
                "key-us1",
                &EntityRecord::Contact {
                    id: None,
                    name: "Jane Doe".to_string(),
                    email: Some("jane@x.com".to_string()),
                    phone: None,
                    company: None,
                },
                "aud-1",
            )
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn unit_push_rejects_contacts_without_email() {
        let server = MockServer::start();
        let adapter = adapter_for(&server);
        let error = adapter
            .push(
                "key-us1",
                &EntityRecord::Contact {
                    id: None,
                    name: "No Email".to_string(),
                    email: None,
                    phone: Some("555-0100".to_string()),
                    company: None,
                },
                "aud-1",
            )
            .await
            .expect_err("missing email should be rejected");
        assert!(matches!(error, ProviderError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn unit_push_rejects_non_contact_entities() {
        let server = MockServer::start();
        let adapter = adapter_for(&server);
        let error = adapter
            .push(
                "key-us1",
                &EntityRecord::Company {
                    id: None,
                    name: "Acme Realty".to_string(),
                    website: None,
                    address: None,
                    city: None,
                },
                "aud-1",
            )
            .await
            .expect_err("company push should be unsupported");
        assert!(matches!(error, ProviderError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn functional_fetch_normalizes_members_to_contacts() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/lists/aud-1/members");
            then.status(200).json_body(serde_json::json!({
                "members": [
                    {
                        "id": "m-1",
                        "email_address": "jane@x.com",
                        "merge_fields": {"FNAME": "Jane", "LNAME": "Doe"}
                    },
                    {"email_address": "bare@x.com"}
                ]
            }));
        });

        let adapter = adapter_for(&server);
        let records = adapter.fetch("key-us1", "aud-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            EntityRecord::Contact {
                id: Some("m-1".to_string()),
                name: "Jane Doe".to_string(),
                email: Some("jane@x.com".to_string()),
                phone: None,
                company: None,
            }
        );
        assert_eq!(records[1].contact_email(), Some("bare@x.com"));
    }

    #[tokio::test]
    async fn functional_send_campaign_creates_sets_content_then_sends() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/campaigns")
                .json_body_includes(
                    serde_json::json!({
                        "type": "regular",
                        "recipients": {"list_id": "aud-1"},
                        "settings": {"subject_line": "Open houses this week"}
                    })
                    .to_string(),
                );
            then.status(200).json_body(serde_json::json!({"id": "camp-7"}));
        });
        let content = server.mock(|when, then| {
            when.method(PUT)
                .path("/campaigns/camp-7/content")
                .json_body_includes(serde_json::json!({"html": "<p>hi</p>"}).to_string());
            then.status(200).json_body(serde_json::json!({"html": "<p>hi</p>"}));
        });
        let send = server.mock(|when, then| {
            when.method(POST).path("/campaigns/camp-7/actions/send");
            then.status(204);
        });

        let adapter = adapter_for(&server);
        let campaign_id = adapter
            .send_campaign("key-us1", "aud-1", "Open houses this week", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(campaign_id, "camp-7");
        create.assert();
        content.assert();
        send.assert();
    }
}
