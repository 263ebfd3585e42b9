use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::adapter::trimmed_base;

/// Error taxonomy for the OCR collaborator.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr extraction is not configured")]
    Disabled,
    #[error("ocr endpoint is invalid: {0}")]
    InvalidConfig(String),
    #[error("ocr http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ocr service returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("ocr response could not be decoded: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Trait contract for turning uploaded document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String, OcrError>;
}

/// Extractor backed by an HTTP OCR service that accepts base64 document
/// payloads and answers with the recognized text.
pub struct HttpTextExtractor {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

impl HttpTextExtractor {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout_ms: u64,
    ) -> Result<Self, OcrError> {
        let endpoint = endpoint.into();
        let endpoint = trimmed_base(endpoint.trim());
        if endpoint.is_empty() {
            return Err(OcrError::InvalidConfig(
                "endpoint must not be blank".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String, OcrError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "file_base64": BASE64.encode(bytes),
                "mime_type": mime_type,
            }))
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::HttpStatus { status, body });
        }
        let parsed: OcrResponse = serde_json::from_str(&response.text().await?)?;
        Ok(parsed.text)
    }
}

/// Stands in when no OCR service is configured; every call fails fast.
pub struct DisabledTextExtractor;

#[async_trait]
impl TextExtractor for DisabledTextExtractor {
    async fn extract(&self, _bytes: &[u8], _mime_type: &str) -> Result<String, OcrError> {
        Err(OcrError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn functional_http_extractor_posts_base64_document() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/ocr")
                .header("authorization", "Bearer ocr-key")
                .json_body_includes(
                    serde_json::json!({
                        "file_base64": "aGVsbG8=",
                        "mime_type": "image/png"
                    })
                    .to_string(),
                );
            then.status(200)
                .json_body(serde_json::json!({"text": "Jane Doe\njane@x.com"}));
        });

        let extractor =
            HttpTextExtractor::new(format!("{}/ocr", server.base_url()), "ocr-key", 5_000)
                .unwrap();
        let text = extractor.extract(b"hello", "image/png").await.unwrap();
        mock.assert();
        assert_eq!(text, "Jane Doe\njane@x.com");
    }

    #[tokio::test]
    async fn functional_http_extractor_surfaces_service_rejection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ocr");
            then.status(502).body("upstream ocr engine offline");
        });

        let extractor =
            HttpTextExtractor::new(format!("{}/ocr", server.base_url()), "ocr-key", 5_000)
                .unwrap();
        let error = extractor
            .extract(b"hello", "application/pdf")
            .await
            .expect_err("502 should surface");
        match error {
            OcrError::HttpStatus { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream ocr engine offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unit_disabled_extractor_fails_fast() {
        let error = DisabledTextExtractor
            .extract(b"hello", "image/png")
            .await
            .expect_err("disabled extractor should error");
        assert!(matches!(error, OcrError::Disabled));
    }

    #[test]
    fn unit_blank_endpoint_is_rejected() {
        let error = HttpTextExtractor::new("  ", "ocr-key", 5_000)
            .err()
            .expect("blank endpoint should be rejected");
        assert!(matches!(error, OcrError::InvalidConfig(_)));
    }
}
