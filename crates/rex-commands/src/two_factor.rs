use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rex_core::{current_unix_timestamp, is_expired_unix};
use rex_notify::SmsTransport;
use rex_store::RexStore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Codes stay valid this long after issue.
pub const TWO_FACTOR_CODE_TTL_SECS: u64 = 600;

static ISSUE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Public enum `TwoFactorError` used across Rex components.
#[derive(Debug, Error)]
pub enum TwoFactorError {
    #[error("missing phone number; set it in settings")]
    MissingPhoneNumber,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorOutcome {
    Verified,
    Invalid,
    Expired,
    Missing,
}

impl TwoFactorOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorOutcome::Verified => "verified",
            TwoFactorOutcome::Invalid => "invalid",
            TwoFactorOutcome::Expired => "expired",
            TwoFactorOutcome::Missing => "missing",
        }
    }
}

/// Issues and verifies the numeric confirmation codes that gate campaign
/// sends. One live code per user; issue replaces, verify consumes.
pub struct TwoFactorGate {
    store: Arc<RexStore>,
    sms: Arc<dyn SmsTransport>,
}

impl TwoFactorGate {
    pub fn new(store: Arc<RexStore>, sms: Arc<dyn SmsTransport>) -> Self {
        Self { store, sms }
    }

    /// Generates and stores a fresh code, then texts it to the user's stored
    /// phone number. Returns `Ok(false)` when the code could not be
    /// delivered; a missing phone number is an error the caller must surface.
    pub async fn issue(&self, user_id: &str) -> Result<bool, TwoFactorError> {
        let settings = self.store.settings(user_id)?;
        let phone = settings
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(TwoFactorError::MissingPhoneNumber)?
            .to_string();

        let code = generate_code(user_id);
        let expires_at = current_unix_timestamp() + TWO_FACTOR_CODE_TTL_SECS;
        self.store.store_two_factor_code(user_id, &code, expires_at)?;

        let body = format!("Your Rex verification code is {code}. It expires in 10 minutes.");
        if let Err(error) = self.sms.send_sms(&phone, &body).await {
            tracing::warn!(user_id, error = %error, "two-factor code delivery failed");
            return Ok(false);
        }
        self.store.log_activity(
            user_id,
            "two_factor_code_sent",
            &serde_json::json!({ "expires_at": expires_at }).to_string(),
        )?;
        Ok(true)
    }

    /// Checks `candidate` against the stored code. Every attempt is audited;
    /// a verified code is deleted so it cannot authorize a second send.
    pub fn verify(&self, user_id: &str, candidate: &str) -> Result<TwoFactorOutcome, TwoFactorError> {
        self.verify_at(user_id, candidate, current_unix_timestamp())
    }

    fn verify_at(
        &self,
        user_id: &str,
        candidate: &str,
        now_unix: u64,
    ) -> Result<TwoFactorOutcome, TwoFactorError> {
        let outcome = match self.store.two_factor_code(user_id)? {
            None => TwoFactorOutcome::Missing,
            Some(record) if is_expired_unix(Some(record.expires_at), now_unix) => {
                self.store.clear_two_factor_code(user_id)?;
                TwoFactorOutcome::Expired
            }
            Some(record) if record.code == candidate.trim() => {
                self.store.clear_two_factor_code(user_id)?;
                TwoFactorOutcome::Verified
            }
            Some(_) => TwoFactorOutcome::Invalid,
        };
        self.store.log_activity(
            user_id,
            "two_factor_verify",
            &serde_json::json!({ "outcome": outcome.as_str() }).to_string(),
        )?;
        Ok(outcome)
    }
}

/// Derives a 6-digit code from the user id, a nanosecond clock reading, and
/// a process-wide counter. The counter keeps two issues inside the same
/// clock tick from colliding.
fn generate_code(user_id: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = ISSUE_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(nanos.to_be_bytes());
    hasher.update(counter.to_be_bytes());
    let digest = hasher.finalize();

    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    format!("{:06}", u64::from_be_bytes(raw) % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rex_notify::{DisabledSmsTransport, HttpSmsTransport, SmsTransportConfig};
    use std::collections::HashSet;

    const USER: &str = "user-1";

    fn open_store(dir: &tempfile::TempDir) -> Arc<RexStore> {
        Arc::new(RexStore::open(&dir.path().join("rex-state.sqlite3")).expect("open store"))
    }

    fn set_phone(store: &RexStore, phone: &str) {
        let mut settings = store.settings(USER).expect("settings");
        settings.phone_number = Some(phone.to_string());
        store.update_settings(&settings).expect("update settings");
    }

    #[test]
    fn unit_generated_codes_are_six_digits_and_vary() {
        let codes: Vec<String> = (0..5).map(|_| generate_code(USER)).collect();
        for code in &codes {
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        let distinct: HashSet<&String> = codes.iter().collect();
        assert!(distinct.len() >= 2);
    }

    #[tokio::test]
    async fn functional_issue_stores_code_and_delivers_sms() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tempdir);
        set_phone(&store, "+15551112222");
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/sms")
                .body_includes("Your Rex verification code is");
            then.status(202);
        });
        let sms = Arc::new(
            HttpSmsTransport::new(SmsTransportConfig {
                endpoint: format!("{}/sms", server.base_url()),
                api_key: "gateway-key".to_string(),
                from_number: "+15550000000".to_string(),
                request_timeout_ms: 5_000,
            })
            .expect("sms transport"),
        );

        let gate = TwoFactorGate::new(Arc::clone(&store), sms);
        let delivered = gate.issue(USER).await.expect("issue");
        assert!(delivered);
        mock.assert();

        let record = store
            .two_factor_code(USER)
            .expect("query")
            .expect("code stored");
        assert_eq!(record.code.len(), 6);
        let now = current_unix_timestamp();
        assert!(record.expires_at > now + TWO_FACTOR_CODE_TTL_SECS - 10);
        assert!(record.expires_at <= now + TWO_FACTOR_CODE_TTL_SECS + 10);
    }

    #[tokio::test]
    async fn functional_issue_reports_delivery_failure() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tempdir);
        set_phone(&store, "+15551112222");

        let gate = TwoFactorGate::new(Arc::clone(&store), Arc::new(DisabledSmsTransport));
        let delivered = gate.issue(USER).await.expect("issue");
        assert!(!delivered);
    }

    #[tokio::test]
    async fn unit_issue_without_phone_number_is_refused() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tempdir);

        let gate = TwoFactorGate::new(Arc::clone(&store), Arc::new(DisabledSmsTransport));
        let error = gate.issue(USER).await.expect_err("no phone number");
        assert!(matches!(error, TwoFactorError::MissingPhoneNumber));
        assert!(store.two_factor_code(USER).expect("query").is_none());
    }

    #[test]
    fn functional_verify_consumes_the_code_exactly_once() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tempdir);
        let now = current_unix_timestamp();
        store
            .store_two_factor_code(USER, "123456", now + 300)
            .expect("store code");

        let gate = TwoFactorGate::new(Arc::clone(&store), Arc::new(DisabledSmsTransport));
        assert_eq!(gate.verify(USER, " 123456 ").expect("verify"), TwoFactorOutcome::Verified);
        assert_eq!(gate.verify(USER, "123456").expect("verify"), TwoFactorOutcome::Missing);
        assert_eq!(store.count_activity(USER, "two_factor_verify").expect("count"), 2);
    }

    #[test]
    fn functional_expired_code_is_rejected_and_cleared() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tempdir);
        store
            .store_two_factor_code(USER, "123456", 1_000)
            .expect("store code");

        let gate = TwoFactorGate::new(Arc::clone(&store), Arc::new(DisabledSmsTransport));
        assert_eq!(
            gate.verify_at(USER, "123456", 1_661).expect("verify"),
            TwoFactorOutcome::Expired
        );
        assert!(store.two_factor_code(USER).expect("query").is_none());
    }

    #[test]
    fn unit_wrong_code_is_invalid_and_not_consumed() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&tempdir);
        let now = current_unix_timestamp();
        store
            .store_two_factor_code(USER, "123456", now + 300)
            .expect("store code");

        let gate = TwoFactorGate::new(Arc::clone(&store), Arc::new(DisabledSmsTransport));
        assert_eq!(gate.verify(USER, "654321").expect("verify"), TwoFactorOutcome::Invalid);
        assert!(store.two_factor_code(USER).expect("query").is_some());
    }
}
