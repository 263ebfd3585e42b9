use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Base delay for exponential backoff between provider retries.
pub const BASE_BACKOFF_MS: u64 = 200;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns true for HTTP statuses worth retrying: transient request-side
/// statuses plus every server-side failure.
pub fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}

/// Exponential backoff with a hard cap on the doubling exponent so late
/// attempts stay bounded.
pub fn next_backoff_ms(attempt: u32) -> u64 {
    let shift = attempt.min(6);
    BASE_BACKOFF_MS.saturating_mul(1u64 << shift)
}

/// Parses a `Retry-After` header value into milliseconds. Accepts both the
/// integer-seconds form and the RFC 2822 HTTP-date form.
pub fn parse_retry_after_ms(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let when = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
    let delta_ms = when
        .with_timezone(&chrono::Utc)
        .signed_duration_since(chrono::Utc::now())
        .num_milliseconds();
    if delta_ms <= 0 {
        Some(0)
    } else {
        Some(delta_ms as u64)
    }
}

/// Delay before the next attempt: the provider's `Retry-After` hint when it
/// exceeds our own backoff curve, our backoff otherwise.
pub fn retry_delay_ms(attempt: u32, retry_after_ms: Option<u64>) -> u64 {
    let backoff = next_backoff_ms(attempt);
    match retry_after_ms {
        Some(hint) => hint.max(backoff),
        None => backoff,
    }
}

/// Transport-level errors that merit another attempt.
pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Correlates retries of one logical request in provider-side logs.
pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("rex-{millis}-{count}")
}
