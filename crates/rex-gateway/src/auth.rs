//! Bearer auth and fixed-window rate limiting for the gateway.
//!
//! Two modes: `open` trusts every caller (local development), `token` checks
//! a shared bearer token on every request. Admitted requests are charged
//! against a fixed per-principal window; the counters feed the status probe.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use axum::http::{header::AUTHORIZATION, HeaderMap};
use rex_core::current_unix_timestamp_ms;
use serde::Serialize;

use crate::error::ApiError;

/// Enumerates supported gateway auth modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayAuthMode {
    Open,
    Token,
}

impl GatewayAuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayAuthMode::Open => "open",
            GatewayAuthMode::Token => "token",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Some(GatewayAuthMode::Open),
            "token" => Some(GatewayAuthMode::Token),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct GatewayTraffic {
    requests_handled: u64,
    auth_failures: u64,
    rate_limited_requests: u64,
    buckets: BTreeMap<String, RateLimitBucket>,
}

#[derive(Debug, Default)]
struct RateLimitBucket {
    window_started_unix_ms: u64,
    accepted_requests: usize,
    rejected_requests: usize,
}

/// Traffic counters served by the status probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayTrafficReport {
    pub auth_mode: String,
    pub requests_handled: u64,
    pub auth_failures: u64,
    pub rate_limited_requests: u64,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: usize,
}

/// Admission control shared by every route handler.
pub(crate) struct GatewayGuard {
    mode: GatewayAuthMode,
    token: Option<String>,
    window_seconds: u64,
    max_requests: usize,
    traffic: Mutex<GatewayTraffic>,
}

impl GatewayGuard {
    pub(crate) fn new(
        mode: GatewayAuthMode,
        token: Option<String>,
        window_seconds: u64,
        max_requests: usize,
    ) -> Self {
        Self {
            mode,
            token,
            window_seconds,
            max_requests,
            traffic: Mutex::new(GatewayTraffic::default()),
        }
    }

    fn traffic(&self) -> MutexGuard<'_, GatewayTraffic> {
        match self.traffic.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Authorizes the request and charges it against the caller's window.
    pub(crate) fn admit(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let principal = self.authorize(headers)?;
        self.charge(principal)
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<&'static str, ApiError> {
        match self.mode {
            GatewayAuthMode::Open => Ok("open"),
            GatewayAuthMode::Token => {
                let expected = self
                    .token
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| {
                        ApiError::internal("gateway token auth mode is misconfigured")
                    })?;
                let Some(observed) = bearer_token_from_headers(headers) else {
                    self.note_auth_failure();
                    return Err(ApiError::unauthorized());
                };
                if observed != expected {
                    self.note_auth_failure();
                    return Err(ApiError::unauthorized());
                }
                Ok("token")
            }
        }
    }

    fn note_auth_failure(&self) {
        let mut traffic = self.traffic();
        traffic.auth_failures = traffic.auth_failures.saturating_add(1);
    }

    fn charge(&self, principal: &str) -> Result<(), ApiError> {
        let window_ms = self.window_seconds.saturating_mul(1000).max(1);
        let max_requests = self.max_requests.max(1);
        let now_unix_ms = current_unix_timestamp_ms();
        let mut traffic = self.traffic();
        let bucket = traffic.buckets.entry(principal.to_string()).or_default();
        if bucket.window_started_unix_ms == 0
            || now_unix_ms.saturating_sub(bucket.window_started_unix_ms) >= window_ms
        {
            bucket.window_started_unix_ms = now_unix_ms;
            bucket.accepted_requests = 0;
            bucket.rejected_requests = 0;
        }
        if bucket.accepted_requests >= max_requests {
            bucket.rejected_requests = bucket.rejected_requests.saturating_add(1);
            traffic.rate_limited_requests = traffic.rate_limited_requests.saturating_add(1);
            return Err(ApiError::rate_limited(format!(
                "gateway rate limit exceeded: max {} requests per {} seconds",
                max_requests, self.window_seconds
            )));
        }
        bucket.accepted_requests = bucket.accepted_requests.saturating_add(1);
        traffic.requests_handled = traffic.requests_handled.saturating_add(1);
        Ok(())
    }

    pub(crate) fn report(&self) -> GatewayTrafficReport {
        let traffic = self.traffic();
        GatewayTrafficReport {
            auth_mode: self.mode.as_str().to_string(),
            requests_handled: traffic.requests_handled,
            auth_failures: traffic.auth_failures,
            rate_limited_requests: traffic.rate_limited_requests,
            rate_limit_window_seconds: self.window_seconds,
            rate_limit_max_requests: self.max_requests,
        }
    }
}

fn bearer_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?;
    let raw = header.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
