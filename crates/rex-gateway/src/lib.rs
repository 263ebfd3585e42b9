//! The Rex HTTP gateway.
//!
//! Serves the chat endpoint the assistant frontend talks to, the sync
//! trigger, and the dashboard's account, CRM-record, alerting, OCR, and
//! reporting routes. Every route shares one bearer-token guard with a
//! fixed-window per-principal rate limit.

mod auth;
mod error;
mod server;

pub use auth::{GatewayAuthMode, GatewayTrafficReport};
pub use server::{
    build_gateway_router, run_gateway_server, GatewayServices, RexGatewayConfig, RexGatewayState,
};
