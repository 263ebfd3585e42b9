//! Outbound delivery channels for Rex: SMS and email gateway transports plus
//! best-effort webhook notification. Transports are trait objects so the
//! command layer can run against disabled stand-ins in tests and in
//! deployments without a gateway.

mod transports;
mod webhook;

pub use transports::{
    DisabledEmailTransport, DisabledSmsTransport, EmailTransport, EmailTransportConfig,
    HttpEmailTransport, HttpSmsTransport, RexNotifyError, SmsTransport, SmsTransportConfig,
};
pub use webhook::{WebhookEvent, WebhookNotifier};
