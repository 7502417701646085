//! Application layer - Event handlers and their orchestration.
//!
//! This layer coordinates domain rules with the ports; it owns no I/O of
//! its own.

pub mod webhooks;

pub use webhooks::{
    ReconciliationOutcome, ReconciliationPorts, ReconciliationServices, ReconciliationSettings,
    ReprocessCheckoutSession, ReprocessError, WebhookAck, WebhookRouter,
};
