//! HTTP adapter for processor webhooks.
//!
//! - `POST /webhooks/stripe` - Signed processor deliveries
//! - `POST /webhooks/stripe/manual-process-session` - Administrative reprocessing

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{ErrorResponse, ManualProcessRequest, ManualProcessResponse, WebhookReceipt};
pub use handlers::{ApiError, WebhookApiError, WebhookAppState};
pub use routes::webhook_routes;
