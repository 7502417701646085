//! Request and response bodies for the webhook endpoints.

use serde::{Deserialize, Serialize};

/// Acknowledgment returned to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookReceipt {
    pub fn received() -> Self {
        Self {
            received: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            received: false,
            error: Some(error.into()),
        }
    }
}

/// Body of `POST /webhooks/stripe/manual-process-session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualProcessRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualProcessResponse {
    pub session_id: String,
    /// Label of what reprocessing changed, e.g. `booking_materialized`
    pub outcome: String,
}

/// Standard error body for the administrative endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

/// Unverified `id` and `type` of a delivery, used only to label its span.
#[derive(Debug, Default, Deserialize)]
pub(super) struct EventPeek {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
}
