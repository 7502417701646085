//! Webhook error taxonomy.
//!
//! Every failure maps to one of three responses: a client error (the event
//! is never processed), an acknowledgment (the event is dropped and logged),
//! or a server error (the processor retries delivery).

use axum::http::StatusCode;
use thiserror::Error;

use super::metadata::MetadataError;
use crate::domain::foundation::{DomainError, ErrorCode};

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header absent while verification is enforced.
    #[error("Missing signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the replay window (5 minutes).
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Verification is disabled but the process is running in production.
    #[error("Webhook verification misconfigured: {0}")]
    Misconfigured(&'static str),

    /// Checkout metadata could not be decoded.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Metadata references a booking that does not exist.
    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    /// Event reports a transition the current state does not allow.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Ledger row expected but not yet written; a later delivery may find it.
    #[error("Transaction not found for payment intent {0}")]
    TransactionNotFound(String),

    /// Both booking write paths failed.
    #[error("Booking materialization failed: {0}")]
    MaterializationFailed(String),

    /// Retrieving a resource from the processor failed.
    #[error("Processor error: {0}")]
    Processor(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the processor should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::TransactionNotFound(_)
                | WebhookError::MaterializationFailed(_)
                | WebhookError::Processor(_)
                | WebhookError::Database(_)
        )
    }

    /// True for authenticity failures; these events are never processed.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
                | WebhookError::ParseError(_)
        )
    }

    /// Maps the error to an HTTP status code.
    ///
    /// - 2xx: acknowledged, no retry
    /// - 4xx: rejected, no retry
    /// - 5xx: retried by the processor
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::MissingSignature
            | WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,

            // Malformed data cannot be fixed by redelivery
            WebhookError::InvalidMetadata(_)
            | WebhookError::MissingField(_)
            | WebhookError::BookingNotFound(_)
            | WebhookError::InvalidTransition(_)
            | WebhookError::Ignored(_) => StatusCode::OK,

            WebhookError::Misconfigured(_)
            | WebhookError::TransactionNotFound(_)
            | WebhookError::MaterializationFailed(_)
            | WebhookError::Processor(_)
            | WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MetadataError> for WebhookError {
    fn from(err: MetadataError) -> Self {
        WebhookError::InvalidMetadata(err.to_string())
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => {
                WebhookError::InvalidMetadata(err.message)
            }
            ErrorCode::BookingNotFound => WebhookError::BookingNotFound(err.message),
            ErrorCode::InvalidStateTransition => WebhookError::InvalidTransition(err.message),
            _ => WebhookError::Database(err.to_string()),
        }
    }
}
