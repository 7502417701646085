//! Payment processor port.
//!
//! Reconciliation only reads from the processor: it re-fetches resources by
//! id and asks for the amounts actually settled on a payment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::payments::{CheckoutSession, PaymentIntent, SettledAmounts, WebhookError};

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Retrieves a checkout session, expanding the listed fields.
    ///
    /// Returns `None` if the session does not exist.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
        expand: &[&str],
    ) -> Result<Option<CheckoutSession>, PaymentError>;

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError>;

    /// Settled gross, net, processor fee and platform fee for a payment.
    ///
    /// Returns `None` while the charge has not settled yet.
    async fn get_settled_amounts(
        &self,
        payment_intent_id: &str,
        payee_account_id: Option<&str>,
    ) -> Result<Option<SettledAmounts>, PaymentError>;
}

/// Errors from payment processor calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    /// Processor's own error code, when reported.
    pub provider_code: Option<String>,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::Timeout, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidResponse, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        WebhookError::Processor(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    Timeout,
    AuthenticationError,
    NotFound,
    RateLimitExceeded,
    InvalidResponse,
    ProviderError,
}

impl PaymentErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::Timeout
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Timeout => "timeout",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidResponse => "invalid_response",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PaymentError::network("reset").is_retryable());
        assert!(PaymentError::timeout("5s").is_retryable());
        assert!(!PaymentError::not_found("pi_1").is_retryable());
        assert!(!PaymentError::authentication("bad key").is_retryable());
    }

    #[test]
    fn error_display_includes_code() {
        let err = PaymentError::not_found("Checkout session cs_1");
        assert_eq!(err.to_string(), "not_found: Checkout session cs_1 not found");
    }

    #[test]
    fn converts_to_retryable_webhook_error() {
        let err: WebhookError = PaymentError::network("down").into();
        assert!(matches!(err, WebhookError::Processor(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn processor_is_object_safe() {
        fn _accepts(_: &dyn PaymentProcessor) {}
    }
}
