//! Manual reprocessing of a checkout session.
//!
//! Fetches the session from the processor and runs it through the same
//! handler a `checkout.session.completed` delivery would, for sessions
//! whose webhook was lost or failed permanently.

use std::sync::Arc;
use thiserror::Error;

use super::handle_checkout_completed::CheckoutCompletedHandler;
use super::outcome::ReconciliationOutcome;
use crate::domain::payments::WebhookError;
use crate::ports::PaymentProcessor;

#[derive(Debug, Error)]
pub enum ReprocessError {
    #[error("checkout session {0} not found")]
    SessionNotFound(String),

    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

pub struct ReprocessCheckoutSession {
    processor: Arc<dyn PaymentProcessor>,
    checkout: Arc<CheckoutCompletedHandler>,
}

impl ReprocessCheckoutSession {
    pub fn new(processor: Arc<dyn PaymentProcessor>, checkout: Arc<CheckoutCompletedHandler>) -> Self {
        Self {
            processor,
            checkout,
        }
    }

    pub async fn reprocess(&self, session_id: &str) -> Result<ReconciliationOutcome, ReprocessError> {
        let session = self
            .processor
            .retrieve_checkout_session(session_id, &["payment_intent"])
            .await
            .map_err(WebhookError::from)?
            .ok_or_else(|| ReprocessError::SessionNotFound(session_id.to_string()))?;

        let event_id = format!("manual:{}", session.id);
        let outcome = self.checkout.handle(&session, &event_id).await?;
        tracing::info!(session_id, outcome = ?outcome, "checkout session reprocessed");
        Ok(outcome)
    }
}
