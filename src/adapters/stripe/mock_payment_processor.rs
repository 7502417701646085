//! Mock payment processor for testing.
//!
//! Supports:
//! - Pre-configured sessions, intents and settled amounts
//! - Error injection per method
//! - Artificial latency on fee lookups
//! - Call tracking

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::payments::{CheckoutSession, PaymentIntent, SettledAmounts};
use crate::ports::{PaymentError, PaymentProcessor};

/// Mock payment processor.
///
/// ```ignore
/// let mock = MockPaymentProcessor::new();
/// mock.set_settled_amounts("pi_1", amounts);
/// mock.set_error("get_settled_amounts", PaymentError::timeout("slow"));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentProcessor {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, CheckoutSession>,
    intents: HashMap<String, PaymentIntent>,
    settled: HashMap<String, SettledAmounts>,
    method_errors: HashMap<&'static str, PaymentError>,
    settled_delay: Option<Duration>,
    call_log: Vec<MethodCall>,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: &'static str,
    pub args: Vec<String>,
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_checkout_session(&self, session: CheckoutSession) {
        self.state().sessions.insert(session.id.clone(), session);
    }

    pub fn add_payment_intent(&self, intent: PaymentIntent) {
        self.state().intents.insert(intent.id.clone(), intent);
    }

    pub fn set_settled_amounts(&self, payment_intent_id: &str, amounts: SettledAmounts) {
        self.state()
            .settled
            .insert(payment_intent_id.to_string(), amounts);
    }

    /// Fails every call to `method` with `error` until cleared.
    pub fn set_error(&self, method: &'static str, error: PaymentError) {
        self.state().method_errors.insert(method, error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    /// Delays settled-amount lookups, for exercising timeouts.
    pub fn set_settled_delay(&self, delay: Duration) {
        self.state().settled_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    fn record(&self, method: &'static str, args: Vec<String>) -> Result<(), PaymentError> {
        let mut state = self.state();
        state.call_log.push(MethodCall { method, args });
        match state.method_errors.get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
        expand: &[&str],
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        let mut args = vec![session_id.to_string()];
        args.extend(expand.iter().map(|e| e.to_string()));
        self.record("retrieve_checkout_session", args)?;
        Ok(self.state().sessions.get(session_id).cloned())
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        self.record("retrieve_payment_intent", vec![payment_intent_id.to_string()])?;
        Ok(self.state().intents.get(payment_intent_id).cloned())
    }

    async fn get_settled_amounts(
        &self,
        payment_intent_id: &str,
        payee_account_id: Option<&str>,
    ) -> Result<Option<SettledAmounts>, PaymentError> {
        self.record(
            "get_settled_amounts",
            vec![
                payment_intent_id.to_string(),
                payee_account_id.unwrap_or_default().to_string(),
            ],
        )?;
        let delay = self.state().settled_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().settled.get(payment_intent_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_amounts_and_tracks_calls() {
        let mock = MockPaymentProcessor::new();
        mock.set_settled_amounts(
            "pi_1",
            SettledAmounts {
                gross: 10_000,
                net: 9_180,
                processor_fee: 320,
                platform_fee: 500,
            },
        );

        let amounts = mock
            .get_settled_amounts("pi_1", Some("acct_9"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(amounts.processor_fee, 320);
        assert_eq!(mock.call_count("get_settled_amounts"), 1);
        assert_eq!(mock.calls()[0].args, vec!["pi_1", "acct_9"]);
    }

    #[tokio::test]
    async fn injected_error_is_returned() {
        let mock = MockPaymentProcessor::new();
        mock.set_error("retrieve_checkout_session", PaymentError::network("reset"));

        let err = mock
            .retrieve_checkout_session("cs_1", &["payment_intent"])
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(mock.was_called("retrieve_checkout_session"));
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let mock = MockPaymentProcessor::new();
        assert!(mock
            .retrieve_checkout_session("cs_missing", &[])
            .await
            .unwrap()
            .is_none());
    }
}
