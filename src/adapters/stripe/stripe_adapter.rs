//! Stripe REST client.
//!
//! ```ignore
//! let config = StripeConfig::from_payment_config(&app_config.payment);
//! let processor = StripePaymentProcessor::new(config)?;
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::PaymentConfig;
use crate::domain::payments::{CheckoutSession, PaymentIntent, SettledAmounts};
use crate::ports::{PaymentError, PaymentErrorCode, PaymentProcessor};

const STRIPE_ACCOUNT_HEADER: &str = "Stripe-Account";

#[derive(Clone)]
pub struct StripeConfig {
    api_key: SecretString,
    /// Includes the version prefix, e.g. `https://api.stripe.com/v1`
    api_base_url: String,
    request_timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: "https://api.stripe.com/v1".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_payment_config(config: &PaymentConfig) -> Self {
        Self::new(config.stripe_api_key.clone())
            .with_base_url(config.api_base_url.clone())
            .with_request_timeout(Duration::from_secs(config.fee_lookup_timeout_secs.max(1) * 2))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

pub struct StripePaymentProcessor {
    config: StripeConfig,
    http_client: reqwest::Client,
}

/// Error envelope returned by the Stripe API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Payment intent with its latest charge and balance transaction expanded.
#[derive(Debug, Deserialize)]
struct IntentWithBalance {
    amount: i64,
    #[serde(default)]
    amount_received: Option<i64>,
    #[serde(default)]
    application_fee_amount: Option<i64>,
    #[serde(default)]
    latest_charge: Option<ChargeRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChargeRef {
    Expanded(Box<ExpandedCharge>),
    Id(String),
}

#[derive(Debug, Deserialize)]
struct ExpandedCharge {
    #[serde(default)]
    balance_transaction: Option<BalanceTransactionRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BalanceTransactionRef {
    Expanded(BalanceTransaction),
    Id(String),
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceTransaction {
    fee: i64,
    #[serde(default)]
    fee_details: Vec<FeeDetail>,
}

#[derive(Debug, Clone, Deserialize)]
struct FeeDetail {
    amount: i64,
    #[serde(rename = "type")]
    fee_type: String,
}

impl IntentWithBalance {
    fn balance_transaction(&self) -> Option<&BalanceTransaction> {
        match self.latest_charge.as_ref()? {
            ChargeRef::Expanded(charge) => match charge.balance_transaction.as_ref()? {
                BalanceTransactionRef::Expanded(bt) => Some(bt),
                BalanceTransactionRef::Id(_) => None,
            },
            ChargeRef::Id(_) => None,
        }
    }

    /// Splits the settled charge into processor fee, platform fee and the
    /// payee's net. `None` until the charge has a balance transaction.
    fn settled_amounts(&self) -> Option<SettledAmounts> {
        let bt = self.balance_transaction()?;
        let processor_fee = if bt.fee_details.is_empty() {
            bt.fee
        } else {
            bt.fee_details
                .iter()
                .filter(|d| d.fee_type == "stripe_fee")
                .map(|d| d.amount)
                .sum()
        };
        let gross = self.amount_received.unwrap_or(self.amount);
        let platform_fee = self.application_fee_amount.unwrap_or(0);
        Some(SettledAmounts {
            gross,
            net: gross - processor_fee - platform_fee,
            processor_fee,
            platform_fee,
        })
    }
}

impl StripePaymentProcessor {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// GETs a resource, mapping 404 to `None`.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        expand: &[&str],
        account: Option<&str>,
    ) -> Result<Option<T>, PaymentError> {
        let url = format!("{}/{}", self.config.api_base_url, path);
        let query: Vec<(&str, &str)> = expand.iter().map(|e| ("expand[]", *e)).collect();

        let mut request = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&query);
        if let Some(account) = account {
            request = request.header(STRIPE_ACCOUNT_HEADER, account);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::timeout(e.to_string())
            } else {
                PaymentError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let value = response.json().await.map_err(|e| {
            PaymentError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })?;
        Ok(Some(value))
    }
}

fn error_for_status(status: reqwest::StatusCode, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("Stripe API returned {}", status));

    let error = match status.as_u16() {
        401 | 403 => PaymentError::authentication(message),
        429 => PaymentError::new(PaymentErrorCode::RateLimitExceeded, message),
        500..=599 => PaymentError::provider(message),
        _ => PaymentError::invalid_response(message),
    };
    match detail.and_then(|d| d.code) {
        Some(code) => error.with_provider_code(code),
        None => error,
    }
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
        expand: &[&str],
    ) -> Result<Option<CheckoutSession>, PaymentError> {
        self.get(&format!("checkout/sessions/{}", session_id), expand, None)
            .await
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        self.get(&format!("payment_intents/{}", payment_intent_id), &[], None)
            .await
    }

    async fn get_settled_amounts(
        &self,
        payment_intent_id: &str,
        payee_account_id: Option<&str>,
    ) -> Result<Option<SettledAmounts>, PaymentError> {
        let path = format!("payment_intents/{}", payment_intent_id);
        let expand = ["latest_charge.balance_transaction"];

        let mut intent: Option<IntentWithBalance> = self.get(&path, &expand, None).await?;
        if intent.is_none() {
            // Direct charges live on the connected account
            if let Some(account) = payee_account_id {
                intent = self.get(&path, &expand, Some(account)).await?;
            }
        }

        Ok(intent.and_then(|i| i.settled_amounts()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(json: serde_json::Value) -> IntentWithBalance {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn config_defaults_to_v1_base_url() {
        let config = StripeConfig::new(SecretString::new("sk_test_key".to_string()));
        assert_eq!(config.api_base_url, "https://api.stripe.com/v1");
    }

    #[test]
    fn config_trims_trailing_slash() {
        let config = StripeConfig::new(SecretString::new("sk_test_key".to_string()))
            .with_base_url("http://localhost:12111/v1/");
        assert_eq!(config.api_base_url, "http://localhost:12111/v1");
    }

    #[test]
    fn settled_amounts_split_processor_and_platform_fees() {
        let intent = intent(serde_json::json!({
            "amount": 10_000,
            "amount_received": 10_000,
            "application_fee_amount": 500,
            "latest_charge": {
                "id": "ch_1",
                "balance_transaction": {
                    "id": "txn_1",
                    "amount": 10_000,
                    "fee": 820,
                    "net": 9_180,
                    "fee_details": [
                        {"amount": 320, "type": "stripe_fee"},
                        {"amount": 500, "type": "application_fee"}
                    ]
                }
            }
        }));

        let amounts = intent.settled_amounts().unwrap();
        assert_eq!(amounts.gross, 10_000);
        assert_eq!(amounts.processor_fee, 320);
        assert_eq!(amounts.platform_fee, 500);
        assert_eq!(amounts.net, 9_180);
    }

    #[test]
    fn unexpanded_balance_transaction_is_not_available() {
        let intent = intent(serde_json::json!({
            "amount": 10_000,
            "latest_charge": {"id": "ch_1", "balance_transaction": "txn_1"}
        }));
        assert!(intent.settled_amounts().is_none());

        let bare = intent_without_charge();
        assert!(bare.settled_amounts().is_none());
    }

    fn intent_without_charge() -> IntentWithBalance {
        intent(serde_json::json!({"amount": 10_000, "latest_charge": "ch_1"}))
    }

    #[test]
    fn error_status_mapping() {
        let auth = error_for_status(reqwest::StatusCode::UNAUTHORIZED, "");
        assert_eq!(auth.code, PaymentErrorCode::AuthenticationError);

        let limited = error_for_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(limited.is_retryable());

        let bad = error_for_status(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"resource_missing","message":"No such payment_intent"}}"#,
        );
        assert_eq!(bad.code, PaymentErrorCode::InvalidResponse);
        assert_eq!(bad.provider_code.as_deref(), Some("resource_missing"));
        assert_eq!(bad.message, "No such payment_intent");
    }
}
