//! Payment processor configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Stripe credentials and reconciliation tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key
    pub stripe_api_key: SecretString,

    /// Webhook signing secret; absent disables verification outside production
    #[serde(default)]
    pub stripe_webhook_secret: Option<SecretString>,

    /// Shared secret expected in `X-Manual-Process-Secret`
    #[serde(default)]
    pub manual_process_secret: Option<SecretString>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Upper bound on a settled-amounts lookup before estimates are kept
    #[serde(default = "default_fee_lookup_timeout")]
    pub fee_lookup_timeout_secs: u64,

    /// Reject test-mode events
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_test_")
    }

    /// Configured webhook secret, treating an empty value as unset
    pub fn webhook_secret(&self) -> Option<&SecretString> {
        self.stripe_webhook_secret
            .as_ref()
            .filter(|s| !s.expose_secret().is_empty())
    }

    pub fn manual_secret(&self) -> Option<&SecretString> {
        self.manual_process_secret
            .as_ref()
            .filter(|s| !s.expose_secret().is_empty())
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if !api_key.starts_with("sk_") && !api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }

        match self.webhook_secret() {
            Some(secret) if !secret.expose_secret().starts_with("whsec_") => {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
            None if *environment == Environment::Production => {
                return Err(ValidationError::WebhookVerificationDisabledInProduction);
            }
            _ => {}
        }

        if self.fee_lookup_timeout_secs == 0 || self.fee_lookup_timeout_secs > 60 {
            return Err(ValidationError::InvalidFeeLookupTimeout);
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_fee_lookup_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str, webhook_secret: Option<&str>) -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: SecretString::new(api_key.to_string()),
            stripe_webhook_secret: webhook_secret.map(|s| SecretString::new(s.to_string())),
            manual_process_secret: None,
            api_base_url: default_api_base_url(),
            fee_lookup_timeout_secs: default_fee_lookup_timeout(),
            require_livemode: false,
        }
    }

    #[test]
    fn test_is_test_mode() {
        assert!(config("sk_test_xxx", None).is_test_mode());
        assert!(!config("sk_live_xxx", None).is_test_mode());
    }

    #[test]
    fn test_missing_secret_allowed_in_development() {
        let cfg = config("sk_test_xxx", None);
        assert!(cfg.validate(&Environment::Development).is_ok());
    }

    #[test]
    fn test_missing_secret_fatal_in_production() {
        let cfg = config("sk_live_xxx", None);
        assert!(matches!(
            cfg.validate(&Environment::Production),
            Err(ValidationError::WebhookVerificationDisabledInProduction)
        ));
    }

    #[test]
    fn test_empty_secret_counts_as_missing() {
        let cfg = config("sk_live_xxx", Some(""));
        assert!(cfg.webhook_secret().is_none());
        assert!(cfg.validate(&Environment::Production).is_err());
    }

    #[test]
    fn test_invalid_webhook_secret_prefix() {
        let cfg = config("sk_test_xxx", Some("secret_xxx"));
        assert!(matches!(
            cfg.validate(&Environment::Development),
            Err(ValidationError::InvalidStripeWebhookSecret)
        ));
    }

    #[test]
    fn test_invalid_api_key_prefix() {
        let cfg = config("pk_test_xxx", Some("whsec_xxx"));
        assert!(cfg.validate(&Environment::Development).is_err());
    }

    #[test]
    fn test_fee_lookup_timeout_bounds() {
        let mut cfg = config("sk_test_xxx", Some("whsec_xxx"));
        cfg.fee_lookup_timeout_secs = 0;
        assert!(matches!(
            cfg.validate(&Environment::Development),
            Err(ValidationError::InvalidFeeLookupTimeout)
        ));
    }
}
