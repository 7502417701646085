//! Webhook signature verification.
//!
//! HMAC-SHA256 over `"{timestamp}.{raw body}"`, compared in constant time,
//! with a replay window on the signed timestamp.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::event::ProcessorEvent;
use super::webhook_errors::WebhookError;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components of the `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Every `v1` entry; several are sent while a secret is being rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<timestamp>,v1=<signature>[,v1=...][,v0=<legacy>]`.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                // v0 and unknown schemes are not trusted
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Whether inbound events are authenticated.
///
/// Decided once at startup; there is no per-request fallback.
#[derive(Clone)]
pub enum VerificationMode {
    Enforced(SecretString),
    /// Development only: events are parsed without a signature check.
    Disabled,
}

impl VerificationMode {
    /// Resolves the mode from the configured secret.
    ///
    /// Running unverified in production is a configuration error.
    pub fn resolve(secret: Option<SecretString>, production: bool) -> Result<Self, WebhookError> {
        match secret {
            Some(secret) if !secret.expose_secret().is_empty() => Ok(Self::Enforced(secret)),
            _ if production => Err(WebhookError::Misconfigured(
                "webhook signing secret is required in production",
            )),
            _ => Ok(Self::Disabled),
        }
    }

    pub fn is_enforced(&self) -> bool {
        matches!(self, Self::Enforced(_))
    }
}

impl std::fmt::Debug for VerificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enforced(_) => f.write_str("Enforced([REDACTED])"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Verifies and decodes inbound processor events.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    mode: VerificationMode,
}

impl WebhookVerifier {
    pub fn new(mode: VerificationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &VerificationMode {
        &self.mode
    }

    /// Verifies the signature against the exact received bytes and parses
    /// the event.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` - no header while verification is enforced
    /// - `InvalidSignature` - no `v1` entry matches
    /// - `TimestampOutOfRange` - signed more than 5 minutes ago
    /// - `InvalidTimestamp` - signed in the future beyond clock skew
    /// - `ParseError` - malformed header or JSON payload
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<ProcessorEvent, WebhookError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<ProcessorEvent, WebhookError> {
        if let VerificationMode::Enforced(secret) = &self.mode {
            let header = signature_header.ok_or(WebhookError::MissingSignature)?;
            let header = SignatureHeader::parse(header)?;

            validate_timestamp(header.timestamp, now)?;

            let expected = compute_signature(secret.expose_secret(), header.timestamp, payload)?;
            let matched = header
                .v1_signatures
                .iter()
                .any(|candidate| constant_time_compare(&expected, candidate));
            if !matched {
                return Err(WebhookError::InvalidSignature);
            }
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }
}

fn validate_timestamp(timestamp: i64, now: i64) -> Result<(), WebhookError> {
    let age = now - timestamp;

    if age > MAX_EVENT_AGE_SECS {
        return Err(WebhookError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(WebhookError::InvalidTimestamp);
    }
    Ok(())
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::Misconfigured("webhook secret rejected by HMAC"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Performs constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a `Stripe-Signature` header value for a payload.
///
/// Used by tests and local tooling that replay captured events.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    match compute_signature(secret, timestamp, payload) {
        Ok(sig) => format!("t={},v1={}", timestamp, hex::encode(sig)),
        Err(_) => format!("t={}", timestamp),
    }
}
