//! Processor event envelope and typed payloads.
//!
//! Only fields used by reconciliation are captured. Unknown fields are
//! ignored so processor API upgrades do not break decoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::webhook_errors::WebhookError;

/// Webhook event as delivered by the processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp of creation.
    pub created: i64,

    pub data: EventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,

    /// Connected account the event originated from, for Connect events.
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventData {
    pub object: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

/// Event types the router recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    CheckoutSessionAsyncPaymentSucceeded,
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    PaymentIntentCanceled,
    ChargeRefunded,
    AccountUpdated,
    PayoutPaid,
    PayoutFailed,
    Unknown,
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "checkout.session.async_payment_succeeded" => {
                Self::CheckoutSessionAsyncPaymentSucceeded
            }
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            "payment_intent.canceled" => Self::PaymentIntentCanceled,
            "charge.refunded" => Self::ChargeRefunded,
            "account.updated" => Self::AccountUpdated,
            "payout.paid" => Self::PayoutPaid,
            "payout.failed" => Self::PayoutFailed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CheckoutSessionAsyncPaymentSucceeded => {
                "checkout.session.async_payment_succeeded"
            }
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::PaymentIntentFailed => "payment_intent.payment_failed",
            Self::PaymentIntentCanceled => "payment_intent.canceled",
            Self::ChargeRefunded => "charge.refunded",
            Self::AccountUpdated => "account.updated",
            Self::PayoutPaid => "payout.paid",
            Self::PayoutFailed => "payout.failed",
            Self::Unknown => "unknown",
        }
    }
}

/// A verified event decoded into the payload its handler needs.
#[derive(Debug, Clone)]
pub enum ReconciliationEvent {
    CheckoutCompleted(CheckoutSession),
    PaymentSucceeded(PaymentIntent),
    PaymentFailed(PaymentIntent),
    PaymentCanceled(PaymentIntent),
    ChargeRefunded(Charge),
    AccountUpdated(ConnectedAccount),
    PayoutPaid {
        payout: Payout,
        account: Option<String>,
    },
    PayoutFailed {
        payout: Payout,
        account: Option<String>,
    },
    Unknown(String),
}

impl ProcessorEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    pub fn deserialize_object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::ParseError(format!("{} payload: {}", self.event_type, e))
        })
    }

    /// Decodes the payload object according to the event type.
    pub fn decode(&self) -> Result<ReconciliationEvent, WebhookError> {
        let event = match self.kind() {
            EventKind::CheckoutSessionCompleted
            | EventKind::CheckoutSessionAsyncPaymentSucceeded => {
                ReconciliationEvent::CheckoutCompleted(self.deserialize_object()?)
            }
            EventKind::PaymentIntentSucceeded => {
                ReconciliationEvent::PaymentSucceeded(self.deserialize_object()?)
            }
            EventKind::PaymentIntentFailed => {
                ReconciliationEvent::PaymentFailed(self.deserialize_object()?)
            }
            EventKind::PaymentIntentCanceled => {
                ReconciliationEvent::PaymentCanceled(self.deserialize_object()?)
            }
            EventKind::ChargeRefunded => {
                ReconciliationEvent::ChargeRefunded(self.deserialize_object()?)
            }
            EventKind::AccountUpdated => {
                ReconciliationEvent::AccountUpdated(self.deserialize_object()?)
            }
            EventKind::PayoutPaid => ReconciliationEvent::PayoutPaid {
                payout: self.deserialize_object()?,
                account: self.account.clone(),
            },
            EventKind::PayoutFailed => ReconciliationEvent::PayoutFailed {
                payout: self.deserialize_object()?,
                account: self.account.clone(),
            },
            EventKind::Unknown => ReconciliationEvent::Unknown(self.event_type.clone()),
        };
        Ok(event)
    }
}

/// A reference that is either a bare id or an expanded object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().map(Expandable::id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferData {
    pub destination: Expandable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    pub currency: String,
    #[serde(default)]
    pub latest_charge: Option<Expandable>,
    #[serde(default)]
    pub payment_method: Option<Expandable>,
    #[serde(default)]
    pub transfer_data: Option<TransferData>,
    #[serde(default)]
    pub application_fee_amount: Option<i64>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// Connected account the funds are routed to, if any.
    pub fn destination_account(&self) -> Option<&str> {
        self.transfer_data.as_ref().map(|t| t.destination.id())
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.code.clone()))
            .or_else(|| self.cancellation_reason.clone())
    }

    pub fn settled_amount(&self) -> i64 {
        self.amount_received.filter(|a| *a > 0).unwrap_or(self.amount)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RefundList {
    #[serde(default)]
    pub data: Vec<Refund>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub refunds: Option<RefundList>,
}

impl Charge {
    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().map(Expandable::id)
    }

    /// Most recent refund; the processor lists newest first.
    pub fn latest_refund(&self) -> Option<&Refund> {
        self.refunds.as_ref().and_then(|r| r.data.first())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectedAccount {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payout {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub arrival_date: Option<i64>,
    #[serde(default)]
    pub failure_code: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

/// Builder for test events.
#[cfg(test)]
pub struct ProcessorEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
    account: Option<String>,
}

#[cfg(test)]
impl ProcessorEventBuilder {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: event_type.into(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            livemode: false,
            account: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn livemode(mut self, livemode: bool) -> Self {
        self.livemode = livemode;
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn build(self) -> ProcessorEvent {
        ProcessorEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: EventData {
                object: self.object,
                previous_attributes: None,
            },
            livemode: self.livemode,
            api_version: Some("2024-06-20".to_string()),
            account: self.account,
        }
    }
}
