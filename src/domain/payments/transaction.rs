//! Ledger rows: one per processor payment intent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::booking::{BookingRef, PaymentStatus};
use crate::domain::foundation::{StateMachine, Timestamp, TransactionId, UserId, ValidationError};

/// Lifecycle of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
    PartiallyRefunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Canceled => "canceled",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// Projection onto the booking `payment_status` column.
    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            TransactionStatus::Pending | TransactionStatus::Processing => PaymentStatus::Pending,
            TransactionStatus::Succeeded => PaymentStatus::Paid,
            TransactionStatus::Failed | TransactionStatus::Canceled => PaymentStatus::Failed,
            TransactionStatus::Refunded => PaymentStatus::Refunded,
            TransactionStatus::PartiallyRefunded => PaymentStatus::PartiallyRefunded,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "succeeded" => Ok(TransactionStatus::Succeeded),
            "failed" => Ok(TransactionStatus::Failed),
            "canceled" => Ok(TransactionStatus::Canceled),
            "refunded" => Ok(TransactionStatus::Refunded),
            "partially_refunded" => Ok(TransactionStatus::PartiallyRefunded),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown transaction status '{}'", other),
            )),
        }
    }
}

impl StateMachine for TransactionStatus {
    const ALL: &'static [Self] = &[
        TransactionStatus::Pending,
        TransactionStatus::Processing,
        TransactionStatus::Succeeded,
        TransactionStatus::Failed,
        TransactionStatus::Canceled,
        TransactionStatus::Refunded,
        TransactionStatus::PartiallyRefunded,
    ];

    fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionStatus::*;
        match (self, target) {
            (Pending, Processing) => true,
            (Pending | Processing, Succeeded | Failed | Canceled) => true,
            (Pending | Processing | Succeeded, Refunded | PartiallyRefunded) => true,
            (PartiallyRefunded, PartiallyRefunded | Refunded) => true,
            _ => false,
        }
    }
}

/// Authoritative post-settlement amounts reported by the processor, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledAmounts {
    pub gross: i64,
    pub net: i64,
    pub processor_fee: i64,
    pub platform_fee: i64,
}

/// The canonical record of one payment's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub booking: BookingRef,
    pub payer_id: Option<UserId>,
    pub payee_id: Option<UserId>,
    /// Gross amount charged
    pub amount: i64,
    /// Price plus tax, before platform fees
    pub base_amount: i64,
    pub service_fee: i64,
    pub processor_fee: i64,
    pub payee_revenue: i64,
    pub refund_amount: i64,
    pub net_amount: i64,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub refund_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub status: TransactionStatus,
    /// Raw upstream status string
    pub processor_status: Option<String>,
    pub metadata: serde_json::Value,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    /// Last webhook event applied to this row
    pub webhook_event_id: Option<String>,
    pub created_at: Timestamp,
    pub paid_at: Option<Timestamp>,
    pub refunded_at: Option<Timestamp>,
    pub last_synced_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl PaymentTransaction {
    /// Applies every field set on `patch`, leaving the others untouched.
    pub fn apply(&mut self, patch: &TransactionPatch) {
        if let Some(v) = &patch.payment_intent_id {
            self.payment_intent_id = Some(v.clone());
        }
        if let Some(v) = &patch.charge_id {
            self.charge_id = Some(v.clone());
        }
        if let Some(v) = &patch.refund_id {
            self.refund_id = Some(v.clone());
        }
        if let Some(v) = &patch.payment_method_id {
            self.payment_method_id = Some(v.clone());
        }
        if let Some(v) = patch.amount {
            self.amount = v;
        }
        if let Some(v) = patch.service_fee {
            self.service_fee = v;
        }
        if let Some(v) = patch.processor_fee {
            self.processor_fee = v;
        }
        if let Some(v) = patch.net_amount {
            self.net_amount = v;
        }
        if let Some(v) = patch.payee_revenue {
            self.payee_revenue = v;
        }
        if let Some(v) = patch.refund_amount {
            self.refund_amount = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = &patch.processor_status {
            self.processor_status = Some(v.clone());
        }
        if let Some(v) = &patch.failure_reason {
            self.failure_reason = Some(v.clone());
        }
        if let Some(v) = &patch.refund_reason {
            self.refund_reason = Some(v.clone());
        }
        if let Some(v) = &patch.webhook_event_id {
            self.webhook_event_id = Some(v.clone());
        }
        if let Some(v) = patch.paid_at {
            self.paid_at = Some(v);
        }
        if let Some(v) = patch.refunded_at {
            self.refunded_at = Some(v);
        }
        if let Some(v) = patch.last_synced_at {
            self.last_synced_at = Some(v);
        }
        self.updated_at = Timestamp::now();
    }

    /// Decides whether a charge's cumulative refund total should be written.
    pub fn refund_decision(&self, assessment: &RefundAssessment) -> RefundDecision {
        if assessment.refund_amount < self.refund_amount {
            RefundDecision::Stale
        } else if assessment.refund_amount == self.refund_amount
            && self.status == assessment.status
        {
            RefundDecision::AlreadyApplied
        } else if self.status != assessment.status
            && !self.status.can_transition_to(&assessment.status)
        {
            RefundDecision::Refused
        } else {
            RefundDecision::Apply
        }
    }
}

/// Fields for a new ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPaymentTransaction {
    pub booking: BookingRef,
    pub payer_id: Option<UserId>,
    pub payee_id: Option<UserId>,
    pub amount: i64,
    pub base_amount: i64,
    pub service_fee: i64,
    pub payee_revenue: i64,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub status: TransactionStatus,
    pub processor_status: Option<String>,
    pub metadata: serde_json::Value,
    pub webhook_event_id: Option<String>,
    pub paid_at: Option<Timestamp>,
}

impl NewPaymentTransaction {
    /// Rejects negative amounts and fees larger than the gross.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("amount", self.amount),
            ("base_amount", self.base_amount),
            ("service_fee", self.service_fee),
        ] {
            if value < 0 {
                return Err(ValidationError::negative_amount(field, value));
            }
        }
        if self.service_fee > self.amount {
            return Err(ValidationError::invalid_format(
                "service_fee",
                "platform fee exceeds gross amount",
            ));
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        Ok(())
    }
}

/// Partial update to a ledger row. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub refund_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub amount: Option<i64>,
    pub service_fee: Option<i64>,
    pub processor_fee: Option<i64>,
    pub net_amount: Option<i64>,
    pub payee_revenue: Option<i64>,
    pub refund_amount: Option<i64>,
    pub status: Option<TransactionStatus>,
    pub processor_status: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub webhook_event_id: Option<String>,
    pub paid_at: Option<Timestamp>,
    pub refunded_at: Option<Timestamp>,
    pub last_synced_at: Option<Timestamp>,
}

impl TransactionPatch {
    /// Overwrites the four settled-amount columns.
    pub fn settled(amounts: &SettledAmounts) -> Self {
        Self {
            amount: Some(amounts.gross),
            net_amount: Some(amounts.net),
            processor_fee: Some(amounts.processor_fee),
            service_fee: Some(amounts.platform_fee),
            last_synced_at: Some(Timestamp::now()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Refund state derived from a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundAssessment {
    /// Cumulative refunded amount, not a delta
    pub refund_amount: i64,
    pub status: TransactionStatus,
}

impl RefundAssessment {
    /// Classifies a charge by its refunded-vs-total amounts.
    ///
    /// Returns `None` when nothing has been refunded.
    pub fn from_charge(total: i64, amount_refunded: i64) -> Option<Self> {
        if amount_refunded <= 0 {
            return None;
        }
        let status = if amount_refunded >= total {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        };
        Some(Self {
            refund_amount: amount_refunded.min(total.max(0)),
            status,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundDecision {
    Apply,
    /// Same cumulative amount already recorded
    AlreadyApplied,
    /// Reports less than what is already recorded
    Stale,
    /// Current status cannot move to the refund status
    Refused,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::BookingId;
    use proptest::prelude::*;

    fn transaction(status: TransactionStatus, refund_amount: i64) -> PaymentTransaction {
        let now = Timestamp::now();
        PaymentTransaction {
            id: TransactionId::new(1),
            booking: BookingRef::kitchen(BookingId::new(1)),
            payer_id: None,
            payee_id: None,
            amount: 10_000,
            base_amount: 10_000,
            service_fee: 0,
            processor_fee: 0,
            payee_revenue: 10_000,
            refund_amount,
            net_amount: 10_000,
            currency: "usd".to_string(),
            payment_intent_id: Some("pi_1".to_string()),
            charge_id: None,
            refund_id: None,
            payment_method_id: None,
            status,
            processor_status: None,
            metadata: serde_json::json!({}),
            failure_reason: None,
            refund_reason: None,
            webhook_event_id: None,
            created_at: now,
            paid_at: None,
            refunded_at: None,
            last_synced_at: None,
            updated_at: now,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Refund classification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn partial_refund_of_ten_thousand() {
        let a = RefundAssessment::from_charge(10_000, 4_000).unwrap();
        assert_eq!(a.status, TransactionStatus::PartiallyRefunded);
        assert_eq!(a.refund_amount, 4_000);
        assert_eq!(a.status.payment_status(), PaymentStatus::PartiallyRefunded);
    }

    #[test]
    fn full_refund_of_ten_thousand() {
        let a = RefundAssessment::from_charge(10_000, 10_000).unwrap();
        assert_eq!(a.status, TransactionStatus::Refunded);
        assert_eq!(a.refund_amount, 10_000);
    }

    #[test]
    fn nothing_refunded_is_no_assessment() {
        assert!(RefundAssessment::from_charge(10_000, 0).is_none());
    }

    #[test]
    fn repeated_refund_event_is_already_applied() {
        let tx = transaction(TransactionStatus::PartiallyRefunded, 4_000);
        let a = RefundAssessment::from_charge(10_000, 4_000).unwrap();
        assert_eq!(tx.refund_decision(&a), RefundDecision::AlreadyApplied);
    }

    #[test]
    fn smaller_cumulative_refund_is_stale() {
        let tx = transaction(TransactionStatus::Refunded, 10_000);
        let a = RefundAssessment::from_charge(10_000, 4_000).unwrap();
        assert_eq!(tx.refund_decision(&a), RefundDecision::Stale);
    }

    #[test]
    fn failed_payment_refuses_refund() {
        let tx = transaction(TransactionStatus::Failed, 0);
        let a = RefundAssessment::from_charge(10_000, 4_000).unwrap();
        assert_eq!(tx.refund_decision(&a), RefundDecision::Refused);
    }

    #[test]
    fn refund_ahead_of_success_applies_to_pending_row() {
        let tx = transaction(TransactionStatus::Pending, 0);
        let a = RefundAssessment::from_charge(10_000, 4_000).unwrap();
        assert_eq!(tx.refund_decision(&a), RefundDecision::Apply);
        assert!(!TransactionStatus::PartiallyRefunded.can_transition_to(&TransactionStatus::Succeeded));
    }

    #[test]
    fn growing_partial_refund_applies() {
        let tx = transaction(TransactionStatus::PartiallyRefunded, 4_000);
        let a = RefundAssessment::from_charge(10_000, 6_000).unwrap();
        assert_eq!(tx.refund_decision(&a), RefundDecision::Apply);
    }

    // ══════════════════════════════════════════════════════════════
    // Patches
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn settled_patch_overwrites_four_amounts_only() {
        let mut tx = transaction(TransactionStatus::Succeeded, 0);
        tx.payee_revenue = 9_000;
        let patch = TransactionPatch::settled(&SettledAmounts {
            gross: 10_100,
            net: 9_400,
            processor_fee: 320,
            platform_fee: 380,
        });
        tx.apply(&patch);

        assert_eq!(tx.amount, 10_100);
        assert_eq!(tx.net_amount, 9_400);
        assert_eq!(tx.processor_fee, 320);
        assert_eq!(tx.service_fee, 380);
        assert_eq!(tx.payee_revenue, 9_000);
        assert!(tx.last_synced_at.is_some());
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(TransactionPatch::default().is_empty());
        assert!(!TransactionPatch {
            status: Some(TransactionStatus::Failed),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn new_transaction_rejects_fee_above_gross() {
        let new = NewPaymentTransaction {
            booking: BookingRef::kitchen(BookingId::new(1)),
            payer_id: None,
            payee_id: None,
            amount: 100,
            base_amount: 100,
            service_fee: 150,
            payee_revenue: -50,
            currency: "usd".to_string(),
            payment_intent_id: None,
            payment_method_id: None,
            status: TransactionStatus::Pending,
            processor_status: None,
            metadata: serde_json::json!({}),
            webhook_event_id: None,
            paid_at: None,
        };
        assert!(new.validate().is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // State machine
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn succeeded_cannot_fail() {
        assert!(!TransactionStatus::Succeeded.can_transition_to(&TransactionStatus::Failed));
        assert!(!TransactionStatus::Succeeded.can_transition_to(&TransactionStatus::Canceled));
    }

    #[test]
    fn terminal_transaction_states() {
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Canceled.is_terminal());
        assert!(TransactionStatus::Refunded.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }

    fn any_status() -> impl Strategy<Value = TransactionStatus> {
        prop::sample::select(TransactionStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn refund_classification_is_consistent(total in 1i64..1_000_000, refunded in 1i64..2_000_000) {
            let a = RefundAssessment::from_charge(total, refunded).unwrap();
            prop_assert!(a.refund_amount <= total);
            prop_assert_eq!(a.status == TransactionStatus::Refunded, refunded >= total);
        }

        #[test]
        fn transitions_agree_with_projected_payment_status(from in any_status(), to in any_status()) {
            // Every ledger edge is legal (or a no-op) on the booking projection.
            if from.can_transition_to(&to) {
                let (pf, pt) = (from.payment_status(), to.payment_status());
                prop_assert!(pf == pt || pf.can_transition_to(&pt));
            }
        }
    }
}
