//! Ledger upserts for payment outcomes.
//!
//! Whichever event reaches a payment intent first creates its row; every
//! later event finds it by intent id and updates it. Status writes are
//! compare-and-set on the legal source states, which makes a concurrent
//! duplicate lose cleanly instead of double-applying.

use std::sync::Arc;

use crate::domain::foundation::{StateMachine, Timestamp};
use crate::domain::payments::{
    Booking, NewPaymentTransaction, PaymentTransaction, TransactionPatch, TransactionStatus,
    WebhookError,
};
use crate::ports::{BookingStore, LedgerInsert, Payee, PayeeDirectory, TransactionLedger};

/// A successful payment as reported by the processor.
#[derive(Debug, Clone)]
pub struct SucceededPayment<'a> {
    pub payment_intent_id: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub charge_id: Option<&'a str>,
    pub payment_method_id: Option<&'a str>,
    /// Platform fee taken on the charge, when the processor reports one
    pub application_fee: Option<i64>,
    /// Connected account the funds were transferred to
    pub payee_account: Option<&'a str>,
    pub event_id: &'a str,
}

/// A failed or canceled payment.
#[derive(Debug, Clone)]
pub struct FailedPayment<'a> {
    pub payment_intent_id: &'a str,
    /// `Failed` or `Canceled`
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub processor_status: &'a str,
    pub event_id: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPayment {
    /// Row moved into the reported status by this call.
    Transitioned(PaymentTransaction),
    /// Row already had the status; identifiers refreshed.
    Refreshed(PaymentTransaction),
    /// Row is in a state the reported status cannot follow. Left alone.
    Preserved(PaymentTransaction),
    /// This delivery was applied before.
    Duplicate(PaymentTransaction),
}

impl RecordedPayment {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            RecordedPayment::Transitioned(tx)
            | RecordedPayment::Refreshed(tx)
            | RecordedPayment::Preserved(tx)
            | RecordedPayment::Duplicate(tx) => tx,
        }
    }

    pub fn transitioned(&self) -> bool {
        matches!(self, RecordedPayment::Transitioned(_))
    }
}

pub struct PaymentLedger {
    ledger: Arc<dyn TransactionLedger>,
    bookings: Arc<dyn BookingStore>,
    payees: Arc<dyn PayeeDirectory>,
}

impl PaymentLedger {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        bookings: Arc<dyn BookingStore>,
        payees: Arc<dyn PayeeDirectory>,
    ) -> Self {
        Self {
            ledger,
            bookings,
            payees,
        }
    }

    pub async fn has_row(&self, payment_intent_id: &str) -> Result<bool, WebhookError> {
        Ok(self
            .ledger
            .find_by_payment_intent(payment_intent_id)
            .await?
            .is_some())
    }

    /// Records a success, creating the row from the funded booking when no
    /// row exists yet.
    ///
    /// Returns `None` when neither a row nor a booking references the
    /// intent; the event that creates the booking will write the row.
    pub async fn record_success(
        &self,
        payment: &SucceededPayment<'_>,
    ) -> Result<Option<RecordedPayment>, WebhookError> {
        if let Some(tx) = self
            .ledger
            .find_by_payment_intent(payment.payment_intent_id)
            .await?
        {
            return self.advance_to_succeeded(tx, payment).await.map(Some);
        }

        let bookings = self
            .bookings
            .find_by_payment_intent(payment.payment_intent_id)
            .await?;
        let Some(booking) = bookings.first() else {
            return Ok(None);
        };

        // Rows written at checkout creation predate the intent id
        if let Some(tx) = self.ledger.find_by_booking(booking.reference()).await? {
            if tx.payment_intent_id.is_none() {
                let patch = TransactionPatch {
                    payment_intent_id: Some(payment.payment_intent_id.to_string()),
                    ..Default::default()
                };
                let tx = self.ledger.update(tx.id, &patch).await?;
                return self.advance_to_succeeded(tx, payment).await.map(Some);
            }
        }

        let payee = self.payee_for(booking).await?;
        let service_fee = payment.application_fee.unwrap_or(booking.service_fee);
        let payee_revenue = payment.amount.checked_sub(service_fee).ok_or_else(|| {
            WebhookError::InvalidMetadata(format!(
                "amount {} cannot carry fee {}",
                payment.amount, service_fee
            ))
        })?;
        let new = NewPaymentTransaction {
            booking: booking.reference(),
            payer_id: Some(booking.renter_id),
            payee_id: payee.map(|p| p.user_id),
            amount: payment.amount,
            base_amount: booking.total_price,
            service_fee,
            payee_revenue,
            currency: payment.currency.to_string(),
            payment_intent_id: Some(payment.payment_intent_id.to_string()),
            payment_method_id: payment.payment_method_id.map(str::to_string),
            status: TransactionStatus::Succeeded,
            processor_status: Some("succeeded".to_string()),
            metadata: serde_json::json!({ "source": "payment_intent.succeeded" }),
            webhook_event_id: Some(payment.event_id.to_string()),
            paid_at: Some(Timestamp::now()),
        };

        match self.ledger.create(new).await? {
            LedgerInsert::Created(tx) => {
                tracing::info!(
                    transaction_id = %tx.id,
                    payment_intent_id = payment.payment_intent_id,
                    "ledger row created from payment intent"
                );
                let tx = match payment.charge_id {
                    Some(charge_id) => {
                        let patch = TransactionPatch {
                            charge_id: Some(charge_id.to_string()),
                            ..Default::default()
                        };
                        self.ledger.update(tx.id, &patch).await?
                    }
                    None => tx,
                };
                Ok(Some(RecordedPayment::Transitioned(tx)))
            }
            // A concurrent delivery created it first
            LedgerInsert::Existing(tx) => self.advance_to_succeeded(tx, payment).await.map(Some),
        }
    }

    async fn advance_to_succeeded(
        &self,
        tx: PaymentTransaction,
        payment: &SucceededPayment<'_>,
    ) -> Result<RecordedPayment, WebhookError> {
        let target = TransactionStatus::Succeeded;
        if tx.status == target && tx.webhook_event_id.as_deref() == Some(payment.event_id) {
            return Ok(RecordedPayment::Duplicate(tx));
        }

        let identifiers = TransactionPatch {
            charge_id: payment.charge_id.map(str::to_string),
            payment_method_id: payment.payment_method_id.map(str::to_string),
            processor_status: Some("succeeded".to_string()),
            webhook_event_id: Some(payment.event_id.to_string()),
            ..Default::default()
        };

        if tx.status == target {
            let tx = self.ledger.update(tx.id, &identifiers).await?;
            return Ok(RecordedPayment::Refreshed(tx));
        }

        if !tx.status.can_transition_to(&target) {
            tracing::warn!(
                transaction_id = %tx.id,
                from = tx.status.as_str(),
                to = target.as_str(),
                "ignoring success for transaction in later state"
            );
            return Ok(RecordedPayment::Preserved(tx));
        }

        let patch = TransactionPatch {
            status: Some(target),
            amount: Some(payment.amount),
            paid_at: Some(Timestamp::now()),
            ..identifiers
        };
        let sources = TransactionStatus::sources_of(target);
        self.compare_and_set(tx, &sources, &patch).await
    }

    /// Records a failure or cancellation. `None` when no row references the
    /// intent.
    pub async fn record_failure(
        &self,
        payment: &FailedPayment<'_>,
    ) -> Result<Option<RecordedPayment>, WebhookError> {
        let Some(tx) = self
            .ledger
            .find_by_payment_intent(payment.payment_intent_id)
            .await?
        else {
            return Ok(None);
        };

        let target = payment.status;
        if tx.status == target {
            return Ok(Some(RecordedPayment::Duplicate(tx)));
        }
        if !tx.status.can_transition_to(&target) {
            tracing::warn!(
                transaction_id = %tx.id,
                from = tx.status.as_str(),
                to = target.as_str(),
                "refusing illegal transaction status transition"
            );
            return Ok(Some(RecordedPayment::Preserved(tx)));
        }

        let patch = TransactionPatch {
            status: Some(target),
            failure_reason: payment.failure_reason.clone(),
            processor_status: Some(payment.processor_status.to_string()),
            webhook_event_id: Some(payment.event_id.to_string()),
            ..Default::default()
        };
        let sources = TransactionStatus::sources_of(target);
        self.compare_and_set(tx, &sources, &patch).await.map(Some)
    }

    async fn compare_and_set(
        &self,
        tx: PaymentTransaction,
        sources: &[TransactionStatus],
        patch: &TransactionPatch,
    ) -> Result<RecordedPayment, WebhookError> {
        match self.ledger.update_if_status(tx.id, sources, patch).await? {
            Some(updated) => Ok(RecordedPayment::Transitioned(updated)),
            None => {
                // Status moved underneath us; report what is there now
                let current = match tx.payment_intent_id.as_deref() {
                    Some(intent) => self.ledger.find_by_payment_intent(intent).await?,
                    None => None,
                };
                Ok(RecordedPayment::Preserved(current.unwrap_or(tx)))
            }
        }
    }

    async fn payee_for(&self, booking: &Booking) -> Result<Option<Payee>, WebhookError> {
        Ok(self
            .payees
            .find_payee_for_resource(booking.booking_type, booking.resource_id)
            .await?)
    }
}
