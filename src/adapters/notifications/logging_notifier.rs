//! Notifier that emits structured log lines.
//!
//! Stands in for the notification service in deployments where delivery is
//! handled by a log-shipping pipeline.

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::domain::payments::PendingStorageExtension;
use crate::ports::{
    NewBookingNotice, NotificationError, Notifier, PaymentNotice, PayoutRecord, Recipient,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_new_booking(
        &self,
        recipient: Recipient,
        notice: &NewBookingNotice,
    ) -> Result<(), NotificationError> {
        let (role, user_id) = match recipient {
            Recipient::Renter(id) => ("renter", id),
            Recipient::Payee(id) => ("payee", id),
        };
        tracing::info!(
            notification = "new_booking",
            role,
            user_id = %user_id,
            booking_id = %notice.booking.id,
            booking_type = %notice.booking.booking_type,
            amount = notice.amount,
            currency = %notice.currency,
            "notification queued"
        );
        Ok(())
    }

    async fn notify_payment_received(
        &self,
        payee_id: UserId,
        notice: &PaymentNotice,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            notification = "payment_received",
            user_id = %payee_id,
            payment_intent_id = %notice.payment_intent_id,
            amount = notice.amount,
            currency = %notice.currency,
            "notification queued"
        );
        Ok(())
    }

    async fn notify_payment_failed(
        &self,
        payee_id: UserId,
        notice: &PaymentNotice,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            notification = "payment_failed",
            user_id = %payee_id,
            payment_intent_id = %notice.payment_intent_id,
            reason = notice.failure_reason.as_deref().unwrap_or("unknown"),
            "notification queued"
        );
        Ok(())
    }

    async fn notify_extension_paid(
        &self,
        payee_id: UserId,
        extension: &PendingStorageExtension,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            notification = "extension_paid",
            user_id = %payee_id,
            extension_id = %extension.id,
            storage_booking_id = %extension.storage_booking_id,
            extension_days = extension.extension_days,
            "notification queued"
        );
        Ok(())
    }

    async fn notify_payout(
        &self,
        payee_id: UserId,
        payout: &PayoutRecord,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            notification = "payout",
            user_id = %payee_id,
            payout_id = %payout.payout_id,
            outcome = payout.outcome.as_str(),
            amount = payout.amount,
            "notification queued"
        );
        Ok(())
    }
}
