//! Notification port.
//!
//! Receives fully resolved facts. Delivery and content belong to the
//! notification service; reconciliation never fails because of it.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::payee_directory::PayoutRecord;
use crate::domain::foundation::{ResourceId, Timestamp, UserId};
use crate::domain::payments::{BookingRef, PendingStorageExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "user_id", rename_all = "snake_case")]
pub enum Recipient {
    Renter(UserId),
    Payee(UserId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBookingNotice {
    pub booking: BookingRef,
    pub resource_id: ResourceId,
    pub renter_id: UserId,
    pub payee_id: Option<UserId>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentNotice {
    pub payment_intent_id: String,
    pub booking: BookingRef,
    pub amount: i64,
    pub currency: String,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("recipient {0} has no contact details")]
    UnknownRecipient(UserId),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new_booking(
        &self,
        recipient: Recipient,
        notice: &NewBookingNotice,
    ) -> Result<(), NotificationError>;

    async fn notify_payment_received(
        &self,
        payee_id: UserId,
        notice: &PaymentNotice,
    ) -> Result<(), NotificationError>;

    async fn notify_payment_failed(
        &self,
        payee_id: UserId,
        notice: &PaymentNotice,
    ) -> Result<(), NotificationError>;

    /// Tells the payee a storage extension was paid and awaits approval.
    async fn notify_extension_paid(
        &self,
        payee_id: UserId,
        extension: &PendingStorageExtension,
    ) -> Result<(), NotificationError>;

    /// Optional; not every deployment tells payees about payouts.
    async fn notify_payout(
        &self,
        _payee_id: UserId,
        _payout: &PayoutRecord,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}
