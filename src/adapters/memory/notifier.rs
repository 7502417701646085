//! Notifier that records what it was asked to send.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::foundation::{ExtensionId, UserId};
use crate::domain::payments::PendingStorageExtension;
use crate::ports::{
    NewBookingNotice, NotificationError, Notifier, PaymentNotice, PayoutRecord, Recipient,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SentNotification {
    NewBooking {
        recipient: Recipient,
        notice: NewBookingNotice,
    },
    PaymentReceived {
        payee_id: UserId,
        notice: PaymentNotice,
    },
    PaymentFailed {
        payee_id: UserId,
        notice: PaymentNotice,
    },
    ExtensionPaid {
        payee_id: UserId,
        extension_id: ExtensionId,
    },
    Payout {
        payee_id: UserId,
        payout_id: String,
    },
}

/// Records notifications instead of delivering them. Can be switched to
/// fail every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }

    async fn record(&self, notification: SentNotification) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Delivery("smtp unreachable".to_string()));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_new_booking(
        &self,
        recipient: Recipient,
        notice: &NewBookingNotice,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::NewBooking {
            recipient,
            notice: notice.clone(),
        })
        .await
    }

    async fn notify_payment_received(
        &self,
        payee_id: UserId,
        notice: &PaymentNotice,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::PaymentReceived {
            payee_id,
            notice: notice.clone(),
        })
        .await
    }

    async fn notify_payment_failed(
        &self,
        payee_id: UserId,
        notice: &PaymentNotice,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::PaymentFailed {
            payee_id,
            notice: notice.clone(),
        })
        .await
    }

    async fn notify_extension_paid(
        &self,
        payee_id: UserId,
        extension: &PendingStorageExtension,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::ExtensionPaid {
            payee_id,
            extension_id: extension.id,
        })
        .await
    }

    async fn notify_payout(
        &self,
        payee_id: UserId,
        payout: &PayoutRecord,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::Payout {
            payee_id,
            payout_id: payout.payout_id.clone(),
        })
        .await
    }
}
