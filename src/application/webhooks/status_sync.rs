//! Booking payment-status projection.

use std::sync::Arc;

use crate::domain::payments::{PaymentStatus, WebhookError};
use crate::ports::{BookingStore, SyncOutcome};

/// Projects a ledger status onto every booking table in one atomic write.
///
/// Rows whose current status cannot legally move to the target are left
/// untouched by the store's guard, so late or reordered events never
/// regress a booking.
pub struct StatusSynchronizer {
    bookings: Arc<dyn BookingStore>,
}

impl StatusSynchronizer {
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }

    pub async fn sync(
        &self,
        payment_intent_id: &str,
        target: PaymentStatus,
    ) -> Result<SyncOutcome, WebhookError> {
        let outcome = self
            .bookings
            .sync_payment_status(payment_intent_id, target)
            .await?;
        tracing::info!(
            payment_intent_id,
            target = target.as_str(),
            kitchen = outcome.kitchen,
            storage = outcome.storage,
            equipment = outcome.equipment,
            "booking payment status synced"
        );
        Ok(outcome)
    }
}
