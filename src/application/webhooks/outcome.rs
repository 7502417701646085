//! What handling an event changed.

use crate::domain::foundation::{BookingId, ExtensionId, TransactionId, UserId};
use crate::domain::payments::{BookingRef, OnboardingStatus, TransactionStatus};
use crate::ports::{PayoutOutcome, SyncOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    /// Checkout produced a booking and its ledger row.
    BookingMaterialized {
        booking: BookingRef,
        transaction_id: TransactionId,
    },
    ExtensionMaterialized {
        extension_id: ExtensionId,
        storage_booking_id: BookingId,
    },
    PaymentRecorded {
        transaction_id: TransactionId,
        status: TransactionStatus,
        /// This event moved the row into `status`
        transitioned: bool,
    },
    /// No ledger row; only booking projections were touched.
    BookingsSynced(SyncOutcome),
    RefundRecorded {
        transaction_id: TransactionId,
        refund_amount: i64,
        status: TransactionStatus,
    },
    OnboardingUpdated {
        payee_id: UserId,
        status: OnboardingStatus,
    },
    PayoutRecorded {
        payout_id: String,
        outcome: PayoutOutcome,
    },
    /// Every write this event implies is already in place.
    AlreadyApplied(String),
    /// Nothing to do for this event.
    Ignored(String),
}

impl ReconciliationOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, ReconciliationOutcome::Ignored(_))
    }

    /// Stable label for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconciliationOutcome::BookingMaterialized { .. } => "booking_materialized",
            ReconciliationOutcome::ExtensionMaterialized { .. } => "extension_materialized",
            ReconciliationOutcome::PaymentRecorded { .. } => "payment_recorded",
            ReconciliationOutcome::BookingsSynced(_) => "bookings_synced",
            ReconciliationOutcome::RefundRecorded { .. } => "refund_recorded",
            ReconciliationOutcome::OnboardingUpdated { .. } => "onboarding_updated",
            ReconciliationOutcome::PayoutRecorded { .. } => "payout_recorded",
            ReconciliationOutcome::AlreadyApplied(_) => "already_applied",
            ReconciliationOutcome::Ignored(_) => "ignored",
        }
    }
}
