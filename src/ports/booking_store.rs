//! Booking persistence port used by reconciliation.
//!
//! Covers the kitchen, storage and equipment booking tables. General booking
//! CRUD is owned by the booking service; this port only reads rows by
//! payment key, writes the fallback insert, and projects payment state.

use async_trait::async_trait;

use crate::domain::foundation::{BookingId, DomainError};
use crate::domain::payments::{Booking, BookingRef, BookingType, NewKitchenBooking, PaymentStatus};

/// Rows changed by one status projection, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub kitchen: u64,
    pub storage: u64,
    pub equipment: u64,
}

impl SyncOutcome {
    pub fn total(&self) -> u64 {
        self.kitchen + self.storage + self.equipment
    }

    pub fn record(&mut self, booking_type: BookingType, rows: u64) {
        match booking_type {
            BookingType::Kitchen => self.kitchen += rows,
            BookingType::Storage => self.storage += rows,
            BookingType::Equipment => self.equipment += rows,
        }
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookings of every type carrying this payment intent id.
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Vec<Booking>, DomainError>;

    async fn find_by_id(&self, booking: BookingRef) -> Result<Option<Booking>, DomainError>;

    /// Direct insert into the kitchen booking table, bypassing the service.
    async fn insert_kitchen_booking(
        &self,
        new: &NewKitchenBooking,
    ) -> Result<BookingId, DomainError>;

    /// Moves `payment_status` to `target` on every booking sharing the
    /// intent, skipping rows whose current status cannot reach `target`.
    ///
    /// All three tables are written in one database transaction.
    async fn sync_payment_status(
        &self,
        payment_intent_id: &str,
        target: PaymentStatus,
    ) -> Result<SyncOutcome, DomainError>;

    /// Records the intent id on a booking created before checkout.
    async fn attach_payment_intent(
        &self,
        booking: BookingRef,
        payment_intent_id: &str,
    ) -> Result<(), DomainError>;

    /// Copies settled processor fee and payee net onto bookings for the intent.
    async fn apply_settled_fees(
        &self,
        payment_intent_id: &str,
        processor_fee: i64,
        payee_net: i64,
    ) -> Result<u64, DomainError>;
}
