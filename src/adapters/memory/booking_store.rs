//! In-memory booking tables.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{BookingId, DomainError, ErrorCode, StateMachine, Timestamp};
use crate::domain::payments::{
    Booking, BookingRef, BookingType, NewKitchenBooking, PaymentStatus,
};
use crate::ports::{BookingStore, SyncOutcome};

#[derive(Default)]
struct Tables {
    rows: HashMap<BookingRef, Booking>,
    next_ids: HashMap<BookingType, i64>,
}

impl Tables {
    fn next_id(&mut self, booking_type: BookingType) -> BookingId {
        let next = self.next_ids.entry(booking_type).or_insert(0);
        *next += 1;
        BookingId::new(*next)
    }
}

/// Kitchen, storage and equipment bookings in one map keyed by
/// [`BookingRef`].
#[derive(Default)]
pub struct InMemoryBookingStore {
    tables: RwLock<Tables>,
    fail_direct_inserts: AtomicBool,
    drop_direct_inserts: AtomicBool,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct inserts return a database error.
    pub fn set_direct_insert_failure(&self, fail: bool) {
        self.fail_direct_inserts.store(fail, Ordering::SeqCst);
    }

    /// Direct inserts report an id but store nothing, so the read-back
    /// comes up empty.
    pub fn set_direct_insert_dropped(&self, drop: bool) {
        self.drop_direct_inserts.store(drop, Ordering::SeqCst);
    }

    /// Stores a booking as-is, assigning an id when it has none.
    pub async fn seed(&self, mut booking: Booking) -> Booking {
        let mut tables = self.tables.write().await;
        if booking.id.as_i64() == 0 {
            booking.id = tables.next_id(booking.booking_type);
        } else {
            let next = tables.next_ids.entry(booking.booking_type).or_insert(0);
            *next = (*next).max(booking.id.as_i64());
        }
        tables.rows.insert(booking.reference(), booking.clone());
        booking
    }

    /// Writes a kitchen booking, rejecting a second row for the same payment
    /// intent. Shared with the in-memory booking service.
    pub async fn create_kitchen_row(&self, new: &NewKitchenBooking) -> Result<Booking, DomainError> {
        let mut tables = self.tables.write().await;
        if let Some(intent) = new.payment_intent_id.as_deref() {
            let taken = tables.rows.values().any(|b| {
                b.booking_type == BookingType::Kitchen
                    && b.payment_intent_id.as_deref() == Some(intent)
            });
            if taken {
                return Err(DomainError::new(
                    ErrorCode::DuplicateKey,
                    format!("kitchen booking for payment intent {} exists", intent),
                ));
            }
        }
        let booking = Booking {
            id: tables.next_id(BookingType::Kitchen),
            booking_type: BookingType::Kitchen,
            renter_id: new.chef_id,
            resource_id: new.kitchen_id,
            start_time: new.start_time,
            end_time: new.end_time,
            status: new.status,
            payment_status: new.payment_status,
            payment_intent_id: new.payment_intent_id.clone(),
            checkout_session_id: new.checkout_session_id.clone(),
            total_price: new.total_price,
            service_fee: new.service_fee,
            processor_fee: None,
            payee_net: None,
            notes: new.notes.clone(),
            created_at: Timestamp::now(),
        };
        tables.rows.insert(booking.reference(), booking.clone());
        Ok(booking)
    }

    pub async fn all(&self) -> Vec<Booking> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Booking> = tables.rows.values().cloned().collect();
        rows.sort_by_key(|b| (b.booking_type.as_str(), b.id));
        rows
    }

    pub async fn count_of(&self, booking_type: BookingType) -> usize {
        let tables = self.tables.read().await;
        tables
            .rows
            .keys()
            .filter(|r| r.booking_type == booking_type)
            .count()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Vec<Booking>, DomainError> {
        let tables = self.tables.read().await;
        let mut found: Vec<Booking> = tables
            .rows
            .values()
            .filter(|b| b.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned()
            .collect();
        found.sort_by_key(|b| (b.booking_type.as_str(), b.id));
        Ok(found)
    }

    async fn find_by_id(&self, booking: BookingRef) -> Result<Option<Booking>, DomainError> {
        Ok(self.tables.read().await.rows.get(&booking).cloned())
    }

    async fn insert_kitchen_booking(
        &self,
        new: &NewKitchenBooking,
    ) -> Result<BookingId, DomainError> {
        if self.fail_direct_inserts.load(Ordering::SeqCst) {
            return Err(DomainError::database("kitchen_bookings insert failed"));
        }
        if self.drop_direct_inserts.load(Ordering::SeqCst) {
            let mut tables = self.tables.write().await;
            return Ok(tables.next_id(BookingType::Kitchen));
        }
        Ok(self.create_kitchen_row(new).await?.id)
    }

    async fn sync_payment_status(
        &self,
        payment_intent_id: &str,
        target: PaymentStatus,
    ) -> Result<SyncOutcome, DomainError> {
        let sources = PaymentStatus::sources_of(target);
        let mut tables = self.tables.write().await;
        let mut outcome = SyncOutcome::default();
        for booking in tables.rows.values_mut() {
            if booking.payment_intent_id.as_deref() == Some(payment_intent_id)
                && sources.contains(&booking.payment_status)
            {
                booking.payment_status = target;
                outcome.record(booking.booking_type, 1);
            }
        }
        Ok(outcome)
    }

    async fn attach_payment_intent(
        &self,
        booking: BookingRef,
        payment_intent_id: &str,
    ) -> Result<(), DomainError> {
        let mut tables = self.tables.write().await;
        let row = tables.rows.get_mut(&booking).ok_or_else(|| {
            DomainError::new(
                ErrorCode::BookingNotFound,
                format!("{} booking {} not found", booking.booking_type, booking.id),
            )
        })?;
        if row.payment_intent_id.is_none() {
            row.payment_intent_id = Some(payment_intent_id.to_string());
        }
        Ok(())
    }

    async fn apply_settled_fees(
        &self,
        payment_intent_id: &str,
        processor_fee: i64,
        payee_net: i64,
    ) -> Result<u64, DomainError> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for booking in tables.rows.values_mut() {
            if booking.payment_intent_id.as_deref() == Some(payment_intent_id) {
                booking.processor_fee = Some(processor_fee);
                booking.payee_net = Some(payee_net);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
