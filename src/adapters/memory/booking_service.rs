//! In-memory booking service.
//!
//! Writes through to an [`InMemoryBookingStore`] so bookings created by the
//! service are visible to reconciliation reads.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::InMemoryBookingStore;
use crate::domain::foundation::{BookingId, DomainError, ErrorCode, ExtensionId, Timestamp};
use crate::domain::payments::{
    Booking, ExtensionUpdate, NewKitchenBooking, NewStorageExtension, PendingStorageExtension,
};
use crate::ports::BookingService;

#[derive(Default)]
struct ExtensionTable {
    rows: Vec<PendingStorageExtension>,
    next_id: i64,
}

pub struct InMemoryBookingService {
    store: Arc<InMemoryBookingStore>,
    extensions: RwLock<ExtensionTable>,
    unavailable: AtomicBool,
}

impl InMemoryBookingService {
    pub fn new(store: Arc<InMemoryBookingStore>) -> Self {
        Self {
            store,
            extensions: RwLock::new(ExtensionTable::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Every call fails as if the service were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn extensions(&self) -> Vec<PendingStorageExtension> {
        self.extensions.read().await.rows.clone()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::BookingServiceError,
                "booking service unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn create_kitchen_booking(&self, new: &NewKitchenBooking) -> Result<Booking, DomainError> {
        self.check_available()?;
        self.store.create_kitchen_row(new).await
    }

    async fn create_pending_storage_extension(
        &self,
        new: &NewStorageExtension,
    ) -> Result<PendingStorageExtension, DomainError> {
        self.check_available()?;
        let mut table = self.extensions.write().await;
        let duplicate = table.rows.iter().any(|e| {
            e.storage_booking_id == new.storage_booking_id
                && e.checkout_session_id == new.checkout_session_id
        });
        if duplicate {
            return Err(DomainError::new(
                ErrorCode::DuplicateKey,
                format!(
                    "extension for booking {} and session {} exists",
                    new.storage_booking_id, new.checkout_session_id
                ),
            ));
        }

        table.next_id += 1;
        let extension = PendingStorageExtension {
            id: ExtensionId::new(table.next_id),
            storage_booking_id: new.storage_booking_id,
            new_end_date: new.new_end_date,
            extension_days: new.extension_days,
            extension_base_price: new.extension_base_price,
            extension_service_fee: new.extension_service_fee,
            extension_total_price: new.extension_total_price,
            checkout_session_id: new.checkout_session_id.clone(),
            payment_intent_id: new.payment_intent_id.clone(),
            status: new.status,
            created_at: Timestamp::now(),
        };
        table.rows.push(extension.clone());
        Ok(extension)
    }

    async fn get_pending_storage_extension(
        &self,
        storage_booking_id: BookingId,
        checkout_session_id: &str,
    ) -> Result<Option<PendingStorageExtension>, DomainError> {
        self.check_available()?;
        let table = self.extensions.read().await;
        Ok(table
            .rows
            .iter()
            .find(|e| {
                e.storage_booking_id == storage_booking_id
                    && e.checkout_session_id == checkout_session_id
            })
            .cloned())
    }

    async fn update_pending_storage_extension(
        &self,
        id: ExtensionId,
        update: &ExtensionUpdate,
    ) -> Result<PendingStorageExtension, DomainError> {
        self.check_available()?;
        let mut table = self.extensions.write().await;
        let row = table.rows.iter_mut().find(|e| e.id == id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::ExtensionNotFound,
                format!("extension {} not found", id),
            )
        })?;
        if let Some(status) = update.status {
            row.status = status;
        }
        if let Some(intent) = &update.payment_intent_id {
            row.payment_intent_id = Some(intent.clone());
        }
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payments::ExtensionStatus;

    fn new_extension(session: &str) -> NewStorageExtension {
        NewStorageExtension {
            storage_booking_id: BookingId::new(4),
            chef_id: None,
            new_end_date: Timestamp::now().add_days(7),
            extension_days: 7,
            extension_base_price: 7_000,
            extension_service_fee: 350,
            extension_total_price: 7_350,
            checkout_session_id: session.to_string(),
            payment_intent_id: Some("pi_ext".to_string()),
            status: ExtensionStatus::Paid,
        }
    }

    #[tokio::test]
    async fn duplicate_extension_is_rejected() {
        let service = InMemoryBookingService::new(Arc::new(InMemoryBookingStore::new()));
        service
            .create_pending_storage_extension(&new_extension("cs_1"))
            .await
            .unwrap();

        let err = service
            .create_pending_storage_extension(&new_extension("cs_1"))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::DuplicateKey);
        assert_eq!(service.extensions().await.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_service_fails_every_call() {
        let service = InMemoryBookingService::new(Arc::new(InMemoryBookingStore::new()));
        service.set_unavailable(true);
        let err = service
            .get_pending_storage_extension(BookingId::new(4), "cs_1")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BookingServiceError);
    }
}
