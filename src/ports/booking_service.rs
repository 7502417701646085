//! Booking domain service port.
//!
//! Only the creation operations used by deferred materialization are
//! consumed here.

use async_trait::async_trait;

use crate::domain::foundation::{BookingId, DomainError, ExtensionId};
use crate::domain::payments::{
    Booking, ExtensionUpdate, NewKitchenBooking, NewStorageExtension, PendingStorageExtension,
};

#[async_trait]
pub trait BookingService: Send + Sync {
    async fn create_kitchen_booking(&self, new: &NewKitchenBooking) -> Result<Booking, DomainError>;

    async fn create_pending_storage_extension(
        &self,
        new: &NewStorageExtension,
    ) -> Result<PendingStorageExtension, DomainError>;

    /// Extension for `(storage_booking_id, checkout_session_id)`, if any.
    async fn get_pending_storage_extension(
        &self,
        storage_booking_id: BookingId,
        checkout_session_id: &str,
    ) -> Result<Option<PendingStorageExtension>, DomainError>;

    async fn update_pending_storage_extension(
        &self,
        id: ExtensionId,
        update: &ExtensionUpdate,
    ) -> Result<PendingStorageExtension, DomainError>;
}
