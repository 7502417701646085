//! PostgreSQL-backed booking service.
//!
//! Creation paths used by deferred materialization: kitchen bookings and
//! pending storage extensions. The kitchen insert checks the kitchen exists
//! inside the same transaction as the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::booking_store::insert_kitchen_row;
use crate::domain::foundation::{
    BookingId, DomainError, ErrorCode, ExtensionId, Timestamp,
};
use crate::domain::payments::{
    Booking, BookingType, ExtensionUpdate, NewKitchenBooking, NewStorageExtension,
    PendingStorageExtension,
};
use crate::ports::BookingService;

const EXTENSION_COLUMNS: &str = r#"
    id, storage_booking_id, new_end_date, extension_days, extension_base_price,
    extension_service_fee, extension_total_price, checkout_session_id, payment_intent_id,
    status, created_at
"#;

pub struct PostgresBookingService {
    pool: PgPool,
}

impl PostgresBookingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExtensionRow {
    id: i64,
    storage_booking_id: i64,
    new_end_date: DateTime<Utc>,
    extension_days: i32,
    extension_base_price: i64,
    extension_service_fee: i64,
    extension_total_price: i64,
    checkout_session_id: String,
    payment_intent_id: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExtensionRow> for PendingStorageExtension {
    type Error = DomainError;

    fn try_from(row: ExtensionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            DomainError::database(format!("Invalid extension status value: {}", row.status))
        })?;
        Ok(PendingStorageExtension {
            id: ExtensionId::new(row.id),
            storage_booking_id: BookingId::new(row.storage_booking_id),
            new_end_date: Timestamp::from_datetime(row.new_end_date),
            extension_days: row.extension_days,
            extension_base_price: row.extension_base_price,
            extension_service_fee: row.extension_service_fee,
            extension_total_price: row.extension_total_price,
            checkout_session_id: row.checkout_session_id,
            payment_intent_id: row.payment_intent_id,
            status,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

/// Maps unique violations on `constraint` to `DuplicateKey`.
fn write_error(action: &str, constraint: &str, e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.constraint() == Some(constraint) {
            return DomainError::new(ErrorCode::DuplicateKey, format!("Failed to {}: {}", action, e));
        }
    }
    DomainError::new(
        ErrorCode::BookingServiceError,
        format!("Failed to {}: {}", action, e),
    )
}

fn read_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(
        ErrorCode::BookingServiceError,
        format!("Failed to {}: {}", action, e),
    )
}

#[async_trait]
impl BookingService for PostgresBookingService {
    async fn create_kitchen_booking(&self, new: &NewKitchenBooking) -> Result<Booking, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| read_error("begin booking", e))?;

        let kitchen: Option<(i64,)> = sqlx::query_as("SELECT id FROM kitchens WHERE id = $1")
            .bind(new.kitchen_id.as_i64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| read_error("find kitchen", e))?;
        if kitchen.is_none() {
            return Err(DomainError::validation(
                "kitchen_id",
                format!("Kitchen {} does not exist", new.kitchen_id),
            ));
        }

        let row = insert_kitchen_row(&mut *tx, new)
            .await
            .map_err(|e| write_error("create kitchen booking", "kitchen_bookings_payment_intent_key", e))?;
        tx.commit()
            .await
            .map_err(|e| read_error("commit booking", e))?;

        let booking = row.into_booking(BookingType::Kitchen)?;
        tracing::info!(
            booking_id = %booking.id,
            kitchen_id = %new.kitchen_id,
            chef_id = %new.chef_id,
            "kitchen booking created"
        );
        Ok(booking)
    }

    async fn create_pending_storage_extension(
        &self,
        new: &NewStorageExtension,
    ) -> Result<PendingStorageExtension, DomainError> {
        let sql = format!(
            r#"
            INSERT INTO pending_storage_extensions (
                storage_booking_id, chef_id, new_end_date, extension_days, extension_base_price,
                extension_service_fee, extension_total_price, checkout_session_id,
                payment_intent_id, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            EXTENSION_COLUMNS
        );
        let row: ExtensionRow = sqlx::query_as(&sql)
            .bind(new.storage_booking_id.as_i64())
            .bind(new.chef_id.map(|id| id.as_i64()))
            .bind(new.new_end_date.as_datetime())
            .bind(new.extension_days)
            .bind(new.extension_base_price)
            .bind(new.extension_service_fee)
            .bind(new.extension_total_price)
            .bind(&new.checkout_session_id)
            .bind(&new.payment_intent_id)
            .bind(new.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                write_error(
                    "create storage extension",
                    "pending_storage_extensions_session_key",
                    e,
                )
            })?;

        row.try_into()
    }

    async fn get_pending_storage_extension(
        &self,
        storage_booking_id: BookingId,
        checkout_session_id: &str,
    ) -> Result<Option<PendingStorageExtension>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM pending_storage_extensions
            WHERE storage_booking_id = $1 AND checkout_session_id = $2
            "#,
            EXTENSION_COLUMNS
        );
        let row: Option<ExtensionRow> = sqlx::query_as(&sql)
            .bind(storage_booking_id.as_i64())
            .bind(checkout_session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("find storage extension", e))?;

        row.map(PendingStorageExtension::try_from).transpose()
    }

    async fn update_pending_storage_extension(
        &self,
        id: ExtensionId,
        update: &ExtensionUpdate,
    ) -> Result<PendingStorageExtension, DomainError> {
        let sql = format!(
            r#"
            UPDATE pending_storage_extensions
            SET status = COALESCE($2, status),
                payment_intent_id = COALESCE($3, payment_intent_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            EXTENSION_COLUMNS
        );
        let row: Option<ExtensionRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .bind(update.status.map(|s| s.as_str()))
            .bind(&update.payment_intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error("update storage extension", e))?;

        row.ok_or_else(|| {
            DomainError::new(
                ErrorCode::ExtensionNotFound,
                format!("Extension {} not found", id),
            )
        })?
        .try_into()
    }
}
