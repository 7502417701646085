//! PostgreSQL implementation of BookingStore over the three booking tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::foundation::{
    BookingId, DomainError, ErrorCode, ResourceId, StateMachine, Timestamp, UserId,
};
use crate::domain::payments::{
    Booking, BookingRef, BookingType, NewKitchenBooking, PaymentStatus,
};
use crate::ports::{BookingStore, SyncOutcome};

/// Table and resource column holding bookings of `booking_type`.
pub(super) fn booking_table(booking_type: BookingType) -> (&'static str, &'static str) {
    match booking_type {
        BookingType::Kitchen => ("kitchen_bookings", "kitchen_id"),
        BookingType::Storage => ("storage_bookings", "storage_listing_id"),
        BookingType::Equipment => ("equipment_bookings", "equipment_listing_id"),
    }
}

fn select_sql(booking_type: BookingType, filter: &str) -> String {
    let (table, resource) = booking_table(booking_type);
    format!(
        r#"
        SELECT id, chef_id, {resource} AS resource_id, start_time, end_time, status,
               payment_status, payment_intent_id, checkout_session_id, total_price,
               service_fee, processor_fee, payee_net, notes, created_at
        FROM {table}
        WHERE {filter}
        "#
    )
}

pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct BookingRow {
    id: i64,
    chef_id: i64,
    resource_id: i64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    payment_status: String,
    payment_intent_id: Option<String>,
    checkout_session_id: Option<String>,
    total_price: i64,
    service_fee: i64,
    processor_fee: Option<i64>,
    payee_net: Option<i64>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    pub(super) fn into_booking(self, booking_type: BookingType) -> Result<Booking, DomainError> {
        let status = self.status.parse().map_err(|_| {
            DomainError::database(format!("Invalid booking status value: {}", self.status))
        })?;
        let payment_status = self.payment_status.parse().map_err(|_| {
            DomainError::database(format!(
                "Invalid payment status value: {}",
                self.payment_status
            ))
        })?;

        Ok(Booking {
            id: BookingId::new(self.id),
            booking_type,
            renter_id: UserId::new(self.chef_id),
            resource_id: ResourceId::new(self.resource_id),
            start_time: self.start_time.map(Timestamp::from_datetime),
            end_time: self.end_time.map(Timestamp::from_datetime),
            status,
            payment_status,
            payment_intent_id: self.payment_intent_id,
            checkout_session_id: self.checkout_session_id,
            total_price: self.total_price,
            service_fee: self.service_fee,
            processor_fee: self.processor_fee,
            payee_net: self.payee_net,
            notes: self.notes,
            created_at: Timestamp::from_datetime(self.created_at),
        })
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", action, e))
}

/// Inserts a kitchen booking row inside `tx` or directly on the pool.
pub(super) async fn insert_kitchen_row<'e, E>(
    executor: E,
    new: &NewKitchenBooking,
) -> Result<BookingRow, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO kitchen_bookings (
            chef_id, kitchen_id, start_time, end_time, status, payment_status,
            payment_intent_id, checkout_session_id, total_price, service_fee, notes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, chef_id, kitchen_id AS resource_id, start_time, end_time, status,
                  payment_status, payment_intent_id, checkout_session_id, total_price,
                  service_fee, processor_fee, payee_net, notes, created_at
        "#,
    )
    .bind(new.chef_id.as_i64())
    .bind(new.kitchen_id.as_i64())
    .bind(new.start_time.map(Timestamp::into_datetime))
    .bind(new.end_time.map(Timestamp::into_datetime))
    .bind(new.status.as_str())
    .bind(new.payment_status.as_str())
    .bind(&new.payment_intent_id)
    .bind(&new.checkout_session_id)
    .bind(new.total_price)
    .bind(new.service_fee)
    .bind(&new.notes)
    .fetch_one(executor)
    .await
}

async fn sync_table(
    tx: &mut Transaction<'_, Postgres>,
    booking_type: BookingType,
    payment_intent_id: &str,
    target: PaymentStatus,
    sources: &[&str],
) -> Result<u64, sqlx::Error> {
    let (table, _) = booking_table(booking_type);
    let sql = format!(
        r#"
        UPDATE {table}
        SET payment_status = $1, updated_at = NOW()
        WHERE payment_intent_id = $2 AND payment_status = ANY($3)
        "#
    );
    let result = sqlx::query(&sql)
        .bind(target.as_str())
        .bind(payment_intent_id)
        .bind(sources)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Vec<Booking>, DomainError> {
        let mut bookings = Vec::new();
        for booking_type in BookingType::ALL {
            let rows: Vec<BookingRow> =
                sqlx::query_as(&select_sql(booking_type, "payment_intent_id = $1"))
                    .bind(payment_intent_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| db_error("find bookings", e))?;
            for row in rows {
                bookings.push(row.into_booking(booking_type)?);
            }
        }
        Ok(bookings)
    }

    async fn find_by_id(&self, booking: BookingRef) -> Result<Option<Booking>, DomainError> {
        let row: Option<BookingRow> = sqlx::query_as(&select_sql(booking.booking_type, "id = $1"))
            .bind(booking.id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find booking", e))?;

        row.map(|r| r.into_booking(booking.booking_type)).transpose()
    }

    async fn insert_kitchen_booking(
        &self,
        new: &NewKitchenBooking,
    ) -> Result<BookingId, DomainError> {
        let row = insert_kitchen_row(&self.pool, new)
            .await
            .map_err(|e| db_error("insert kitchen booking", e))?;
        Ok(BookingId::new(row.id))
    }

    async fn sync_payment_status(
        &self,
        payment_intent_id: &str,
        target: PaymentStatus,
    ) -> Result<SyncOutcome, DomainError> {
        let sources: Vec<&str> = PaymentStatus::sources_of(target)
            .iter()
            .map(|s| s.as_str())
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin status sync", e))?;

        let mut outcome = SyncOutcome::default();
        for booking_type in BookingType::ALL {
            let rows = sync_table(&mut tx, booking_type, payment_intent_id, target, &sources)
                .await
                .map_err(|e| db_error("sync payment status", e))?;
            outcome.record(booking_type, rows);
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit status sync", e))?;

        tracing::debug!(
            payment_intent_id,
            target = target.as_str(),
            rows = outcome.total(),
            "booking payment status synced"
        );
        Ok(outcome)
    }

    async fn attach_payment_intent(
        &self,
        booking: BookingRef,
        payment_intent_id: &str,
    ) -> Result<(), DomainError> {
        let (table, _) = booking_table(booking.booking_type);
        let sql = format!(
            r#"
            UPDATE {table}
            SET payment_intent_id = COALESCE(payment_intent_id, $2), updated_at = NOW()
            WHERE id = $1
            "#
        );
        let result = sqlx::query(&sql)
            .bind(booking.id.as_i64())
            .bind(payment_intent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("attach payment intent", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::BookingNotFound,
                format!("{} booking {} not found", booking.booking_type, booking.id),
            ));
        }
        Ok(())
    }

    async fn apply_settled_fees(
        &self,
        payment_intent_id: &str,
        processor_fee: i64,
        payee_net: i64,
    ) -> Result<u64, DomainError> {
        let mut updated = 0;
        for booking_type in BookingType::ALL {
            let (table, _) = booking_table(booking_type);
            let sql = format!(
                r#"
                UPDATE {table}
                SET processor_fee = $2, payee_net = $3, updated_at = NOW()
                WHERE payment_intent_id = $1
                "#
            );
            let result = sqlx::query(&sql)
                .bind(payment_intent_id)
                .bind(processor_fee)
                .bind(payee_net)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("apply settled fees", e))?;
            updated += result.rows_affected();
        }
        Ok(updated)
    }
}
