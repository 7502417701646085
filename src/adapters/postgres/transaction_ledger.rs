//! PostgreSQL implementation of TransactionLedger.
//!
//! Rows are keyed by payment intent through a partial unique index, so a
//! concurrent second insert for the same intent becomes a no-op and the
//! existing row is returned instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres};

use crate::domain::foundation::{
    BookingId, DomainError, ErrorCode, Timestamp, TransactionId, UserId,
};
use crate::domain::payments::{
    BookingRef, NewPaymentTransaction, PaymentTransaction, TransactionPatch, TransactionStatus,
};
use crate::ports::{LedgerInsert, TransactionLedger};

const COLUMNS: &str = r#"
    id, booking_id, booking_type, payer_id, payee_id, amount, base_amount, service_fee,
    processor_fee, payee_revenue, refund_amount, net_amount, currency, payment_intent_id,
    charge_id, refund_id, payment_method_id, status, processor_status, metadata,
    failure_reason, refund_reason, webhook_event_id, created_at, paid_at, refunded_at,
    last_synced_at, updated_at
"#;

// COALESCE keeps the stored value for every field the patch leaves unset
const PATCH_SET: &str = r#"
    payment_intent_id = COALESCE($2, payment_intent_id),
    charge_id = COALESCE($3, charge_id),
    refund_id = COALESCE($4, refund_id),
    payment_method_id = COALESCE($5, payment_method_id),
    amount = COALESCE($6, amount),
    service_fee = COALESCE($7, service_fee),
    processor_fee = COALESCE($8, processor_fee),
    net_amount = COALESCE($9, net_amount),
    payee_revenue = COALESCE($10, payee_revenue),
    refund_amount = COALESCE($11, refund_amount),
    status = COALESCE($12, status),
    processor_status = COALESCE($13, processor_status),
    failure_reason = COALESCE($14, failure_reason),
    refund_reason = COALESCE($15, refund_reason),
    webhook_event_id = COALESCE($16, webhook_event_id),
    paid_at = COALESCE($17, paid_at),
    refunded_at = COALESCE($18, refunded_at),
    last_synced_at = COALESCE($19, last_synced_at),
    updated_at = NOW()
"#;

pub struct PostgresTransactionLedger {
    pool: PgPool,
}

impl PostgresTransactionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    booking_id: i64,
    booking_type: String,
    payer_id: Option<i64>,
    payee_id: Option<i64>,
    amount: i64,
    base_amount: i64,
    service_fee: i64,
    processor_fee: i64,
    payee_revenue: i64,
    refund_amount: i64,
    net_amount: i64,
    currency: String,
    payment_intent_id: Option<String>,
    charge_id: Option<String>,
    refund_id: Option<String>,
    payment_method_id: Option<String>,
    status: String,
    processor_status: Option<String>,
    metadata: serde_json::Value,
    failure_reason: Option<String>,
    refund_reason: Option<String>,
    webhook_event_id: Option<String>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    last_synced_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let booking_type = row.booking_type.parse().map_err(|_| {
            DomainError::database(format!("Invalid booking_type value: {}", row.booking_type))
        })?;
        let status = row.status.parse().map_err(|_| {
            DomainError::database(format!("Invalid transaction status value: {}", row.status))
        })?;

        Ok(PaymentTransaction {
            id: TransactionId::new(row.id),
            booking: BookingRef {
                id: BookingId::new(row.booking_id),
                booking_type,
            },
            payer_id: row.payer_id.map(UserId::new),
            payee_id: row.payee_id.map(UserId::new),
            amount: row.amount,
            base_amount: row.base_amount,
            service_fee: row.service_fee,
            processor_fee: row.processor_fee,
            payee_revenue: row.payee_revenue,
            refund_amount: row.refund_amount,
            net_amount: row.net_amount,
            currency: row.currency,
            payment_intent_id: row.payment_intent_id,
            charge_id: row.charge_id,
            refund_id: row.refund_id,
            payment_method_id: row.payment_method_id,
            status,
            processor_status: row.processor_status,
            metadata: row.metadata,
            failure_reason: row.failure_reason,
            refund_reason: row.refund_reason,
            webhook_event_id: row.webhook_event_id,
            created_at: Timestamp::from_datetime(row.created_at),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            refunded_at: row.refunded_at.map(Timestamp::from_datetime),
            last_synced_at: row.last_synced_at.map(Timestamp::from_datetime),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", action, e))
}

/// Binds `$2..$19` in the order `PATCH_SET` expects.
fn bind_patch<'q>(
    query: QueryAs<'q, Postgres, TransactionRow, PgArguments>,
    patch: &'q TransactionPatch,
) -> QueryAs<'q, Postgres, TransactionRow, PgArguments> {
    query
        .bind(&patch.payment_intent_id)
        .bind(&patch.charge_id)
        .bind(&patch.refund_id)
        .bind(&patch.payment_method_id)
        .bind(patch.amount)
        .bind(patch.service_fee)
        .bind(patch.processor_fee)
        .bind(patch.net_amount)
        .bind(patch.payee_revenue)
        .bind(patch.refund_amount)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(&patch.processor_status)
        .bind(&patch.failure_reason)
        .bind(&patch.refund_reason)
        .bind(&patch.webhook_event_id)
        .bind(patch.paid_at.map(Timestamp::into_datetime))
        .bind(patch.refunded_at.map(Timestamp::into_datetime))
        .bind(patch.last_synced_at.map(Timestamp::into_datetime))
}

#[async_trait]
impl TransactionLedger for PostgresTransactionLedger {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE payment_intent_id = $1",
            COLUMNS
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find transaction", e))?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_by_booking(
        &self,
        booking: BookingRef,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM payment_transactions
            WHERE booking_type = $1 AND booking_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            COLUMNS
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(booking.booking_type.as_str())
            .bind(booking.id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find transaction", e))?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn create(&self, new: NewPaymentTransaction) -> Result<LedgerInsert, DomainError> {
        new.validate()
            .map_err(|e| DomainError::new(ErrorCode::ValidationFailed, e.to_string()))?;

        if let Some(intent) = new.payment_intent_id.as_deref() {
            if let Some(existing) = self.find_by_payment_intent(intent).await? {
                return Ok(LedgerInsert::Existing(existing));
            }
        }

        let sql = format!(
            r#"
            INSERT INTO payment_transactions (
                booking_id, booking_type, payer_id, payee_id, amount, base_amount, service_fee,
                payee_revenue, net_amount, currency, payment_intent_id, payment_method_id,
                status, processor_status, metadata, webhook_event_id, paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (payment_intent_id) WHERE payment_intent_id IS NOT NULL DO NOTHING
            RETURNING {}
            "#,
            COLUMNS
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(new.booking.id.as_i64())
            .bind(new.booking.booking_type.as_str())
            .bind(new.payer_id.map(|id| id.as_i64()))
            .bind(new.payee_id.map(|id| id.as_i64()))
            .bind(new.amount)
            .bind(new.base_amount)
            .bind(new.service_fee)
            .bind(new.payee_revenue)
            .bind(&new.currency)
            .bind(&new.payment_intent_id)
            .bind(&new.payment_method_id)
            .bind(new.status.as_str())
            .bind(&new.processor_status)
            .bind(&new.metadata)
            .bind(&new.webhook_event_id)
            .bind(new.paid_at.map(Timestamp::into_datetime))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("create transaction", e))?;

        match row {
            Some(row) => Ok(LedgerInsert::Created(row.try_into()?)),
            None => {
                // Lost the insert race on the payment intent key
                let intent = new.payment_intent_id.as_deref().unwrap_or_default();
                let existing = self.find_by_payment_intent(intent).await?.ok_or_else(|| {
                    DomainError::database(format!(
                        "Conflicting transaction for {} disappeared",
                        intent
                    ))
                })?;
                Ok(LedgerInsert::Existing(existing))
            }
        }
    }

    async fn update(
        &self,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<PaymentTransaction, DomainError> {
        let sql = format!(
            "UPDATE payment_transactions SET {} WHERE id = $1 RETURNING {}",
            PATCH_SET, COLUMNS
        );
        let row: Option<TransactionRow> = bind_patch(sqlx::query_as(&sql).bind(id.as_i64()), patch)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("update transaction", e))?;

        row.ok_or_else(|| {
            DomainError::new(
                ErrorCode::TransactionNotFound,
                format!("Transaction {} not found", id),
            )
        })?
        .try_into()
    }

    async fn update_if_status(
        &self,
        id: TransactionId,
        expected: &[TransactionStatus],
        patch: &TransactionPatch,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
        let sql = format!(
            "UPDATE payment_transactions SET {} WHERE id = $1 AND status = ANY($20) RETURNING {}",
            PATCH_SET, COLUMNS
        );
        let row: Option<TransactionRow> = bind_patch(sqlx::query_as(&sql).bind(id.as_i64()), patch)
            .bind(&expected)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("update transaction", e))?;

        row.map(PaymentTransaction::try_from).transpose()
    }
}
