//! PostgreSQL implementation of PayeeDirectory.
//!
//! A kitchen names its manager; storage and equipment listings belong to a
//! kitchen and are paid out to that kitchen's manager.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, ResourceId, Timestamp, UserId};
use crate::domain::payments::{BookingType, OnboardingStatus};
use crate::ports::{Payee, PayeeDirectory, PayoutRecord, SaveResult};

pub struct PostgresPayeeDirectory {
    pool: PgPool,
}

impl PostgresPayeeDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayeeRow {
    user_id: i64,
    connected_account_id: Option<String>,
    onboarding_status: String,
}

impl TryFrom<PayeeRow> for Payee {
    type Error = DomainError;

    fn try_from(row: PayeeRow) -> Result<Self, Self::Error> {
        let onboarding_status: OnboardingStatus = row.onboarding_status.parse().map_err(|_| {
            DomainError::database(format!(
                "Invalid onboarding status value: {}",
                row.onboarding_status
            ))
        })?;
        Ok(Payee {
            user_id: UserId::new(row.user_id),
            connected_account_id: row.connected_account_id,
            onboarding_status,
        })
    }
}

fn owner_sql(booking_type: BookingType) -> &'static str {
    match booking_type {
        BookingType::Kitchen => {
            r#"
            SELECT p.user_id, p.connected_account_id, p.onboarding_status
            FROM kitchens k
            JOIN payees p ON p.user_id = k.manager_id
            WHERE k.id = $1
            "#
        }
        BookingType::Storage => {
            r#"
            SELECT p.user_id, p.connected_account_id, p.onboarding_status
            FROM storage_listings s
            JOIN kitchens k ON k.id = s.kitchen_id
            JOIN payees p ON p.user_id = k.manager_id
            WHERE s.id = $1
            "#
        }
        BookingType::Equipment => {
            r#"
            SELECT p.user_id, p.connected_account_id, p.onboarding_status
            FROM equipment_listings e
            JOIN kitchens k ON k.id = e.kitchen_id
            JOIN payees p ON p.user_id = k.manager_id
            WHERE e.id = $1
            "#
        }
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl PayeeDirectory for PostgresPayeeDirectory {
    async fn find_by_connected_account(
        &self,
        account_id: &str,
    ) -> Result<Option<Payee>, DomainError> {
        let row: Option<PayeeRow> = sqlx::query_as(
            r#"
            SELECT user_id, connected_account_id, onboarding_status
            FROM payees
            WHERE connected_account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find payee", e))?;

        row.map(Payee::try_from).transpose()
    }

    async fn find_payee_for_resource(
        &self,
        booking_type: BookingType,
        resource_id: ResourceId,
    ) -> Result<Option<Payee>, DomainError> {
        let row: Option<PayeeRow> = sqlx::query_as(owner_sql(booking_type))
            .bind(resource_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find resource owner", e))?;

        row.map(Payee::try_from).transpose()
    }

    async fn update_onboarding_status(
        &self,
        payee_id: UserId,
        status: OnboardingStatus,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payees SET onboarding_status = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(payee_id.as_i64())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update onboarding status", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PayeeNotFound,
                format!("Payee {} not found", payee_id),
            ));
        }
        Ok(())
    }

    async fn record_payout(&self, record: &PayoutRecord) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payee_payouts (
                payout_id, payee_id, connected_account_id, amount, currency, outcome,
                failure_message, arrival_date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (payout_id) DO UPDATE SET
                outcome = EXCLUDED.outcome,
                failure_message = EXCLUDED.failure_message,
                recorded_at = NOW()
            WHERE payee_payouts.outcome = 'paid' AND EXCLUDED.outcome = 'failed'
            "#,
        )
        .bind(&record.payout_id)
        .bind(record.payee_id.as_i64())
        .bind(&record.connected_account_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.outcome.as_str())
        .bind(&record.failure_message)
        .bind(record.arrival_date.map(Timestamp::into_datetime))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("record payout", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }
}
