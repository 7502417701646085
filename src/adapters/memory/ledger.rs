//! In-memory transaction ledger.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, TransactionId};
use crate::domain::payments::{
    BookingRef, NewPaymentTransaction, PaymentTransaction, TransactionPatch, TransactionStatus,
};
use crate::ports::{LedgerInsert, TransactionLedger};

#[derive(Default)]
struct LedgerState {
    rows: Vec<PaymentTransaction>,
    next_id: i64,
}

/// Ledger keyed the same way as the database: at most one row per
/// payment intent.
#[derive(Default)]
pub struct InMemoryTransactionLedger {
    state: RwLock<LedgerState>,
    unavailable: AtomicBool,
}

impl InMemoryTransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a database error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stores a row as-is, assigning an id when it has none.
    pub async fn seed(&self, mut tx: PaymentTransaction) -> PaymentTransaction {
        let mut state = self.state.write().await;
        if tx.id.as_i64() == 0 {
            state.next_id += 1;
            tx.id = TransactionId::new(state.next_id);
        } else {
            state.next_id = state.next_id.max(tx.id.as_i64());
        }
        state.rows.push(tx.clone());
        tx
    }

    pub async fn rows(&self) -> Vec<PaymentTransaction> {
        self.state.read().await.rows.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::database("ledger unavailable"));
        }
        Ok(())
    }
}

fn not_found(id: TransactionId) -> DomainError {
    DomainError::new(
        ErrorCode::TransactionNotFound,
        format!("transaction {} not found", id),
    )
}

fn materialize(id: TransactionId, new: NewPaymentTransaction) -> PaymentTransaction {
    let now = Timestamp::now();
    PaymentTransaction {
        id,
        booking: new.booking,
        payer_id: new.payer_id,
        payee_id: new.payee_id,
        amount: new.amount,
        base_amount: new.base_amount,
        service_fee: new.service_fee,
        processor_fee: 0,
        payee_revenue: new.payee_revenue,
        refund_amount: 0,
        net_amount: new.payee_revenue,
        currency: new.currency,
        payment_intent_id: new.payment_intent_id,
        charge_id: None,
        refund_id: None,
        payment_method_id: new.payment_method_id,
        status: new.status,
        processor_status: new.processor_status,
        metadata: new.metadata,
        failure_reason: None,
        refund_reason: None,
        webhook_event_id: new.webhook_event_id,
        created_at: now,
        paid_at: new.paid_at,
        refunded_at: None,
        last_synced_at: None,
        updated_at: now,
    }
}

#[async_trait]
impl TransactionLedger for InMemoryTransactionLedger {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .find(|tx| tx.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn find_by_booking(
        &self,
        booking: BookingRef,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .filter(|tx| tx.booking == booking)
            .max_by_key(|tx| tx.id)
            .cloned())
    }

    async fn create(&self, new: NewPaymentTransaction) -> Result<LedgerInsert, DomainError> {
        self.check_available()?;
        new.validate()?;

        let mut state = self.state.write().await;
        if let Some(intent) = new.payment_intent_id.as_deref() {
            if let Some(existing) = state
                .rows
                .iter()
                .find(|tx| tx.payment_intent_id.as_deref() == Some(intent))
            {
                return Ok(LedgerInsert::Existing(existing.clone()));
            }
        }

        state.next_id += 1;
        let tx = materialize(TransactionId::new(state.next_id), new);
        state.rows.push(tx.clone());
        Ok(LedgerInsert::Created(tx))
    }

    async fn update(
        &self,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<PaymentTransaction, DomainError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let tx = state
            .rows
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| not_found(id))?;
        tx.apply(patch);
        Ok(tx.clone())
    }

    async fn update_if_status(
        &self,
        id: TransactionId,
        expected: &[TransactionStatus],
        patch: &TransactionPatch,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let tx = state
            .rows
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| not_found(id))?;
        if !expected.contains(&tx.status) {
            return Ok(None);
        }
        tx.apply(patch);
        Ok(Some(tx.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{BookingId, UserId};

    fn new_tx(intent: &str) -> NewPaymentTransaction {
        NewPaymentTransaction {
            booking: BookingRef::kitchen(BookingId::new(1)),
            payer_id: Some(UserId::new(3)),
            payee_id: Some(UserId::new(9)),
            amount: 5_250,
            base_amount: 5_250,
            service_fee: 500,
            payee_revenue: 4_750,
            currency: "cad".to_string(),
            payment_intent_id: Some(intent.to_string()),
            payment_method_id: None,
            status: TransactionStatus::Succeeded,
            processor_status: Some("succeeded".to_string()),
            metadata: serde_json::json!({}),
            webhook_event_id: Some("evt_1".to_string()),
            paid_at: Some(Timestamp::now()),
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_payment_intent() {
        let ledger = InMemoryTransactionLedger::new();

        let first = ledger.create(new_tx("pi_1")).await.unwrap();
        let second = ledger.create(new_tx("pi_1")).await.unwrap();

        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.transaction().id, second.transaction().id);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn update_if_status_skips_unexpected_status() {
        let ledger = InMemoryTransactionLedger::new();
        let tx = ledger.create(new_tx("pi_2")).await.unwrap().into_transaction();

        let patch = TransactionPatch {
            status: Some(TransactionStatus::Failed),
            ..Default::default()
        };
        let result = ledger
            .update_if_status(tx.id, &[TransactionStatus::Pending], &patch)
            .await
            .unwrap();

        assert!(result.is_none());
        let stored = ledger.find_by_payment_intent("pi_2").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Succeeded);
    }

    #[tokio::test]
    async fn update_of_missing_row_reports_not_found() {
        let ledger = InMemoryTransactionLedger::new();
        let err = ledger
            .update(TransactionId::new(42), &TransactionPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionNotFound);
    }

    #[tokio::test]
    async fn unavailable_ledger_returns_transient_errors() {
        let ledger = InMemoryTransactionLedger::new();
        ledger.set_unavailable(true);
        let err = ledger.find_by_payment_intent("pi_3").await.unwrap_err();
        assert!(err.code.is_transient());
    }
}
