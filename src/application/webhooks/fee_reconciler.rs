//! Fee reconciliation.
//!
//! Replaces estimated fees with the amounts the processor actually settled.
//! Every failure mode here degrades to keeping the estimate: the lookup is
//! bounded by a timeout and nothing it returns is propagated as an error.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::payments::{PaymentTransaction, SettledAmounts, TransactionPatch};
use crate::ports::{BookingStore, PaymentProcessor, TransactionLedger};

#[derive(Debug, Clone, PartialEq)]
pub enum FeeSync {
    /// Settled amounts written to the ledger row and bookings.
    Applied(SettledAmounts),
    /// The processor has not settled the charge yet.
    NotAvailable,
    /// Estimates kept because the lookup or write failed.
    Skipped(String),
}

pub struct FeeReconciler {
    processor: Arc<dyn PaymentProcessor>,
    ledger: Arc<dyn TransactionLedger>,
    bookings: Arc<dyn BookingStore>,
    lookup_timeout: Duration,
}

impl FeeReconciler {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        ledger: Arc<dyn TransactionLedger>,
        bookings: Arc<dyn BookingStore>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            processor,
            ledger,
            bookings,
            lookup_timeout,
        }
    }

    /// Overwrites the row's settled amounts. Running it twice writes the
    /// same values twice.
    pub async fn reconcile(
        &self,
        tx: &PaymentTransaction,
        payee_account_id: Option<&str>,
    ) -> FeeSync {
        let Some(intent) = tx.payment_intent_id.as_deref() else {
            return FeeSync::Skipped("transaction has no payment intent".to_string());
        };

        let lookup = self.processor.get_settled_amounts(intent, payee_account_id);
        let amounts = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Err(_) => {
                tracing::warn!(
                    payment_intent_id = intent,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "settled amount lookup timed out, keeping estimates"
                );
                return FeeSync::Skipped("lookup timed out".to_string());
            }
            Ok(Err(e)) => {
                tracing::warn!(payment_intent_id = intent, error = %e, "settled amount lookup failed, keeping estimates");
                return FeeSync::Skipped(e.to_string());
            }
            Ok(Ok(None)) => {
                tracing::debug!(payment_intent_id = intent, "settled amounts not available yet");
                return FeeSync::NotAvailable;
            }
            Ok(Ok(Some(amounts))) => amounts,
        };

        if let Err(e) = self
            .ledger
            .update(tx.id, &TransactionPatch::settled(&amounts))
            .await
        {
            tracing::warn!(transaction_id = %tx.id, error = %e, "failed to write settled amounts");
            return FeeSync::Skipped(e.to_string());
        }

        match self
            .bookings
            .apply_settled_fees(intent, amounts.processor_fee, amounts.net)
            .await
        {
            Ok(rows) => tracing::debug!(payment_intent_id = intent, rows, "booking fees synced"),
            Err(e) => {
                tracing::warn!(payment_intent_id = intent, error = %e, "failed to sync booking fees")
            }
        }

        tracing::info!(
            transaction_id = %tx.id,
            processor_fee = amounts.processor_fee,
            platform_fee = amounts.platform_fee,
            net = amounts.net,
            "fees reconciled"
        );
        FeeSync::Applied(amounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBookingStore, InMemoryTransactionLedger};
    use crate::adapters::stripe::MockPaymentProcessor;
    use crate::domain::foundation::{BookingId, Timestamp, UserId};
    use crate::domain::payments::{BookingRef, NewPaymentTransaction, TransactionStatus};
    use crate::ports::PaymentError;

    struct Fixture {
        processor: MockPaymentProcessor,
        ledger: Arc<InMemoryTransactionLedger>,
        reconciler: FeeReconciler,
    }

    fn fixture(timeout: Duration) -> Fixture {
        let processor = MockPaymentProcessor::new();
        let ledger = Arc::new(InMemoryTransactionLedger::new());
        let reconciler = FeeReconciler::new(
            Arc::new(processor.clone()),
            ledger.clone(),
            Arc::new(InMemoryBookingStore::new()),
            timeout,
        );
        Fixture {
            processor,
            ledger,
            reconciler,
        }
    }

    async fn seeded_row(ledger: &InMemoryTransactionLedger) -> PaymentTransaction {
        ledger
            .create(NewPaymentTransaction {
                booking: BookingRef::kitchen(BookingId::new(1)),
                payer_id: Some(UserId::new(3)),
                payee_id: Some(UserId::new(9)),
                amount: 10_000,
                base_amount: 10_000,
                service_fee: 500,
                payee_revenue: 9_500,
                currency: "cad".to_string(),
                payment_intent_id: Some("pi_fee".to_string()),
                payment_method_id: None,
                status: TransactionStatus::Succeeded,
                processor_status: None,
                metadata: serde_json::json!({}),
                webhook_event_id: None,
                paid_at: Some(Timestamp::now()),
            })
            .await
            .unwrap()
            .into_transaction()
    }

    fn settled() -> SettledAmounts {
        SettledAmounts {
            gross: 10_000,
            net: 9_180,
            processor_fee: 320,
            platform_fee: 500,
        }
    }

    #[tokio::test]
    async fn applies_settled_amounts_idempotently() {
        let f = fixture(Duration::from_secs(1));
        let tx = seeded_row(&f.ledger).await;
        f.processor.set_settled_amounts("pi_fee", settled());

        assert_eq!(f.reconciler.reconcile(&tx, None).await, FeeSync::Applied(settled()));
        assert_eq!(f.reconciler.reconcile(&tx, None).await, FeeSync::Applied(settled()));

        let row = f.ledger.find_by_payment_intent("pi_fee").await.unwrap().unwrap();
        assert_eq!(row.processor_fee, 320);
        assert_eq!(row.net_amount, 9_180);
        assert_eq!(row.service_fee, 500);
        assert!(row.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn timeout_keeps_estimates() {
        let f = fixture(Duration::from_millis(20));
        let tx = seeded_row(&f.ledger).await;
        f.processor.set_settled_amounts("pi_fee", settled());
        f.processor.set_settled_delay(Duration::from_millis(500));

        let result = f.reconciler.reconcile(&tx, None).await;

        assert!(matches!(result, FeeSync::Skipped(_)));
        let row = f.ledger.find_by_payment_intent("pi_fee").await.unwrap().unwrap();
        assert_eq!(row.processor_fee, 0);
        assert_eq!(row.service_fee, 500);
    }

    #[tokio::test]
    async fn processor_error_keeps_estimates() {
        let f = fixture(Duration::from_secs(1));
        let tx = seeded_row(&f.ledger).await;
        f.processor
            .set_error("get_settled_amounts", PaymentError::network("reset"));

        assert!(matches!(
            f.reconciler.reconcile(&tx, None).await,
            FeeSync::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn unsettled_charge_is_not_available() {
        let f = fixture(Duration::from_secs(1));
        let tx = seeded_row(&f.ledger).await;
        assert_eq!(f.reconciler.reconcile(&tx, Some("acct_9")).await, FeeSync::NotAvailable);
    }
}
