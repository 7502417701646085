//! PaymentIntentHandler - succeeded, failed and canceled payment intents.

use std::sync::Arc;

use super::booking_materializer::{BookingMaterializer, PaidCheckout};
use super::fee_reconciler::FeeReconciler;
use super::outcome::ReconciliationOutcome;
use super::payment_ledger::{FailedPayment, PaymentLedger, RecordedPayment, SucceededPayment};
use super::status_sync::StatusSynchronizer;
use crate::domain::payments::{
    BookingRef, CheckoutMetadata, KitchenBookingMetadata, PaymentIntent, PaymentStatus, PaymentTransaction,
    TransactionStatus, WebhookError,
};
use crate::ports::{BookingStore, Notifier, PaymentNotice};

pub struct PaymentIntentHandler {
    payments: Arc<PaymentLedger>,
    materializer: Arc<BookingMaterializer>,
    bookings: Arc<dyn BookingStore>,
    sync: Arc<StatusSynchronizer>,
    fees: Arc<FeeReconciler>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentIntentHandler {
    pub fn new(
        payments: Arc<PaymentLedger>,
        materializer: Arc<BookingMaterializer>,
        bookings: Arc<dyn BookingStore>,
        sync: Arc<StatusSynchronizer>,
        fees: Arc<FeeReconciler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payments,
            materializer,
            bookings,
            sync,
            fees,
            notifier,
        }
    }

    pub async fn handle_succeeded(
        &self,
        intent: &PaymentIntent,
        event_id: &str,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let payment = SucceededPayment {
            payment_intent_id: &intent.id,
            amount: intent.settled_amount(),
            currency: &intent.currency,
            charge_id: intent.latest_charge.as_ref().map(|c| c.id()),
            payment_method_id: intent.payment_method.as_ref().map(|m| m.id()),
            application_fee: intent.application_fee_amount,
            payee_account: intent.destination_account(),
            event_id,
        };

        // A kitchen booking without its ledger row was never fully
        // materialized; finish it the way checkout would
        if !self.payments.has_row(&intent.id).await? {
            if let Ok(Some(CheckoutMetadata::KitchenBooking(meta))) =
                CheckoutMetadata::decode(&intent.metadata)
            {
                return self.materialize(&meta, &payment).await;
            }
        }

        if let Some(outcome) = self.apply_success(&payment).await? {
            return Ok(outcome);
        }

        // Nothing references the intent yet; its own metadata may describe
        // the booking it pays for
        match CheckoutMetadata::decode(&intent.metadata)? {
            Some(CheckoutMetadata::KitchenBooking(meta)) => self.materialize(&meta, &payment).await,
            Some(CheckoutMetadata::ExistingBooking(meta)) => {
                let booking = BookingRef {
                    id: meta.booking_id,
                    booking_type: meta.booking_type,
                };
                self.bookings
                    .attach_payment_intent(booking, &intent.id)
                    .await?;
                Ok(self.apply_success(&payment).await?.unwrap_or_else(|| {
                    ReconciliationOutcome::Ignored(format!(
                        "booking {} does not reference payment intent {}",
                        meta.booking_id, intent.id
                    ))
                }))
            }
            Some(CheckoutMetadata::StorageExtension(_)) => Ok(ReconciliationOutcome::Ignored(
                "storage extensions are materialized from their checkout session".to_string(),
            )),
            None => Ok(ReconciliationOutcome::Ignored(format!(
                "no booking references payment intent {}",
                intent.id
            ))),
        }
    }

    async fn materialize(
        &self,
        meta: &KitchenBookingMetadata,
        payment: &SucceededPayment<'_>,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let checkout = PaidCheckout {
            session_id: None,
            payment_intent_id: payment.payment_intent_id,
            amount_total: Some(payment.amount),
            currency: payment.currency,
            event_id: payment.event_id,
        };
        let outcome = self
            .materializer
            .materialize_kitchen_booking(meta, &checkout)
            .await?;
        self.sync
            .sync(payment.payment_intent_id, PaymentStatus::Paid)
            .await?;
        Ok(outcome)
    }

    /// Records a success against an existing row or booking, then settles
    /// fees and booking projections. `None` when nothing references the
    /// intent.
    pub async fn apply_success(
        &self,
        payment: &SucceededPayment<'_>,
    ) -> Result<Option<ReconciliationOutcome>, WebhookError> {
        let Some(recorded) = self.payments.record_success(payment).await? else {
            return Ok(None);
        };

        let tx = match &recorded {
            RecordedPayment::Duplicate(tx) => {
                return Ok(Some(ReconciliationOutcome::AlreadyApplied(format!(
                    "payment {} already recorded",
                    tx.id
                ))));
            }
            RecordedPayment::Preserved(tx) => return Ok(Some(recorded_outcome(tx, false))),
            RecordedPayment::Transitioned(tx) | RecordedPayment::Refreshed(tx) => tx,
        };

        self.fees.reconcile(tx, payment.payee_account).await;
        self.sync
            .sync(payment.payment_intent_id, PaymentStatus::Paid)
            .await?;

        if recorded.transitioned() {
            if let Some(payee_id) = tx.payee_id {
                let notice = PaymentNotice {
                    payment_intent_id: payment.payment_intent_id.to_string(),
                    booking: tx.booking,
                    amount: tx.amount,
                    currency: tx.currency.clone(),
                    failure_reason: None,
                };
                if let Err(e) = self.notifier.notify_payment_received(payee_id, &notice).await {
                    tracing::warn!(transaction_id = %tx.id, error = %e, "payment notification failed");
                }
            }
        }

        Ok(Some(recorded_outcome(tx, recorded.transitioned())))
    }

    /// Handles `payment_failed` (`status = Failed`) and `canceled`
    /// (`status = Canceled`).
    pub async fn handle_failed(
        &self,
        intent: &PaymentIntent,
        status: TransactionStatus,
        event_id: &str,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let recorded = self
            .payments
            .record_failure(&FailedPayment {
                payment_intent_id: &intent.id,
                status,
                failure_reason: intent.failure_reason(),
                processor_status: &intent.status,
                event_id,
            })
            .await?;

        let tx = match recorded {
            None => {
                let synced = self.sync.sync(&intent.id, status.payment_status()).await?;
                return Ok(if synced.total() == 0 {
                    ReconciliationOutcome::Ignored(format!(
                        "nothing references payment intent {}",
                        intent.id
                    ))
                } else {
                    ReconciliationOutcome::BookingsSynced(synced)
                });
            }
            Some(RecordedPayment::Duplicate(tx)) => {
                return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                    "transaction {} already {}",
                    tx.id, tx.status
                )));
            }
            Some(RecordedPayment::Preserved(tx)) => return Ok(recorded_outcome(&tx, false)),
            Some(RecordedPayment::Transitioned(tx)) | Some(RecordedPayment::Refreshed(tx)) => tx,
        };

        self.sync.sync(&intent.id, status.payment_status()).await?;

        if let Some(payee_id) = tx.payee_id {
            let notice = PaymentNotice {
                payment_intent_id: intent.id.clone(),
                booking: tx.booking,
                amount: intent.amount,
                currency: intent.currency.clone(),
                failure_reason: tx.failure_reason.clone(),
            };
            if let Err(e) = self.notifier.notify_payment_failed(payee_id, &notice).await {
                tracing::warn!(transaction_id = %tx.id, error = %e, "failure notification failed");
            }
        }

        tracing::info!(
            transaction_id = %tx.id,
            payment_intent_id = %intent.id,
            status = status.as_str(),
            "payment failure recorded"
        );
        Ok(recorded_outcome(&tx, true))
    }
}

fn recorded_outcome(tx: &PaymentTransaction, transitioned: bool) -> ReconciliationOutcome {
    ReconciliationOutcome::PaymentRecorded {
        transaction_id: tx.id,
        status: tx.status,
        transitioned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::webhooks::test_support::*;
    use crate::application::webhooks::WebhookAck;
    use crate::domain::foundation::{BookingId, Timestamp};
    use crate::domain::payments::{Booking, BookingStatus, BookingType};
    use serde_json::json;

    async fn seed_pending_booking(world: &World, intent: &str) -> Booking {
        world
            .store
            .seed(Booking {
                id: BookingId::new(8),
                booking_type: BookingType::Kitchen,
                renter_id: CHEF,
                resource_id: KITCHEN,
                start_time: None,
                end_time: None,
                status: BookingStatus::Pending,
                payment_status: PaymentStatus::Pending,
                payment_intent_id: Some(intent.to_string()),
                checkout_session_id: None,
                total_price: 9_000,
                service_fee: 450,
                processor_fee: None,
                payee_net: None,
                notes: None,
                created_at: Timestamp::now(),
            })
            .await
    }

    #[tokio::test]
    async fn success_for_pending_booking_creates_ledger_row() {
        let world = World::new().await;
        seed_pending_booking(&world, "pi_8").await;

        let ack = world
            .deliver(&event(
                "evt_1",
                "payment_intent.succeeded",
                succeeded_intent("pi_8", 9_000, json!({})),
            ))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::PaymentRecorded {
                status: TransactionStatus::Succeeded,
                transitioned: true,
                ..
            })
        ));
        let rows = world.ledger.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].service_fee, 450);
        assert_eq!(rows[0].payee_revenue, 8_550);
        assert_eq!(rows[0].charge_id.as_deref(), Some("ch_1"));
        assert_eq!(world.store.all().await[0].payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn failure_marks_pending_booking_failed() {
        let world = World::new().await;
        seed_pending_booking(&world, "pi_8").await;
        let failed = json!({
            "id": "pi_8",
            "status": "requires_payment_method",
            "amount": 9_000,
            "currency": "cad",
            "last_payment_error": { "code": "card_declined", "message": "Your card was declined." },
        });

        let ack = world
            .deliver(&event("evt_1", "payment_intent.payment_failed", failed))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::BookingsSynced(synced)) if synced.kitchen == 1
        ));
        assert_eq!(world.store.all().await[0].payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_of_unreferenced_intent_is_ignored() {
        let world = World::new().await;
        let canceled = json!({
            "id": "pi_nobody",
            "status": "canceled",
            "amount": 1_000,
            "currency": "cad",
            "cancellation_reason": "abandoned",
        });

        let ack = world
            .deliver(&event("evt_1", "payment_intent.canceled", canceled))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::Ignored(_))
        ));
    }

    #[tokio::test]
    async fn success_without_references_or_metadata_waits_for_checkout() {
        let world = World::new().await;

        let ack = world
            .deliver(&event(
                "evt_1",
                "payment_intent.succeeded",
                succeeded_intent("pi_new", 5_000, json!({})),
            ))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::Ignored(_))
        ));
        assert!(world.ledger.is_empty().await);
    }
}
