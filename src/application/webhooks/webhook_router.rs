//! WebhookRouter - verify, deduplicate, dispatch.
//!
//! Response contract with the processor:
//! - verification failures are returned as errors (4xx, never retried usefully)
//! - transient failures are returned as errors (5xx, the processor retries)
//! - data errors are logged and acknowledged; a retry would fail the same way

use serde_json::Value;

use super::handle_account_updated::AccountUpdatedHandler;
use super::handle_charge_refunded::ChargeRefundedHandler;
use super::handle_checkout_completed::CheckoutCompletedHandler;
use super::handle_payment_intent::PaymentIntentHandler;
use super::handle_payout::PayoutHandler;
use super::idempotency::{EventGuard, GuardDecision};
use super::outcome::ReconciliationOutcome;
use super::ReconciliationServices;
use crate::domain::payments::{
    ProcessorEvent, ReconciliationEvent, TransactionStatus, WebhookError, WebhookVerifier,
};
use crate::ports::{EventOutcome, PayoutOutcome, WebhookEventRecord};
use std::sync::Arc;

/// How a verified delivery was acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAck {
    Processed(ReconciliationOutcome),
    /// A final record for this event id already exists.
    Duplicate(EventOutcome),
    /// Verified but not actionable; logged and acknowledged.
    Dropped(String),
}

pub struct WebhookRouter {
    verifier: WebhookVerifier,
    guard: EventGuard,
    require_livemode: bool,
    checkout: Arc<CheckoutCompletedHandler>,
    payment_intents: Arc<PaymentIntentHandler>,
    refunds: ChargeRefundedHandler,
    accounts: AccountUpdatedHandler,
    payouts: PayoutHandler,
}

impl WebhookRouter {
    pub fn new(verifier: WebhookVerifier, services: &ReconciliationServices) -> Self {
        Self {
            verifier,
            guard: EventGuard::new(services.ports.events.clone()),
            require_livemode: services.settings.require_livemode,
            checkout: services.checkout.clone(),
            payment_intents: services.payment_intents.clone(),
            refunds: ChargeRefundedHandler::new(
                services.ports.ledger.clone(),
                services.sync.clone(),
            ),
            accounts: AccountUpdatedHandler::new(services.ports.payees.clone()),
            payouts: PayoutHandler::new(
                services.ports.payees.clone(),
                services.ports.notifier.clone(),
            ),
        }
    }

    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Handles one delivery from raw body bytes and the signature header.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        let event = self.verifier.verify(payload, signature)?;
        let raw: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);

        if self.require_livemode && !event.livemode {
            let reason = "test-mode event rejected in live mode".to_string();
            tracing::warn!(event_id = %event.id, event_type = %event.event_type, "{}", reason);
            self.guard
                .record(WebhookEventRecord::ignored(&event.id, &event.event_type, &reason, raw))
                .await;
            return Ok(WebhookAck::Dropped(reason));
        }

        if let GuardDecision::AlreadyProcessed(outcome) = self.guard.check(&event.id).await {
            tracing::info!(event_id = %event.id, outcome = outcome.as_str(), "duplicate delivery");
            return Ok(WebhookAck::Duplicate(outcome));
        }

        let decoded = match event.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(event_id = %event.id, event_type = %event.event_type, error = %e, "undecodable event payload");
                self.guard
                    .record(WebhookEventRecord::ignored(&event.id, &event.event_type, e.to_string(), raw))
                    .await;
                return Ok(WebhookAck::Dropped(e.to_string()));
            }
        };

        let result = self.dispatch(&event, &decoded).await;
        self.settle(&event, raw, result).await
    }

    async fn dispatch(
        &self,
        event: &ProcessorEvent,
        decoded: &ReconciliationEvent,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let event_id = event.id.as_str();
        match decoded {
            ReconciliationEvent::CheckoutCompleted(session) => {
                self.checkout.handle(session, event_id).await
            }
            ReconciliationEvent::PaymentSucceeded(intent) => {
                self.payment_intents.handle_succeeded(intent, event_id).await
            }
            ReconciliationEvent::PaymentFailed(intent) => {
                self.payment_intents
                    .handle_failed(intent, TransactionStatus::Failed, event_id)
                    .await
            }
            ReconciliationEvent::PaymentCanceled(intent) => {
                self.payment_intents
                    .handle_failed(intent, TransactionStatus::Canceled, event_id)
                    .await
            }
            ReconciliationEvent::ChargeRefunded(charge) => {
                self.refunds.handle(charge, event_id).await
            }
            ReconciliationEvent::AccountUpdated(account) => self.accounts.handle(account).await,
            ReconciliationEvent::PayoutPaid { payout, account } => {
                self.payouts
                    .handle(payout, account.as_deref(), PayoutOutcome::Paid)
                    .await
            }
            ReconciliationEvent::PayoutFailed { payout, account } => {
                self.payouts
                    .handle(payout, account.as_deref(), PayoutOutcome::Failed)
                    .await
            }
            ReconciliationEvent::Unknown(event_type) => Ok(ReconciliationOutcome::Ignored(
                format!("unhandled event type {}", event_type),
            )),
        }
    }

    /// Records the outcome and maps it onto the response contract.
    async fn settle(
        &self,
        event: &ProcessorEvent,
        raw: Value,
        result: Result<ReconciliationOutcome, WebhookError>,
    ) -> Result<WebhookAck, WebhookError> {
        let (id, event_type) = (event.id.as_str(), event.event_type.as_str());
        match result {
            Ok(ReconciliationOutcome::Ignored(reason)) => {
                tracing::info!(event_id = id, event_type, reason = %reason, "event ignored");
                self.guard
                    .record(WebhookEventRecord::ignored(id, event_type, &reason, raw))
                    .await;
                Ok(WebhookAck::Processed(ReconciliationOutcome::Ignored(reason)))
            }
            Ok(outcome) => {
                tracing::info!(event_id = id, event_type, outcome = ?outcome, "event processed");
                self.guard
                    .record(WebhookEventRecord::success(id, event_type, raw))
                    .await;
                Ok(WebhookAck::Processed(outcome))
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(event_id = id, event_type, error = %e, "event failed, requesting redelivery");
                self.guard
                    .record(WebhookEventRecord::failed(id, event_type, e.to_string(), raw))
                    .await;
                Err(e)
            }
            Err(e) => {
                tracing::error!(event_id = id, event_type, error = %e, "event rejected, acknowledging");
                self.guard
                    .record(WebhookEventRecord::ignored(id, event_type, e.to_string(), raw))
                    .await;
                Ok(WebhookAck::Dropped(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::SentNotification;
    use crate::application::webhooks::test_support::*;
    use crate::domain::payments::{BookingType, PaymentStatus, SettledAmounts};
    use crate::ports::{Recipient, WebhookEventRepository};
    use serde_json::json;

    async fn outcome_of(world: &World, event_id: &str) -> Option<EventOutcome> {
        world
            .events
            .find_by_event_id(event_id)
            .await
            .unwrap()
            .map(|r| r.outcome)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejects_tampered_payload_before_recording_anything() {
        let world = World::new().await;
        let body = event("evt_1", "checkout.session.completed", json!({}));
        let payload = serde_json::to_vec(&body).unwrap();
        let header = sign(&payload);
        let mut tampered = payload.clone();
        tampered.push(b' ');

        let err = world.router.handle(&tampered, Some(&header)).await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert!(err.is_verification_failure());
        assert!(world.events.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_missing_signature_when_enforced() {
        let world = World::new().await;
        let payload = serde_json::to_vec(&event("evt_1", "payout.paid", json!({}))).unwrap();

        let err = world.router.handle(&payload, None).await.unwrap_err();

        assert!(matches!(err, WebhookError::MissingSignature));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Materialization and redelivery
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_kitchen_checkout_materializes_booking_and_ledger_row() {
        let world = World::new().await;
        let session = paid_session("cs_1", "pi_1", kitchen_metadata());

        let ack = world
            .deliver(&event("evt_1", "checkout.session.completed", session))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::BookingMaterialized { .. })
        ));
        let bookings = world.store.all().await;
        assert_eq!(bookings.len(), 1);
        let booking = &bookings[0];
        assert_eq!(booking.resource_id, KITCHEN);
        assert_eq!(booking.renter_id, CHEF);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.checkout_session_id.as_deref(), Some("cs_1"));

        let rows = world.ledger.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 11_300);
        assert_eq!(rows[0].service_fee, 500);
        assert_eq!(rows[0].payee_revenue, 10_800);
        assert_eq!(rows[0].payee_id, Some(MANAGER));
        assert_eq!(rows[0].payment_intent_id.as_deref(), Some("pi_1"));

        let sent = world.notifier.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|n| matches!(
            n,
            SentNotification::NewBooking { recipient: Recipient::Payee(id), .. } if *id == MANAGER
        )));
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Success));
    }

    #[tokio::test]
    async fn redelivered_event_is_acknowledged_as_duplicate() {
        let world = World::new().await;
        let body = event(
            "evt_1",
            "checkout.session.completed",
            paid_session("cs_1", "pi_1", kitchen_metadata()),
        );

        world.deliver(&body).await.unwrap();
        let ack = world.deliver(&body).await.unwrap();

        assert_eq!(ack, WebhookAck::Duplicate(EventOutcome::Success));
        assert_eq!(world.store.count_of(BookingType::Kitchen).await, 1);
        assert_eq!(world.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn second_event_for_same_session_does_not_create_second_booking() {
        let world = World::new().await;
        let session = paid_session("cs_1", "pi_1", kitchen_metadata());

        world
            .deliver(&event("evt_1", "checkout.session.completed", session.clone()))
            .await
            .unwrap();
        let ack = world
            .deliver(&event("evt_2", "checkout.session.async_payment_succeeded", session))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::AlreadyApplied(_))
        ));
        assert_eq!(world.store.count_of(BookingType::Kitchen).await, 1);
        assert_eq!(world.ledger.len().await, 1);
        assert_eq!(world.notifier.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn payment_intent_after_checkout_refreshes_without_new_rows() {
        let world = World::new().await;
        world
            .deliver(&event(
                "evt_1",
                "checkout.session.completed",
                paid_session("cs_1", "pi_1", kitchen_metadata()),
            ))
            .await
            .unwrap();

        let ack = world
            .deliver(&event(
                "evt_2",
                "payment_intent.succeeded",
                succeeded_intent("pi_1", 11_300, kitchen_metadata()),
            ))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::PaymentRecorded {
                transitioned: false,
                ..
            })
        ));
        assert_eq!(world.store.count_of(BookingType::Kitchen).await, 1);
        let rows = world.ledger.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].charge_id.as_deref(), Some("ch_1"));
    }

    #[tokio::test]
    async fn settled_fees_overwrite_estimates() {
        let world = World::new().await;
        world.processor.set_settled_amounts(
            "pi_1",
            SettledAmounts {
                gross: 11_300,
                net: 10_442,
                processor_fee: 358,
                platform_fee: 500,
            },
        );

        world
            .deliver(&event(
                "evt_1",
                "checkout.session.completed",
                paid_session("cs_1", "pi_1", kitchen_metadata()),
            ))
            .await
            .unwrap();

        let rows = world.ledger.rows().await;
        assert_eq!(rows[0].processor_fee, 358);
        assert_eq!(rows[0].net_amount, 10_442);
        assert_eq!(world.store.all().await[0].processor_fee, Some(358));
        assert_eq!(world.processor.calls()[0].args, vec!["pi_1", MANAGER_ACCOUNT]);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Response contract
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invalid_metadata_is_acknowledged_and_recorded_as_ignored() {
        let world = World::new().await;
        let mut metadata = kitchen_metadata();
        metadata["total_price_cents"] = json!("ten dollars");

        let ack = world
            .deliver(&event(
                "evt_1",
                "checkout.session.completed",
                paid_session("cs_1", "pi_1", metadata),
            ))
            .await
            .unwrap();

        assert!(matches!(ack, WebhookAck::Dropped(_)));
        assert!(world.store.all().await.is_empty());
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Ignored));
    }

    #[tokio::test]
    async fn undecodable_object_is_dropped() {
        let world = World::new().await;

        let ack = world
            .deliver(&event("evt_1", "charge.refunded", json!({ "id": 42 })))
            .await
            .unwrap();

        assert!(matches!(ack, WebhookAck::Dropped(_)));
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Ignored));
    }

    #[tokio::test]
    async fn transient_failure_is_recorded_and_retry_succeeds() {
        let world = World::new().await;
        let body = event(
            "evt_1",
            "checkout.session.completed",
            paid_session("cs_1", "pi_1", kitchen_metadata()),
        );
        world.ledger.set_unavailable(true);

        let err = world.deliver(&body).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Failed));

        world.ledger.set_unavailable(false);
        let ack = world.deliver(&body).await.unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::BookingMaterialized { .. })
        ));
        assert_eq!(world.store.count_of(BookingType::Kitchen).await, 1);
        assert_eq!(world.ledger.len().await, 1);
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Success));
    }

    #[tokio::test]
    async fn unpaid_session_is_ignored() {
        let world = World::new().await;
        let mut session = paid_session("cs_1", "pi_1", kitchen_metadata());
        session["payment_status"] = json!("unpaid");

        let ack = world
            .deliver(&event("evt_1", "checkout.session.completed", session))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::Ignored(_))
        ));
        assert!(world.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let world = World::new().await;

        let ack = world
            .deliver(&event("evt_1", "customer.created", json!({ "id": "cus_1" })))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::Ignored(_))
        ));
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Ignored));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn refund_then_stale_refund() {
        let world = World::new().await;
        world
            .deliver(&event(
                "evt_1",
                "checkout.session.completed",
                paid_session("cs_1", "pi_1", kitchen_metadata()),
            ))
            .await
            .unwrap();
        let charge = |refunded: i64| {
            json!({
                "id": "ch_1",
                "object": "charge",
                "amount": 11_300,
                "amount_refunded": refunded,
                "refunded": refunded == 11_300,
                "payment_intent": "pi_1",
                "refunds": { "data": [{ "id": "re_1", "amount": refunded }] },
            })
        };

        let ack = world
            .deliver(&event("evt_2", "charge.refunded", charge(5_000)))
            .await
            .unwrap();
        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::RefundRecorded {
                refund_amount: 5_000,
                status: TransactionStatus::PartiallyRefunded,
                ..
            })
        ));
        assert_eq!(
            world.store.all().await[0].payment_status,
            PaymentStatus::PartiallyRefunded
        );

        let ack = world
            .deliver(&event("evt_3", "charge.refunded", charge(2_000)))
            .await
            .unwrap();
        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::Ignored(_))
        ));
        assert_eq!(world.ledger.rows().await[0].refund_amount, 5_000);
    }

    #[tokio::test]
    async fn refund_before_ledger_row_requests_redelivery() {
        let world = World::new().await;
        let charge = json!({
            "id": "ch_1",
            "amount": 11_300,
            "amount_refunded": 11_300,
            "refunded": true,
            "payment_intent": "pi_unknown",
        });

        let err = world
            .deliver(&event("evt_1", "charge.refunded", charge))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::TransactionNotFound(_)));
        assert_eq!(outcome_of(&world, "evt_1").await, Some(EventOutcome::Failed));
    }

    #[tokio::test]
    async fn late_failure_does_not_demote_paid_booking() {
        let world = World::new().await;
        world
            .deliver(&event(
                "evt_1",
                "checkout.session.completed",
                paid_session("cs_1", "pi_1", kitchen_metadata()),
            ))
            .await
            .unwrap();
        let failed = json!({
            "id": "pi_1",
            "status": "requires_payment_method",
            "amount": 11_300,
            "currency": "cad",
            "last_payment_error": { "code": "card_declined", "message": "Your card was declined." },
        });

        let ack = world
            .deliver(&event("evt_2", "payment_intent.payment_failed", failed))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::PaymentRecorded {
                status: TransactionStatus::Succeeded,
                transitioned: false,
                ..
            })
        ));
        assert_eq!(world.store.all().await[0].payment_status, PaymentStatus::Paid);
    }
}
