//! CheckoutCompletedHandler - `checkout.session.completed` and
//! `checkout.session.async_payment_succeeded`.
//!
//! Routes a paid session by its metadata:
//! - kitchen booking fields → materialize a new booking
//! - storage extension fields → materialize a paid extension
//! - `booking_id` → settle a booking created before checkout

use std::sync::Arc;

use super::booking_materializer::{BookingMaterializer, PaidCheckout};
use super::handle_payment_intent::PaymentIntentHandler;
use super::outcome::ReconciliationOutcome;
use super::payment_ledger::SucceededPayment;
use crate::domain::payments::{
    BookingRef, CheckoutMetadata, CheckoutSession, ExistingBookingMetadata, WebhookError,
};
use crate::ports::BookingStore;

/// Used when a session omits its currency.
pub const DEFAULT_CURRENCY: &str = "cad";

pub struct CheckoutCompletedHandler {
    materializer: Arc<BookingMaterializer>,
    payment_intents: Arc<PaymentIntentHandler>,
    bookings: Arc<dyn BookingStore>,
}

impl CheckoutCompletedHandler {
    pub fn new(
        materializer: Arc<BookingMaterializer>,
        payment_intents: Arc<PaymentIntentHandler>,
        bookings: Arc<dyn BookingStore>,
    ) -> Self {
        Self {
            materializer,
            payment_intents,
            bookings,
        }
    }

    pub async fn handle(
        &self,
        session: &CheckoutSession,
        event_id: &str,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        if !session.is_paid() {
            return Ok(ReconciliationOutcome::Ignored(format!(
                "checkout session {} is {}",
                session.id, session.payment_status
            )));
        }

        let Some(metadata) = CheckoutMetadata::decode(&session.metadata)? else {
            return Ok(ReconciliationOutcome::Ignored(format!(
                "checkout session {} carries no booking metadata",
                session.id
            )));
        };

        let payment_intent_id = session
            .payment_intent_id()
            .ok_or(WebhookError::MissingField("payment_intent"))?;
        let checkout = PaidCheckout {
            session_id: Some(&session.id),
            payment_intent_id,
            amount_total: session.amount_total,
            currency: session.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
            event_id,
        };

        match metadata {
            CheckoutMetadata::KitchenBooking(meta) => {
                self.materializer
                    .materialize_kitchen_booking(&meta, &checkout)
                    .await
            }
            CheckoutMetadata::StorageExtension(meta) => {
                self.materializer
                    .materialize_storage_extension(&meta, &checkout)
                    .await
            }
            CheckoutMetadata::ExistingBooking(meta) => {
                self.settle_existing_booking(&meta, &checkout).await
            }
        }
    }

    async fn settle_existing_booking(
        &self,
        meta: &ExistingBookingMetadata,
        checkout: &PaidCheckout<'_>,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        if meta.creation_fields_present {
            tracing::warn!(
                booking_id = %meta.booking_id,
                "session carries both booking_id and booking creation fields, updating existing booking"
            );
        }

        let booking_ref = BookingRef {
            id: meta.booking_id,
            booking_type: meta.booking_type,
        };
        let booking = self.bookings.find_by_id(booking_ref).await?.ok_or_else(|| {
            WebhookError::BookingNotFound(format!("{} booking {}", meta.booking_type, meta.booking_id))
        })?;
        self.bookings
            .attach_payment_intent(booking_ref, checkout.payment_intent_id)
            .await?;

        let payment = SucceededPayment {
            payment_intent_id: checkout.payment_intent_id,
            amount: checkout.amount_total.unwrap_or(booking.total_price),
            currency: checkout.currency,
            charge_id: None,
            payment_method_id: None,
            application_fee: None,
            payee_account: None,
            event_id: checkout.event_id,
        };
        let outcome = self.payment_intents.apply_success(&payment).await?;
        Ok(outcome.unwrap_or_else(|| {
            // The booking already points at a different intent
            ReconciliationOutcome::Ignored(format!(
                "booking {} is linked to another payment intent",
                booking.id
            ))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::SentNotification;
    use crate::application::webhooks::test_support::*;
    use crate::application::webhooks::WebhookAck;
    use crate::domain::foundation::{BookingId, Timestamp};
    use crate::domain::payments::{Booking, BookingStatus, BookingType, PaymentStatus};
    use serde_json::json;

    async fn seed_pending_booking(world: &World, intent: Option<&str>) -> Booking {
        world
            .store
            .seed(Booking {
                id: BookingId::new(5),
                booking_type: BookingType::Kitchen,
                renter_id: CHEF,
                resource_id: KITCHEN,
                start_time: None,
                end_time: None,
                status: BookingStatus::Pending,
                payment_status: PaymentStatus::Pending,
                payment_intent_id: intent.map(str::to_string),
                checkout_session_id: None,
                total_price: 11_300,
                service_fee: 500,
                processor_fee: None,
                payee_net: None,
                notes: None,
                created_at: Timestamp::now(),
            })
            .await
    }

    #[tokio::test]
    async fn settles_booking_created_before_checkout() {
        let world = World::new().await;
        let booking = seed_pending_booking(&world, None).await;
        let session = paid_session("cs_1", "pi_1", json!({ "booking_id": "5" }));

        let ack = world
            .deliver(&event("evt_1", "checkout.session.completed", session))
            .await
            .unwrap();

        assert!(matches!(
            ack,
            WebhookAck::Processed(ReconciliationOutcome::PaymentRecorded {
                transitioned: true,
                ..
            })
        ));
        let stored = world.store.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(stored[0].payment_status, PaymentStatus::Paid);

        let rows = world.ledger.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].booking, booking.reference());
        assert_eq!(rows[0].payee_id, Some(MANAGER));
        assert!(world
            .notifier
            .sent()
            .await
            .iter()
            .any(|n| matches!(n, SentNotification::PaymentReceived { payee_id, .. } if *payee_id == MANAGER)));
    }

    #[tokio::test]
    async fn booking_id_wins_over_creation_fields() {
        let world = World::new().await;
        seed_pending_booking(&world, None).await;
        let mut metadata = kitchen_metadata();
        metadata["type"] = json!("existing_booking");
        metadata["booking_id"] = json!("5");

        world
            .deliver(&event(
                "evt_1",
                "checkout.session.completed",
                paid_session("cs_1", "pi_1", metadata),
            ))
            .await
            .unwrap();

        assert_eq!(world.store.count_of(BookingType::Kitchen).await, 1);
        assert_eq!(world.store.all().await[0].payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_existing_booking_is_dropped() {
        let world = World::new().await;
        let session = paid_session("cs_1", "pi_1", json!({ "booking_id": "404" }));

        let ack = world
            .deliver(&event("evt_1", "checkout.session.completed", session))
            .await
            .unwrap();

        assert!(matches!(ack, WebhookAck::Dropped(_)));
        assert!(world.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn missing_currency_defaults() {
        let world = World::new().await;
        let mut session = paid_session("cs_1", "pi_1", kitchen_metadata());
        session.as_object_mut().unwrap().remove("currency");

        world
            .deliver(&event("evt_1", "checkout.session.completed", session))
            .await
            .unwrap();

        assert_eq!(world.ledger.rows().await[0].currency, DEFAULT_CURRENCY);
    }
}
