//! Deferred booking materialization.
//!
//! Bookings paid through checkout exist only as session metadata until the
//! processor confirms payment. The materializer turns that metadata into a
//! booking row and a ledger row, keyed on the payment intent so redelivery
//! never creates a second booking.
//!
//! Creation goes through the booking service first. If the service fails,
//! the row is inserted directly and read back before it is trusted.

use std::sync::Arc;

use super::fee_reconciler::FeeReconciler;
use super::outcome::ReconciliationOutcome;
use crate::domain::foundation::{ErrorCode, Timestamp, UserId};
use crate::domain::payments::{
    Booking, BookingRef, BookingType, ExtensionStatus, ExtensionUpdate, KitchenBookingMetadata,
    NewKitchenBooking, NewPaymentTransaction, PendingStorageExtension, StorageExtensionMetadata,
    TransactionStatus, WebhookError,
};
use crate::ports::{
    BookingService, BookingStore, NewBookingNotice, Notifier, Payee, PayeeDirectory, Recipient,
    TransactionLedger,
};

/// The paid checkout a booking is materialized from.
#[derive(Debug, Clone)]
pub struct PaidCheckout<'a> {
    /// Absent when materializing from payment intent metadata
    pub session_id: Option<&'a str>,
    pub payment_intent_id: &'a str,
    pub amount_total: Option<i64>,
    pub currency: &'a str,
    pub event_id: &'a str,
}

pub struct BookingMaterializer {
    booking_service: Arc<dyn BookingService>,
    bookings: Arc<dyn BookingStore>,
    ledger: Arc<dyn TransactionLedger>,
    payees: Arc<dyn PayeeDirectory>,
    notifier: Arc<dyn Notifier>,
    fees: Arc<FeeReconciler>,
}

impl BookingMaterializer {
    pub fn new(
        booking_service: Arc<dyn BookingService>,
        bookings: Arc<dyn BookingStore>,
        ledger: Arc<dyn TransactionLedger>,
        payees: Arc<dyn PayeeDirectory>,
        notifier: Arc<dyn Notifier>,
        fees: Arc<FeeReconciler>,
    ) -> Self {
        Self {
            booking_service,
            bookings,
            ledger,
            payees,
            notifier,
            fees,
        }
    }

    pub async fn materialize_kitchen_booking(
        &self,
        meta: &KitchenBookingMetadata,
        checkout: &PaidCheckout<'_>,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let gross = meta.gross_amount(checkout.amount_total);
        let payee_revenue = gross.checked_sub(meta.platform_fee_cents).ok_or_else(|| {
            WebhookError::InvalidMetadata(format!(
                "total {} cannot carry platform fee {}",
                gross, meta.platform_fee_cents
            ))
        })?;

        let existing = self
            .bookings
            .find_by_payment_intent(checkout.payment_intent_id)
            .await?
            .into_iter()
            .find(|b| b.booking_type == BookingType::Kitchen);

        let (booking, booking_created) = match existing {
            Some(booking) => (booking, false),
            None => {
                let new = meta.to_new_booking(
                    Some(checkout.payment_intent_id.to_string()),
                    checkout.session_id.map(str::to_string),
                );
                (self.create_booking(&new).await?, true)
            }
        };

        let payee = self
            .payees
            .find_payee_for_resource(BookingType::Kitchen, meta.kitchen_id)
            .await?;
        let insert = self
            .ledger
            .create(NewPaymentTransaction {
                booking: booking.reference(),
                payer_id: Some(meta.chef_id),
                payee_id: payee.as_ref().map(|p| p.user_id).or(meta.manager_id),
                amount: gross,
                base_amount: meta.base_amount(),
                service_fee: meta.platform_fee_cents,
                payee_revenue,
                currency: checkout.currency.to_string(),
                payment_intent_id: Some(checkout.payment_intent_id.to_string()),
                payment_method_id: None,
                status: TransactionStatus::Succeeded,
                processor_status: Some("succeeded".to_string()),
                metadata: serde_json::json!({
                    "kind": "kitchen_booking",
                    "checkout_session_id": checkout.session_id,
                    "tax_cents": meta.tax_cents,
                }),
                webhook_event_id: Some(checkout.event_id.to_string()),
                paid_at: Some(Timestamp::now()),
            })
            .await?;

        if !booking_created && !insert.was_created() {
            return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                "kitchen booking {} already materialized",
                booking.id
            )));
        }

        if insert.was_created() {
            self.fees
                .reconcile(insert.transaction(), connected_account(payee.as_ref()))
                .await;
        }

        tracing::info!(
            booking_id = %booking.id,
            transaction_id = %insert.transaction().id,
            payment_intent_id = checkout.payment_intent_id,
            booking_created,
            "kitchen booking materialized"
        );

        // Whichever delivery writes the ledger row announces the booking
        if insert.was_created() {
            let payee_id = payee.as_ref().map(|p| p.user_id).or(meta.manager_id);
            self.notify_new_booking(&booking, payee_id, gross, checkout.currency)
                .await;
        }

        Ok(ReconciliationOutcome::BookingMaterialized {
            booking: booking.reference(),
            transaction_id: insert.transaction().id,
        })
    }

    pub async fn materialize_storage_extension(
        &self,
        meta: &StorageExtensionMetadata,
        checkout: &PaidCheckout<'_>,
    ) -> Result<ReconciliationOutcome, WebhookError> {
        let storage_ref = BookingRef::storage(meta.storage_booking_id);
        let storage = self.bookings.find_by_id(storage_ref).await?.ok_or_else(|| {
            WebhookError::BookingNotFound(format!("storage booking {}", meta.storage_booking_id))
        })?;

        let session_id = checkout
            .session_id
            .ok_or(WebhookError::MissingField("checkout_session_id"))?;
        let (extension, newly_paid) = self.mark_extension_paid(meta, session_id, checkout).await?;

        let payee = self
            .payees
            .find_payee_for_resource(BookingType::Storage, storage.resource_id)
            .await?;
        let amount = checkout
            .amount_total
            .unwrap_or(meta.extension_total_price_cents);
        let insert = self
            .ledger
            .create(NewPaymentTransaction {
                booking: storage_ref,
                payer_id: Some(meta.chef_id.unwrap_or(storage.renter_id)),
                payee_id: payee.as_ref().map(|p| p.user_id),
                amount,
                base_amount: meta.extension_base_price_cents,
                service_fee: meta.extension_service_fee_cents,
                payee_revenue: meta.payee_revenue(),
                currency: checkout.currency.to_string(),
                payment_intent_id: Some(checkout.payment_intent_id.to_string()),
                payment_method_id: None,
                status: TransactionStatus::Succeeded,
                processor_status: Some("succeeded".to_string()),
                metadata: serde_json::json!({
                    "kind": "storage_extension",
                    "extension_id": extension.id,
                    "extension_days": meta.extension_days,
                    "checkout_session_id": session_id,
                }),
                webhook_event_id: Some(checkout.event_id.to_string()),
                paid_at: Some(Timestamp::now()),
            })
            .await?;

        if !newly_paid && !insert.was_created() {
            return Ok(ReconciliationOutcome::AlreadyApplied(format!(
                "extension {} already paid",
                extension.id
            )));
        }

        if insert.was_created() {
            self.fees
                .reconcile(insert.transaction(), connected_account(payee.as_ref()))
                .await;
        }

        tracing::info!(
            extension_id = %extension.id,
            storage_booking_id = %meta.storage_booking_id,
            transaction_id = %insert.transaction().id,
            "storage extension paid"
        );

        if insert.was_created() {
            if let Some(payee) = &payee {
                if let Err(e) = self
                    .notifier
                    .notify_extension_paid(payee.user_id, &extension)
                    .await
                {
                    tracing::warn!(extension_id = %extension.id, error = %e, "extension notification failed");
                }
            }
        }

        Ok(ReconciliationOutcome::ExtensionMaterialized {
            extension_id: extension.id,
            storage_booking_id: meta.storage_booking_id,
        })
    }

    /// Returns the extension and whether this call recorded its payment.
    async fn mark_extension_paid(
        &self,
        meta: &StorageExtensionMetadata,
        session_id: &str,
        checkout: &PaidCheckout<'_>,
    ) -> Result<(PendingStorageExtension, bool), WebhookError> {
        let existing = self
            .booking_service
            .get_pending_storage_extension(meta.storage_booking_id, session_id)
            .await?;

        match existing {
            Some(extension) if extension.status.payment_recorded() => Ok((extension, false)),
            Some(extension) => {
                let update = ExtensionUpdate {
                    status: Some(ExtensionStatus::Paid),
                    payment_intent_id: Some(checkout.payment_intent_id.to_string()),
                };
                let updated = self
                    .booking_service
                    .update_pending_storage_extension(extension.id, &update)
                    .await?;
                Ok((updated, true))
            }
            None => {
                let new = meta.to_new_extension(
                    session_id,
                    Some(checkout.payment_intent_id.to_string()),
                );
                match self.booking_service.create_pending_storage_extension(&new).await {
                    Ok(extension) => Ok((extension, true)),
                    Err(e) if e.code == ErrorCode::DuplicateKey => {
                        // Lost a race with a concurrent delivery
                        let extension = self
                            .booking_service
                            .get_pending_storage_extension(meta.storage_booking_id, session_id)
                            .await?
                            .ok_or_else(|| WebhookError::Database(e.to_string()))?;
                        Ok((extension, false))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    async fn create_booking(&self, new: &NewKitchenBooking) -> Result<Booking, WebhookError> {
        match self.booking_service.create_kitchen_booking(new).await {
            Ok(booking) => Ok(booking),
            Err(primary) => {
                tracing::warn!(
                    error = %primary,
                    payment_intent_id = new.payment_intent_id.as_deref().unwrap_or_default(),
                    "booking service failed, falling back to direct insert"
                );
                self.insert_directly(new).await.map_err(|fallback| {
                    tracing::error!(
                        primary = %primary,
                        fallback = %fallback,
                        "booking materialization failed on both paths"
                    );
                    WebhookError::MaterializationFailed(format!(
                        "booking service: {}; direct insert: {}",
                        primary, fallback
                    ))
                })
            }
        }
    }

    async fn insert_directly(&self, new: &NewKitchenBooking) -> Result<Booking, WebhookError> {
        // The service may have committed before it failed
        if let Some(intent) = new.payment_intent_id.as_deref() {
            let committed = self
                .bookings
                .find_by_payment_intent(intent)
                .await?
                .into_iter()
                .find(|b| b.booking_type == BookingType::Kitchen);
            if let Some(booking) = committed {
                return Ok(booking);
            }
        }

        let id = self.bookings.insert_kitchen_booking(new).await?;
        match self.bookings.find_by_id(BookingRef::kitchen(id)).await? {
            Some(booking) if new.matches(&booking) => Ok(booking),
            Some(_) => Err(WebhookError::MaterializationFailed(format!(
                "kitchen booking {} does not match what was inserted",
                id
            ))),
            None => Err(WebhookError::MaterializationFailed(format!(
                "kitchen booking {} missing after insert",
                id
            ))),
        }
    }

    async fn notify_new_booking(
        &self,
        booking: &Booking,
        payee_id: Option<UserId>,
        amount: i64,
        currency: &str,
    ) {
        let notice = NewBookingNotice {
            booking: booking.reference(),
            resource_id: booking.resource_id,
            renter_id: booking.renter_id,
            payee_id,
            start_time: booking.start_time,
            end_time: booking.end_time,
            amount,
            currency: currency.to_string(),
        };

        let mut recipients = vec![Recipient::Renter(booking.renter_id)];
        if let Some(payee_id) = payee_id {
            recipients.push(Recipient::Payee(payee_id));
        }
        for recipient in recipients {
            if let Err(e) = self.notifier.notify_new_booking(recipient, &notice).await {
                tracing::warn!(booking_id = %booking.id, error = %e, "booking notification failed");
            }
        }
    }
}

fn connected_account(payee: Option<&Payee>) -> Option<&str> {
    payee.and_then(|p| p.connected_account_id.as_deref())
}
