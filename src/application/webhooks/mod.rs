//! Webhook reconciliation.
//!
//! Turns verified processor events into ledger rows, booking projections
//! and notifications. Every handler is idempotent on its own key, so the
//! same event may be applied any number of times, in any order relative to
//! other events for the same payment.

mod booking_materializer;
mod fee_reconciler;
mod handle_account_updated;
mod handle_charge_refunded;
mod handle_checkout_completed;
mod handle_payment_intent;
mod handle_payout;
mod idempotency;
mod outcome;
mod payment_ledger;
mod reprocess_checkout_session;
mod status_sync;
mod webhook_router;

use std::sync::Arc;
use std::time::Duration;

pub use booking_materializer::{BookingMaterializer, PaidCheckout};
pub use fee_reconciler::{FeeReconciler, FeeSync};
pub use handle_account_updated::AccountUpdatedHandler;
pub use handle_charge_refunded::ChargeRefundedHandler;
pub use handle_checkout_completed::{CheckoutCompletedHandler, DEFAULT_CURRENCY};
pub use handle_payment_intent::PaymentIntentHandler;
pub use handle_payout::PayoutHandler;
pub use idempotency::{EventGuard, GuardDecision};
pub use outcome::ReconciliationOutcome;
pub use payment_ledger::{FailedPayment, PaymentLedger, RecordedPayment, SucceededPayment};
pub use reprocess_checkout_session::{ReprocessCheckoutSession, ReprocessError};
pub use status_sync::StatusSynchronizer;
pub use webhook_router::{WebhookAck, WebhookRouter};

use crate::config::PaymentConfig;
use crate::domain::payments::WebhookVerifier;
use crate::ports::{
    BookingService, BookingStore, Notifier, PayeeDirectory, PaymentProcessor, TransactionLedger,
    WebhookEventRepository,
};

/// Adapters reconciliation runs against.
#[derive(Clone)]
pub struct ReconciliationPorts {
    pub processor: Arc<dyn PaymentProcessor>,
    pub ledger: Arc<dyn TransactionLedger>,
    pub bookings: Arc<dyn BookingStore>,
    pub booking_service: Arc<dyn BookingService>,
    pub payees: Arc<dyn PayeeDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub events: Arc<dyn WebhookEventRepository>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationSettings {
    pub fee_lookup_timeout: Duration,
    /// Drop events whose `livemode` flag is false
    pub require_livemode: bool,
}

impl ReconciliationSettings {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            fee_lookup_timeout: Duration::from_secs(config.fee_lookup_timeout_secs),
            require_livemode: config.require_livemode,
        }
    }
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            fee_lookup_timeout: Duration::from_secs(5),
            require_livemode: false,
        }
    }
}

/// The shared reconciliation components, wired once at startup.
pub struct ReconciliationServices {
    pub ports: ReconciliationPorts,
    pub settings: ReconciliationSettings,
    pub sync: Arc<StatusSynchronizer>,
    pub checkout: Arc<CheckoutCompletedHandler>,
    pub payment_intents: Arc<PaymentIntentHandler>,
}

impl ReconciliationServices {
    pub fn new(ports: ReconciliationPorts, settings: ReconciliationSettings) -> Self {
        let fees = Arc::new(FeeReconciler::new(
            ports.processor.clone(),
            ports.ledger.clone(),
            ports.bookings.clone(),
            settings.fee_lookup_timeout,
        ));
        let sync = Arc::new(StatusSynchronizer::new(ports.bookings.clone()));
        let payments = Arc::new(PaymentLedger::new(
            ports.ledger.clone(),
            ports.bookings.clone(),
            ports.payees.clone(),
        ));
        let materializer = Arc::new(BookingMaterializer::new(
            ports.booking_service.clone(),
            ports.bookings.clone(),
            ports.ledger.clone(),
            ports.payees.clone(),
            ports.notifier.clone(),
            fees.clone(),
        ));
        let payment_intents = Arc::new(PaymentIntentHandler::new(
            payments,
            materializer.clone(),
            ports.bookings.clone(),
            sync.clone(),
            fees,
            ports.notifier.clone(),
        ));
        let checkout = Arc::new(CheckoutCompletedHandler::new(
            materializer,
            payment_intents.clone(),
            ports.bookings.clone(),
        ));

        Self {
            ports,
            settings,
            sync,
            checkout,
            payment_intents,
        }
    }

    pub fn router(&self, verifier: WebhookVerifier) -> WebhookRouter {
        WebhookRouter::new(verifier, self)
    }

    pub fn reprocessor(&self) -> ReprocessCheckoutSession {
        ReprocessCheckoutSession::new(self.ports.processor.clone(), self.checkout.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support;
