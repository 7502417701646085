//! Shared fixture for reconciliation tests: in-memory adapters wired into
//! a router with an enforced signing secret.

use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{ReconciliationPorts, ReconciliationServices, ReconciliationSettings, WebhookAck, WebhookRouter};
use crate::adapters::memory::{
    InMemoryBookingService, InMemoryBookingStore, InMemoryPayeeDirectory,
    InMemoryTransactionLedger, InMemoryWebhookEventRepository, RecordingNotifier,
};
use crate::adapters::stripe::MockPaymentProcessor;
use crate::domain::foundation::{ResourceId, Timestamp, UserId};
use crate::domain::payments::{
    sign_payload, BookingType, OnboardingStatus, VerificationMode, WebhookError, WebhookVerifier,
};
use crate::ports::Payee;

pub const SECRET: &str = "whsec_test_secret";
pub const KITCHEN: ResourceId = ResourceId::new(7);
pub const CHEF: UserId = UserId::new(3);
pub const MANAGER: UserId = UserId::new(11);
pub const MANAGER_ACCOUNT: &str = "acct_manager";

pub struct World {
    pub processor: MockPaymentProcessor,
    pub ledger: Arc<InMemoryTransactionLedger>,
    pub store: Arc<InMemoryBookingStore>,
    pub service: Arc<InMemoryBookingService>,
    pub payees: Arc<InMemoryPayeeDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub events: Arc<InMemoryWebhookEventRepository>,
    pub services: ReconciliationServices,
    pub router: WebhookRouter,
}

impl World {
    pub async fn new() -> Self {
        let processor = MockPaymentProcessor::new();
        let ledger = Arc::new(InMemoryTransactionLedger::new());
        let store = Arc::new(InMemoryBookingStore::new());
        let service = Arc::new(InMemoryBookingService::new(store.clone()));
        let payees = Arc::new(InMemoryPayeeDirectory::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let events = Arc::new(InMemoryWebhookEventRepository::new());

        payees
            .add_payee(Payee {
                user_id: MANAGER,
                connected_account_id: Some(MANAGER_ACCOUNT.to_string()),
                onboarding_status: OnboardingStatus::Complete,
            })
            .await;
        payees
            .assign_resource(BookingType::Kitchen, KITCHEN, MANAGER)
            .await;

        let ports = ReconciliationPorts {
            processor: Arc::new(processor.clone()),
            ledger: ledger.clone(),
            bookings: store.clone(),
            booking_service: service.clone(),
            payees: payees.clone(),
            notifier: notifier.clone(),
            events: events.clone(),
        };
        let settings = ReconciliationSettings {
            fee_lookup_timeout: Duration::from_millis(200),
            require_livemode: false,
        };
        let services = ReconciliationServices::new(ports, settings);
        let router = services.router(WebhookVerifier::new(VerificationMode::Enforced(
            SecretString::new(SECRET.to_string()),
        )));

        Self {
            processor,
            ledger,
            store,
            service,
            payees,
            notifier,
            events,
            services,
            router,
        }
    }

    /// Signs and delivers an event built by [`event`].
    pub async fn deliver(&self, event: &Value) -> Result<WebhookAck, WebhookError> {
        let payload = serde_json::to_vec(event).unwrap();
        let header = sign(&payload);
        self.router.handle(&payload, Some(&header)).await
    }
}

pub fn sign(payload: &[u8]) -> String {
    sign_payload(SECRET, Timestamp::now().as_unix_secs(), payload)
}

pub fn event(id: &str, event_type: &str, object: Value) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "created": Timestamp::now().as_unix_secs(),
        "livemode": false,
        "data": { "object": object },
    })
}

pub fn kitchen_metadata() -> Value {
    json!({
        "type": "kitchen_booking",
        "kitchen_id": "7",
        "chef_id": "3",
        "start_time": "2026-11-02T09:00:00Z",
        "end_time": "2026-11-02T13:00:00Z",
        "total_price_cents": "10000",
        "tax_cents": "1300",
        "platform_fee_cents": "500",
    })
}

pub fn paid_session(id: &str, intent: &str, metadata: Value) -> Value {
    json!({
        "id": id,
        "object": "checkout.session",
        "payment_status": "paid",
        "status": "complete",
        "payment_intent": intent,
        "amount_total": 11300,
        "currency": "cad",
        "metadata": metadata,
    })
}

pub fn succeeded_intent(id: &str, amount: i64, metadata: Value) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "status": "succeeded",
        "amount": amount,
        "amount_received": amount,
        "currency": "cad",
        "latest_charge": "ch_1",
        "payment_method": "pm_1",
        "metadata": metadata,
    })
}
