//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the reconciliation core and the outside world. Adapters implement them.
//!
//! ## Processor
//!
//! - `PaymentProcessor` - resource retrieval and settled-amount lookup
//!
//! ## Persistence
//!
//! - `TransactionLedger` - ledger rows keyed by payment intent
//! - `BookingStore` - booking rows across the three booking tables
//! - `PayeeDirectory` - payee profiles and payout records
//! - `WebhookEventRepository` - event-level idempotency
//!
//! ## Collaborators
//!
//! - `BookingService` - booking and extension creation
//! - `Notifier` - fire-and-forget notifications
//! - `RateLimiter` - quota for administrative endpoints

mod booking_service;
mod booking_store;
mod notifier;
mod payee_directory;
mod payment_processor;
mod rate_limiter;
mod transaction_ledger;
mod webhook_event_repository;

pub use booking_service::BookingService;
pub use booking_store::{BookingStore, SyncOutcome};
pub use notifier::{NewBookingNotice, NotificationError, Notifier, PaymentNotice, Recipient};
pub use payee_directory::{Payee, PayeeDirectory, PayoutOutcome, PayoutRecord};
pub use payment_processor::{PaymentError, PaymentErrorCode, PaymentProcessor};
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitScope,
    RateLimitStatus, RateLimiter,
};
pub use transaction_ledger::{LedgerInsert, TransactionLedger};
pub use webhook_event_repository::{
    EventOutcome, SaveResult, WebhookEventRecord, WebhookEventRepository,
};
